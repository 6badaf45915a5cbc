//! Queen coordination: periodic swarm-level guidance.
//!
//! The queen does not command agents. Every few steps she looks at the
//! whole board and hands each idle, loaded agent a direction worth
//! heading in; agents blend that into their own searching behavior.

use std::collections::BTreeMap;

use glam::Vec2;
use tracing::{debug, warn};

use super::nanobot::{BotState, Nanobot};
use crate::config::QueenConfig;
use crate::tumor::cell::{CellKind, CellPhase};
use crate::tumor::TumorGeometry;

const STEM_WEIGHT: f32 = 3.0;
const IMMUNE_WEIGHT: f32 = 2.0;
const RESISTANCE_WEIGHT: f32 = 1.5;
/// Activation above which an immune cell marks a hot region.
const IMMUNE_ACTIVE_THRESHOLD: f32 = 0.7;
/// Resistance above which a cell marks a resistant pocket.
const HIGH_RESISTANCE_THRESHOLD: f32 = 0.5;

pub struct QueenCoordinator {
    config: QueenConfig,
}

impl QueenCoordinator {
    pub fn new(config: QueenConfig) -> Self {
        QueenCoordinator { config }
    }

    pub fn interval(&self) -> usize {
        self.config.interval
    }

    /// Compute one guidance vector per eligible agent: Searching, with
    /// enough payload to be worth directing. With the enhanced policy on,
    /// a failure to score any pool falls back to the plain heuristic.
    pub fn compute_guidance(
        &self,
        bots: &[Nanobot],
        geometry: &TumorGeometry,
    ) -> BTreeMap<u32, Vec2> {
        let mut guidance = BTreeMap::new();
        if !self.config.enabled {
            return guidance;
        }

        for bot in bots {
            if bot.state != BotState::Searching
                || bot.payload <= self.config.payload_threshold
            {
                continue;
            }

            let direction = if self.config.enhanced {
                match self.enhanced_direction(bot, geometry) {
                    Some(d) => Some(d),
                    None => {
                        warn!(bot = bot.id, "priority pools empty, using hypoxia heuristic");
                        self.nearest_hypoxic_direction(bot, geometry)
                    }
                }
            } else {
                self.nearest_hypoxic_direction(bot, geometry)
            };

            if let Some(d) = direction {
                guidance.insert(bot.id, d);
            }
        }

        debug!(directed = guidance.len(), "queen guidance computed");
        guidance
    }

    /// Default heuristic: unit vector toward the nearest hypoxic cell.
    fn nearest_hypoxic_direction(&self, bot: &Nanobot, geometry: &TumorGeometry) -> Option<Vec2> {
        geometry
            .cells
            .iter()
            .filter(|c| c.is_alive && c.phase == CellPhase::Hypoxic)
            .min_by(|a, b| {
                bot.position
                    .distance_squared(a.position)
                    .total_cmp(&bot.position.distance_squared(b.position))
            })
            .map(|c| (c.position - bot.position).normalize_or_zero())
            .filter(|d| *d != Vec2::ZERO)
    }

    /// Enhanced policy: three priority pools, each position scored
    /// `weight / (distance + 1)`; the best-scoring position wins.
    fn enhanced_direction(&self, bot: &Nanobot, geometry: &TumorGeometry) -> Option<Vec2> {
        let mut best: Option<(f32, Vec2)> = None;
        let mut consider = |weight: f32, position: Vec2| {
            let score = weight / (bot.position.distance(position) + 1.0);
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, position));
            }
        };

        for cell in geometry.living_cells() {
            if cell.kind == CellKind::Stem {
                consider(STEM_WEIGHT, cell.position);
            }
            if cell.resistance_level > HIGH_RESISTANCE_THRESHOLD {
                consider(RESISTANCE_WEIGHT, cell.position);
            }
        }
        for immune in &geometry.immune_cells {
            if immune.is_active && immune.activation_level > IMMUNE_ACTIVE_THRESHOLD {
                consider(IMMUNE_WEIGHT, immune.position);
            }
        }

        best.map(|(_, position)| (position - bot.position).normalize_or_zero())
            .filter(|d| *d != Vec2::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tumor::cell::TumorCell;
    use crate::tumor::immune::{ImmuneCell, ImmuneKind};

    fn queen(enhanced: bool) -> QueenCoordinator {
        QueenCoordinator::new(QueenConfig {
            enabled: true,
            interval: 10,
            enhanced,
            payload_threshold: 10.0,
        })
    }

    fn geometry() -> TumorGeometry {
        TumorGeometry::new(Vec2::new(300.0, 300.0), 200.0, 50.0)
    }

    #[test]
    fn guidance_points_at_hypoxic_cells() {
        let mut geo = geometry();
        geo.cells.push(TumorCell::new(
            0,
            Vec2::new(400.0, 300.0),
            CellPhase::Hypoxic,
            CellKind::Differentiated,
        ));
        geo.cells.push(TumorCell::new(
            1,
            Vec2::new(200.0, 300.0),
            CellPhase::Viable,
            CellKind::Differentiated,
        ));

        let bot = Nanobot::new(7, Vec2::new(300.0, 300.0));
        let guidance = queen(false).compute_guidance(&[bot], &geo);
        let d = guidance[&7];
        assert!(d.x > 0.99); // toward the hypoxic cell, not the viable one
    }

    #[test]
    fn low_payload_agents_are_ignored() {
        let mut geo = geometry();
        geo.cells.push(TumorCell::new(
            0,
            Vec2::new(400.0, 300.0),
            CellPhase::Hypoxic,
            CellKind::Differentiated,
        ));
        let mut bot = Nanobot::new(0, Vec2::new(300.0, 300.0));
        bot.payload = 5.0;
        assert!(queen(false).compute_guidance(&[bot], &geo).is_empty());
    }

    #[test]
    fn enhanced_prefers_close_stem_over_far_immune() {
        let mut geo = geometry();
        geo.cells.push(TumorCell::new(
            0,
            Vec2::new(330.0, 300.0),
            CellPhase::Viable,
            CellKind::Stem,
        ));
        geo.immune_cells.push(ImmuneCell::new(
            0,
            Vec2::new(200.0, 300.0),
            ImmuneKind::TCell,
            0.9,
        ));

        let bot = Nanobot::new(1, Vec2::new(300.0, 300.0));
        let guidance = queen(true).compute_guidance(&[bot], &geo);
        assert!(guidance[&1].x > 0.0);
    }

    #[test]
    fn enhanced_falls_back_when_pools_are_empty() {
        let mut geo = geometry();
        geo.cells.push(TumorCell::new(
            0,
            Vec2::new(250.0, 300.0),
            CellPhase::Hypoxic,
            CellKind::Differentiated,
        ));

        let bot = Nanobot::new(2, Vec2::new(300.0, 300.0));
        let guidance = queen(true).compute_guidance(&[bot], &geo);
        assert!(guidance[&2].x < 0.0);
    }

    #[test]
    fn disabled_queen_stays_silent() {
        let mut geo = geometry();
        geo.cells.push(TumorCell::new(
            0,
            Vec2::new(400.0, 300.0),
            CellPhase::Hypoxic,
            CellKind::Differentiated,
        ));
        let q = QueenCoordinator::new(QueenConfig {
            enabled: false,
            ..QueenConfig::default()
        });
        let bot = Nanobot::new(0, Vec2::new(300.0, 300.0));
        assert!(q.compute_guidance(&[bot], &geo).is_empty());
    }
}
