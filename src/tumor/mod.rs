//! Tumor geometry: spatial generator and registry for tumor cells, vessels
//! and immune cells.
//!
//! A generated tumor is a viable annulus around a necrotic core, with
//! vasculature biased to the periphery and immune infiltrate seeded near
//! vessels. The geometry also answers the boundary and nearest-neighbor
//! queries the swarm navigates by.

pub mod cell;
pub mod immune;
pub mod labels;
pub mod vessel;

use std::collections::BTreeMap;
use std::f32::consts::PI;

use glam::Vec2;
use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::config::TumorConfig;
use cell::{CellKind, CellPhase, TumorCell};
use immune::{ImmuneCell, ImmuneKind};
use vessel::VesselPoint;

/// Aggregate tumor statistics, recomputed by the model each step.
#[derive(Clone, Debug, Serialize)]
pub struct TumorStatistics {
    pub total_cells: usize,
    pub living_cells: usize,
    pub dead_cells: usize,
    pub survival_rate: f32,
    pub phase_counts: BTreeMap<String, usize>,
    pub kind_counts: BTreeMap<String, usize>,
    pub n_vessels: usize,
    pub active_immune_cells: usize,
}

pub struct TumorGeometry {
    pub center: Vec2,
    pub tumor_radius: f32,
    pub necrotic_core_radius: f32,
    pub cells: Vec<TumorCell>,
    pub vessels: Vec<VesselPoint>,
    pub immune_cells: Vec<ImmuneCell>,
}

impl TumorGeometry {
    pub fn new(center: Vec2, tumor_radius: f32, necrotic_core_radius: f32) -> Self {
        TumorGeometry {
            center,
            tumor_radius,
            necrotic_core_radius,
            cells: Vec::new(),
            vessels: Vec::new(),
            immune_cells: Vec::new(),
        }
    }

    /// Generate the full tumor: cells in the viable annulus, peripheral
    /// vasculature, immune cells near vessels.
    pub fn generate<R: Rng>(&mut self, cfg: &TumorConfig, dimensionality: usize, rng: &mut R) {
        let n_cells = if dimensionality == 2 {
            let area = PI * (self.tumor_radius.powi(2) - self.necrotic_core_radius.powi(2));
            (area * cfg.cell_density) as usize
        } else {
            let volume = (4.0 / 3.0)
                * PI
                * (self.tumor_radius.powi(3) - self.necrotic_core_radius.powi(3));
            (volume * cfg.cell_density) as usize
        };

        for id in 0..n_cells {
            let theta = rng.gen_range(0.0..2.0 * PI);
            let r = rng.gen_range(self.necrotic_core_radius..self.tumor_radius);
            let position = self.center + Vec2::new(theta.cos(), theta.sin()) * r;

            // Position in the viable band, 0 at the core edge, 1 at the rim.
            let band = (r - self.necrotic_core_radius)
                / (self.tumor_radius - self.necrotic_core_radius);
            let phase = if band < 0.3 {
                CellPhase::Hypoxic
            } else {
                CellPhase::Viable
            };
            let kind = assign_cell_kind(band, rng);
            self.cells
                .push(TumorCell::new(id as u32, position, phase, kind));
        }

        self.generate_peripheral_vasculature(cfg.vessel_density, rng);
        self.generate_immune_cells(rng);

        info!(
            cells = self.cells.len(),
            vessels = self.vessels.len(),
            immune = self.immune_cells.len(),
            radius = self.tumor_radius,
            "generated tumor geometry"
        );
    }

    /// Vessels sit on a ring at 90..110% of the tumor radius. Any that land
    /// outside 120% belong to surrounding brain tissue and carry blood-brain
    /// barrier permeability.
    fn generate_peripheral_vasculature<R: Rng>(&mut self, vessel_density: f32, rng: &mut R) {
        let periphery = 2.0 * PI * self.tumor_radius;
        let n_vessels = (periphery * vessel_density) as usize;

        for _ in 0..n_vessels {
            let theta = rng.gen_range(0.0..2.0 * PI);
            let r = rng.gen_range(0.9 * self.tumor_radius..1.1 * self.tumor_radius);
            let position = self.center + Vec2::new(theta.cos(), theta.sin()) * r;
            let vessel = if r > 1.2 * self.tumor_radius {
                VesselPoint::bbb(position)
            } else {
                VesselPoint::normal(position)
            };
            self.vessels.push(vessel);
        }
    }

    /// Immune infiltrate enters from the vasculature: one immune cell per
    /// twenty tumor cells (at least five), scattered around random vessels.
    fn generate_immune_cells<R: Rng>(&mut self, rng: &mut R) {
        let n_immune = (self.cells.len() / 20).max(5);

        for id in 0..n_immune {
            let position = if self.vessels.is_empty() {
                self.center
                    + Vec2::new(
                        rng.gen_range(-self.tumor_radius..self.tumor_radius),
                        rng.gen_range(-self.tumor_radius..self.tumor_radius),
                    )
            } else {
                let vessel = &self.vessels[rng.gen_range(0..self.vessels.len())];
                let offset = Vec2::new(
                    rng.sample::<f32, _>(rand_distr::StandardNormal),
                    rng.sample::<f32, _>(rand_distr::StandardNormal),
                ) * 30.0;
                vessel.position + offset
            };
            let kind = assign_immune_kind(rng);
            let activation = rng.gen_range(0.3..0.8);
            self.immune_cells
                .push(ImmuneCell::new(id as u32, position, kind, activation));
        }
    }

    pub fn is_inside_tumor(&self, position: Vec2) -> bool {
        self.center.distance(position) <= self.tumor_radius
    }

    pub fn is_inside_necrotic_core(&self, position: Vec2) -> bool {
        self.center.distance(position) <= self.necrotic_core_radius
    }

    pub fn find_nearest_vessel(&self, position: Vec2) -> Option<&VesselPoint> {
        self.vessels.iter().min_by(|a, b| {
            position
                .distance_squared(a.position)
                .total_cmp(&position.distance_squared(b.position))
        })
    }

    pub fn living_cells(&self) -> impl Iterator<Item = &TumorCell> {
        self.cells.iter().filter(|c| c.is_alive)
    }

    pub fn count_in_phase(&self, phase: CellPhase) -> usize {
        self.cells.iter().filter(|c| c.phase == phase).count()
    }

    /// Pairwise repulsion between living cells: any pair closer than the
    /// sum of radii is pushed apart along the separation axis, half the
    /// overlap each. Called by the model only on steps where a division
    /// happened, so the O(n²) sweep stays off the hot path.
    pub fn relax_overlaps(&mut self) {
        let n = self.cells.len();
        for a in 0..n {
            if !self.cells[a].is_alive {
                continue;
            }
            for b in (a + 1)..n {
                if !self.cells[b].is_alive {
                    continue;
                }
                let delta = self.cells[b].position - self.cells[a].position;
                let min_sep = self.cells[a].radius + self.cells[b].radius;
                let distance = delta.length();
                if distance >= min_sep || distance <= f32::EPSILON {
                    continue;
                }
                let push = delta / distance * (min_sep - distance) * 0.5;
                self.cells[a].position -= push;
                self.cells[b].position += push;
            }
        }
    }

    pub fn statistics(&self) -> TumorStatistics {
        let total = self.cells.len();
        let living = self.living_cells().count();

        let mut phase_counts = BTreeMap::new();
        for phase in [
            CellPhase::Viable,
            CellPhase::Hypoxic,
            CellPhase::Necrotic,
            CellPhase::Apoptotic,
        ] {
            phase_counts.insert(format!("{phase:?}").to_lowercase(), self.count_in_phase(phase));
        }

        let mut kind_counts = BTreeMap::new();
        for kind in [
            CellKind::Stem,
            CellKind::Differentiated,
            CellKind::Resistant,
            CellKind::Invasive,
        ] {
            kind_counts.insert(
                format!("{kind:?}").to_lowercase(),
                self.cells.iter().filter(|c| c.kind == kind).count(),
            );
        }

        TumorStatistics {
            total_cells: total,
            living_cells: living,
            dead_cells: total - living,
            survival_rate: if total > 0 {
                living as f32 / total as f32
            } else {
                0.0
            },
            phase_counts,
            kind_counts,
            n_vessels: self.vessels.len(),
            active_immune_cells: self.immune_cells.iter().filter(|c| c.is_active).count(),
        }
    }
}

/// Position-biased cell type draw: stem cells cluster near the core,
/// resistant clones in the mid band, invasive cells at the rim.
fn assign_cell_kind<R: Rng>(band: f32, rng: &mut R) -> CellKind {
    if band < 0.2 && rng.gen::<f32>() < 0.3 {
        return CellKind::Stem;
    }
    if (0.3..0.7).contains(&band) && rng.gen::<f32>() < 0.15 {
        return CellKind::Resistant;
    }
    if band > 0.8 && rng.gen::<f32>() < 0.2 {
        return CellKind::Invasive;
    }
    CellKind::Differentiated
}

/// Typical tumor-infiltrate composition.
fn assign_immune_kind<R: Rng>(rng: &mut R) -> ImmuneKind {
    let r = rng.gen::<f32>();
    if r < 0.4 {
        ImmuneKind::TCell
    } else if r < 0.7 {
        ImmuneKind::Macrophage
    } else if r < 0.9 {
        ImmuneKind::NkCell
    } else {
        ImmuneKind::Dendritic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn generated() -> TumorGeometry {
        let mut rng = StdRng::seed_from_u64(42);
        let mut geo = TumorGeometry::new(Vec2::new(300.0, 300.0), 200.0, 50.0);
        geo.generate(&TumorConfig::default(), 2, &mut rng);
        geo
    }

    #[test]
    fn cells_land_in_the_viable_annulus() {
        let geo = generated();
        assert!(!geo.cells.is_empty());
        for c in &geo.cells {
            let r = geo.center.distance(c.position);
            assert!(r >= geo.necrotic_core_radius - 1e-3);
            assert!(r <= geo.tumor_radius + 1e-3);
        }
    }

    #[test]
    fn vessels_sit_near_the_periphery() {
        let geo = generated();
        assert!(!geo.vessels.is_empty());
        for v in &geo.vessels {
            let r = geo.center.distance(v.position);
            assert!(r >= 0.9 * geo.tumor_radius - 1e-3);
            assert!(r <= 1.1 * geo.tumor_radius + 1e-3);
        }
    }

    #[test]
    fn immune_count_has_a_floor() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut geo = TumorGeometry::new(Vec2::new(300.0, 300.0), 60.0, 15.0);
        let cfg = TumorConfig {
            radius: 60.0,
            cell_density: 0.0001,
            ..TumorConfig::default()
        };
        geo.generate(&cfg, 2, &mut rng);
        assert!(geo.immune_cells.len() >= 5);
    }

    #[test]
    fn boundary_predicates_agree_with_radii() {
        let geo = generated();
        assert!(geo.is_inside_tumor(geo.center));
        assert!(geo.is_inside_necrotic_core(geo.center));
        let rim = geo.center + Vec2::new(geo.tumor_radius - 1.0, 0.0);
        assert!(geo.is_inside_tumor(rim));
        assert!(!geo.is_inside_necrotic_core(rim));
        let outside = geo.center + Vec2::new(geo.tumor_radius + 10.0, 0.0);
        assert!(!geo.is_inside_tumor(outside));
    }

    #[test]
    fn nearest_vessel_is_actually_nearest() {
        let geo = generated();
        let probe = geo.center + Vec2::new(150.0, 0.0);
        let nearest = geo.find_nearest_vessel(probe).unwrap();
        let d = probe.distance(nearest.position);
        for v in &geo.vessels {
            assert!(probe.distance(v.position) >= d - 1e-4);
        }
    }

    #[test]
    fn relax_overlaps_separates_touching_pairs() {
        let mut geo = TumorGeometry::new(Vec2::ZERO, 100.0, 10.0);
        geo.cells.push(TumorCell::new(
            0,
            Vec2::new(50.0, 50.0),
            CellPhase::Viable,
            CellKind::Differentiated,
        ));
        geo.cells.push(TumorCell::new(
            1,
            Vec2::new(52.0, 50.0),
            CellPhase::Viable,
            CellKind::Differentiated,
        ));
        geo.relax_overlaps();
        let sep = geo.cells[0].position.distance(geo.cells[1].position);
        assert!(sep > 2.0);
    }
}
