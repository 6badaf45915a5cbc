//! Immune cells: targeting, cytotoxic attack, cytokine secretion.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::cell::{CauseOfDeath, TumorCell};
use crate::microenv::Microenvironment;

/// Separation below which an immune cell can damage its target.
pub const ATTACK_RANGE: f32 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImmuneKind {
    TCell,
    Macrophage,
    NkCell,
    Dendritic,
}

impl ImmuneKind {
    pub fn cytotoxicity(self) -> f32 {
        match self {
            ImmuneKind::TCell => 0.8,
            ImmuneKind::Macrophage => 0.4,
            ImmuneKind::NkCell => 0.9,
            ImmuneKind::Dendritic => 0.2,
        }
    }

    /// µm/min.
    pub fn migration_speed(self) -> f32 {
        match self {
            ImmuneKind::TCell => 15.0,
            ImmuneKind::Macrophage => 5.0,
            ImmuneKind::NkCell => 20.0,
            ImmuneKind::Dendritic => 8.0,
        }
    }

    /// Minutes of activity before the cell goes quiescent.
    pub fn lifespan(self) -> f32 {
        match self {
            ImmuneKind::TCell => 1440.0,
            ImmuneKind::Macrophage => 2880.0,
            ImmuneKind::NkCell => 720.0,
            ImmuneKind::Dendritic => 2160.0,
        }
    }
}

pub struct ImmuneCell {
    pub id: u32,
    pub position: Vec2,
    pub kind: ImmuneKind,
    /// 0..1, scales both damage and secretion.
    pub activation_level: f32,
    pub radius: f32,
    pub age: f32,
    pub is_active: bool,
    /// Index into the tumor cell vec, revalidated every step.
    pub target: Option<usize>,
}

impl ImmuneCell {
    pub fn new(id: u32, position: Vec2, kind: ImmuneKind, activation_level: f32) -> Self {
        ImmuneCell {
            id,
            position,
            kind,
            activation_level,
            radius: 8.0,
            age: 0.0,
            is_active: true,
            target: None,
        }
    }

    /// Age, retarget the nearest living tumor cell, and attack when in
    /// range. Cells past their lifespan deactivate permanently; they stay
    /// in the collection so ids remain stable.
    pub fn update<R: Rng>(&mut self, dt: f32, cells: &mut [TumorCell], rng: &mut R) {
        if !self.is_active {
            return;
        }
        self.age += dt;
        if self.age > self.kind.lifespan() {
            self.is_active = false;
            self.target = None;
            return;
        }

        let stale = self
            .target
            .map(|i| i >= cells.len() || !cells[i].is_alive)
            .unwrap_or(true);
        if stale {
            self.target = self.find_nearest_living(cells);
        }

        if let Some(i) = self.target {
            let distance = self.position.distance(cells[i].position);
            if distance < ATTACK_RANGE {
                self.attack(&mut cells[i], dt, rng);
            }
        }
    }

    fn find_nearest_living(&self, cells: &[TumorCell]) -> Option<usize> {
        cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_alive)
            .min_by(|(_, a), (_, b)| {
                let da = self.position.distance_squared(a.position);
                let db = self.position.distance_squared(b.position);
                da.total_cmp(&db)
            })
            .map(|(i, _)| i)
    }

    /// Cytotoxic damage strips drug resistance and raises sensitivity;
    /// strong hits kill outright.
    fn attack<R: Rng>(&self, target: &mut TumorCell, dt: f32, rng: &mut R) {
        if !target.is_alive {
            return;
        }
        let damage = self.kind.cytotoxicity() * self.activation_level * dt * 10.0;
        target.resistance_level = (target.resistance_level - damage * 0.1).max(0.0);
        target.drug_sensitivity = (target.drug_sensitivity + damage * 0.05).min(2.0);
        if damage > 0.5 && rng.gen::<f32>() < damage {
            target.die(CauseOfDeath::ImmuneAttack);
        }
    }

    /// Deposit kind-specific cytokines at the cell's voxel. Unregistered
    /// substrates are skipped without comment.
    pub fn secrete(&self, microenv: &mut Microenvironment) {
        if !self.is_active {
            return;
        }
        let voxel = microenv.position_to_voxel(self.position);
        let (name, amount) = match self.kind {
            ImmuneKind::TCell => ("ifn_gamma", 2.0 * self.activation_level),
            ImmuneKind::Macrophage => ("tnf_alpha", 1.5 * self.activation_level),
            ImmuneKind::NkCell => ("perforin", 3.0 * self.activation_level),
            ImmuneKind::Dendritic => return,
        };
        if let Some(field) = microenv.field_mut(name) {
            field.add_source(voxel, amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tumor::cell::{CellKind, CellPhase};
    use rand::{rngs::StdRng, SeedableRng};

    fn tumor_cell(id: u32, x: f32) -> TumorCell {
        TumorCell::new(id, Vec2::new(x, 0.0), CellPhase::Viable, CellKind::Differentiated)
    }

    #[test]
    fn targets_nearest_living_cell() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut cells = vec![tumor_cell(0, 100.0), tumor_cell(1, 40.0), tumor_cell(2, 300.0)];
        cells[1].die(CauseOfDeath::Apoptosis);

        let mut ic = ImmuneCell::new(0, Vec2::ZERO, ImmuneKind::TCell, 0.5);
        ic.update(1.0, &mut cells, &mut rng);
        assert_eq!(ic.target, Some(0));
    }

    #[test]
    fn attack_strips_resistance_and_raises_sensitivity() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut cells = vec![tumor_cell(0, 10.0)];
        cells[0].resistance_level = 0.5;
        let before_sens = cells[0].drug_sensitivity;

        let mut ic = ImmuneCell::new(0, Vec2::ZERO, ImmuneKind::Dendritic, 0.1);
        // Weak attacker: damage 0.2·0.1·1·10 = 0.2, below the kill gate.
        ic.update(1.0, &mut cells, &mut rng);
        assert!(cells[0].is_alive);
        assert!(cells[0].resistance_level < 0.5);
        assert!(cells[0].drug_sensitivity > before_sens);
    }

    #[test]
    fn expired_cell_deactivates_permanently() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut cells = vec![tumor_cell(0, 5.0)];
        let mut ic = ImmuneCell::new(0, Vec2::ZERO, ImmuneKind::NkCell, 0.8);
        ic.age = ImmuneKind::NkCell.lifespan() + 1.0;
        ic.update(1.0, &mut cells, &mut rng);
        assert!(!ic.is_active);
        assert_eq!(ic.target, None);

        ic.update(1.0, &mut cells, &mut rng);
        assert!(!ic.is_active);
    }

    #[test]
    fn out_of_range_target_takes_no_damage() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut cells = vec![tumor_cell(0, 500.0)];
        let resistance = cells[0].resistance_level;
        let mut ic = ImmuneCell::new(0, Vec2::ZERO, ImmuneKind::NkCell, 1.0);
        ic.update(1.0, &mut cells, &mut rng);
        assert_eq!(cells[0].resistance_level, resistance);
    }
}
