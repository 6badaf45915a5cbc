//! Tumor cells: phase state machine, pharmacodynamics, growth and division.
//!
//! Phases: VIABLE → HYPOXIC → NECROTIC (terminal) under oxygen starvation,
//! VIABLE/HYPOXIC → APOPTOTIC (terminal) under drug. Death freezes the cell:
//! no later call may change its phase, accumulated dose, or resistance.

use glam::Vec2;
use rand::Rng;
use rand_distr::{Distribution, UnitCircle};
use serde::{Deserialize, Serialize};

/// Drug absorbed per unit concentration per minute (µg/min).
pub const ABSORPTION_RATE: f32 = 1.0;

/// Local-concentration multiplier for direct nanobot delivery. Proximity
/// and receptor-mediated uptake make a docked delivery far more effective
/// than the same mass released into the diffusing field.
pub const PROXIMITY_FACTOR: f32 = 5.0;

/// Hypoxic cells throttle metabolism to this fraction of the viable rate.
pub const HYPOXIC_UPTAKE_FRACTION: f32 = 0.3;

/// Local drug concentration above which a voxel counts as an overdose site
/// and the cell emits extra toxicity signal.
pub const OVERDOSE_CONCENTRATION: f32 = 50.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellPhase {
    Viable,
    Hypoxic,
    Necrotic,
    Apoptotic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CauseOfDeath {
    Necrosis,
    Apoptosis,
    ImmuneAttack,
}

/// Cell type, fixed at creation; determines every rate parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Stem,
    Differentiated,
    Resistant,
    Invasive,
}

impl CellKind {
    /// mmHg/min consumed while viable.
    pub fn oxygen_uptake_rate(self) -> f32 {
        match self {
            CellKind::Stem => 8.0,
            CellKind::Differentiated => 10.0,
            CellKind::Resistant => 12.0,
            CellKind::Invasive => 15.0,
        }
    }

    /// mmHg below which the cell goes hypoxic.
    pub fn hypoxic_threshold(self) -> f32 {
        match self {
            CellKind::Stem => 8.0,
            CellKind::Differentiated => 10.0,
            CellKind::Resistant => 9.0,
            CellKind::Invasive => 12.0,
        }
    }

    /// Minutes of sustained hypoxia before necrosis.
    pub fn necrotic_time_threshold(self) -> f32 {
        match self {
            CellKind::Stem => 60.0,
            CellKind::Differentiated => 30.0,
            CellKind::Resistant => 45.0,
            CellKind::Invasive => 20.0,
        }
    }

    pub fn drug_sensitivity(self) -> f32 {
        match self {
            CellKind::Stem => 0.3,
            CellKind::Differentiated => 1.0,
            CellKind::Resistant => 0.5,
            CellKind::Invasive => 1.2,
        }
    }

    /// µg of accumulated drug that kills an unresisting cell.
    pub fn lethal_dose(self) -> f32 {
        match self {
            CellKind::Stem => 2.0,
            CellKind::Differentiated => 0.5,
            CellKind::Resistant => 1.0,
            CellKind::Invasive => 0.3,
        }
    }

    pub fn base_resistance(self) -> f32 {
        match self {
            CellKind::Stem => 0.8,
            CellKind::Differentiated => 0.1,
            CellKind::Resistant => 0.6,
            CellKind::Invasive => 0.2,
        }
    }

    /// Probability per minute of developing further resistance under drug.
    pub fn mutation_rate(self) -> f32 {
        match self {
            CellKind::Stem => 0.01,
            CellKind::Differentiated => 0.05,
            CellKind::Resistant => 0.1,
            CellKind::Invasive => 0.15,
        }
    }

    /// Probability per minute of a growth-and-division attempt succeeding
    /// when oxygen suffices.
    pub fn growth_rate(self) -> f32 {
        match self {
            CellKind::Stem => 0.004,
            CellKind::Differentiated => 0.002,
            CellKind::Resistant => 0.0015,
            CellKind::Invasive => 0.003,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TumorCell {
    pub id: u32,
    pub position: Vec2,
    pub radius: f32,
    pub phase: CellPhase,
    pub kind: CellKind,
    pub hypoxic_duration: f32,
    pub drug_sensitivity: f32,
    pub accumulated_drug: f32,
    pub resistance_level: f32,
    pub is_alive: bool,
    pub cause_of_death: Option<CauseOfDeath>,
    pub generation: u32,
}

impl TumorCell {
    pub fn new(id: u32, position: Vec2, phase: CellPhase, kind: CellKind) -> Self {
        let is_alive = !matches!(phase, CellPhase::Necrotic | CellPhase::Apoptotic);
        TumorCell {
            id,
            position,
            radius: 10.0,
            phase,
            kind,
            hypoxic_duration: 0.0,
            drug_sensitivity: kind.drug_sensitivity(),
            accumulated_drug: 0.0,
            resistance_level: kind.base_resistance(),
            is_alive,
            cause_of_death: if is_alive { None } else { Some(CauseOfDeath::Necrosis) },
            generation: 0,
        }
    }

    /// Hypoxia entry, necrosis after sustained starvation, and full
    /// recovery (duration resets) when oxygen returns. Hypoxia is not
    /// cumulative damage until necrosis fires.
    pub fn update_oxygen_status(&mut self, oxygen: f32, dt: f32) {
        if !self.is_alive {
            return;
        }
        if oxygen < self.kind.hypoxic_threshold() {
            self.phase = CellPhase::Hypoxic;
            self.hypoxic_duration += dt;
            if self.hypoxic_duration > self.kind.necrotic_time_threshold() {
                self.phase = CellPhase::Necrotic;
                self.is_alive = false;
                self.cause_of_death = Some(CauseOfDeath::Necrosis);
            }
        } else if self.phase == CellPhase::Hypoxic {
            self.phase = CellPhase::Viable;
            self.hypoxic_duration = 0.0;
        }
    }

    /// Absorb drug from the local field concentration. Resistance shields a
    /// fraction of the exposure and may adapt upward stochastically; death
    /// fires at `lethal_dose * (1 + resistance)`, boundary inclusive.
    pub fn absorb_drug<R: Rng>(&mut self, concentration: f32, dt: f32, rng: &mut R) {
        if !self.is_alive {
            return;
        }
        let effective = concentration * (1.0 - self.resistance_level);
        let absorbed = effective * self.drug_sensitivity * dt * ABSORPTION_RATE;
        self.accumulated_drug += absorbed;

        if absorbed > 0.0 && rng.gen::<f32>() < self.kind.mutation_rate() * dt {
            self.resistance_level = (self.resistance_level + 0.01).min(1.0);
            self.drug_sensitivity = (self.drug_sensitivity - 0.01).max(0.1);
        }

        let lethal = self.kind.lethal_dose() * (1.0 + self.resistance_level);
        if self.accumulated_drug >= lethal {
            self.die(CauseOfDeath::Apoptosis);
        }
    }

    /// Direct delivery from a docked nanobot, bypassing the diffusing
    /// field. The proximity factor applies before accumulation and the
    /// unadjusted lethal dose is checked. Returns true if this delivery
    /// killed the cell.
    pub fn accumulate_drug(&mut self, amount: f32) -> bool {
        if !self.is_alive {
            return false;
        }
        self.accumulated_drug += amount * PROXIMITY_FACTOR;
        if self.accumulated_drug >= self.kind.lethal_dose() {
            self.die(CauseOfDeath::Apoptosis);
            return true;
        }
        false
    }

    /// Growth check: viable cells with sufficient oxygen divide with a
    /// per-kind probability. Independent of the drug pathway.
    pub fn update_growth<R: Rng>(&mut self, oxygen: f32, dt: f32, rng: &mut R) -> bool {
        if !self.is_alive || self.phase != CellPhase::Viable {
            return false;
        }
        if oxygen <= self.kind.hypoxic_threshold() {
            return false;
        }
        rng.gen::<f32>() < self.kind.growth_rate() * dt
    }

    /// Spawn a daughter one radius away along a random unit vector.
    pub fn divide<R: Rng>(&self, new_id: u32, rng: &mut R) -> TumorCell {
        let v: [f32; 2] = UnitCircle.sample(rng);
        let offset = Vec2::new(v[0], v[1]) * self.radius;
        let mut daughter = TumorCell::new(
            new_id,
            self.position + offset,
            CellPhase::Viable,
            self.kind,
        );
        daughter.resistance_level = self.resistance_level;
        daughter.generation = self.generation + 1;
        daughter
    }

    /// Read by the microenvironment as an oxygen sink term. Depends only on
    /// the current phase.
    pub fn oxygen_consumption(&self) -> f32 {
        if !self.is_alive {
            return 0.0;
        }
        match self.phase {
            CellPhase::Viable => self.kind.oxygen_uptake_rate(),
            CellPhase::Hypoxic => self.kind.oxygen_uptake_rate() * HYPOXIC_UPTAKE_FRACTION,
            _ => 0.0,
        }
    }

    /// Toxicity signal this cell emits into its voxel: hypoxic cells emit
    /// moderately, necrotic cells strongly, overdosed sites extra.
    pub fn toxicity_emission(&self, local_drug: f32) -> f32 {
        let mut amount = 0.0;
        if self.phase == CellPhase::Hypoxic {
            amount += 2.0;
        }
        if self.phase == CellPhase::Necrotic {
            amount += 5.0;
        }
        if local_drug > OVERDOSE_CONCENTRATION {
            amount += 3.0;
        }
        amount
    }

    pub fn die(&mut self, cause: CauseOfDeath) {
        if !self.is_alive {
            return;
        }
        self.is_alive = false;
        self.cause_of_death = Some(cause);
        self.phase = match cause {
            CauseOfDeath::Necrosis => CellPhase::Necrotic,
            CauseOfDeath::Apoptosis | CauseOfDeath::ImmuneAttack => CellPhase::Apoptotic,
        };
    }
}
