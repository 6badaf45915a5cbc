//! Serializable views of simulation state, for callers that render or
//! persist runs. Everything here is plain data; producing a snapshot never
//! mutates the model.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::microenv::substrate::SubstrateSummary;
use crate::swarm::nanobot::BotState;
use crate::tumor::TumorStatistics;

#[derive(Clone, Debug, Serialize)]
pub struct BotSnapshot {
    pub id: u32,
    pub position: [f32; 2],
    pub state: BotState,
    pub payload: f32,
    pub deliveries: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepSnapshot {
    pub step: usize,
    /// Simulation time in minutes.
    pub time: f32,
    pub tumor: TumorStatistics,
    pub bots: Vec<BotSnapshot>,
    pub substrates: BTreeMap<String, SubstrateSummary>,
    pub total_deliveries: usize,
    pub total_drug_delivered: f32,
    pub cells_killed: usize,
    pub errors_last_step: usize,
}

/// Full-grid dump of one substrate, row-major.
#[derive(Clone, Debug, Serialize)]
pub struct SubstrateSnapshot {
    pub name: String,
    pub shape: (usize, usize, usize),
    pub values: Vec<f32>,
}

/// All substrate grids at one instant. Recorded periodically by the model;
/// too large to include in every [`StepSnapshot`].
#[derive(Clone, Debug, Serialize)]
pub struct FieldFrame {
    pub step: usize,
    /// Simulation time in minutes.
    pub time: f32,
    pub fields: Vec<SubstrateSnapshot>,
}
