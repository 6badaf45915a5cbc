//! Pluggable decision policies for searching agents.
//!
//! A policy sees a situation report and answers with one of four action
//! tokens. The default policy is a deterministic heuristic; a remote
//! advisor can stand in behind the same trait (see [`remote`]). Policy
//! failures never abort a step: the agent falls back to exploration.

pub mod remote;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Target,
    FollowTrail,
    Explore,
    Return,
}

impl PolicyAction {
    /// Parse an action token leniently. Anything unrecognized is treated
    /// as an instruction to keep exploring rather than an error.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "target" => PolicyAction::Target,
            "follow_trail" | "followtrail" | "follow-trail" => PolicyAction::FollowTrail,
            "return" => PolicyAction::Return,
            _ => PolicyAction::Explore,
        }
    }
}

/// Situation report assembled for a single searching agent: local field
/// readings plus aggregate statistics over nearby cells and immune
/// activity.
#[derive(Clone, Debug, Serialize)]
pub struct PolicyObservation {
    pub position: [f32; 2],
    pub payload: f32,
    pub max_payload: f32,
    pub deliveries: usize,
    pub oxygen: f32,
    pub drug: f32,
    pub trail: f32,
    pub alarm: f32,
    pub cytokines: f32,
    /// Living cells within the search neighborhood, by kind.
    pub nearby_cells_by_kind: BTreeMap<String, usize>,
    pub nearby_mean_resistance: f32,
    pub nearby_stem_count: usize,
    pub nearby_active_immune: usize,
    pub nearest_vessel_bbb_permeability: f32,
}

pub trait DecisionPolicy {
    fn decide(&self, observation: &PolicyObservation) -> anyhow::Result<PolicyAction>;
}

/// Deterministic field-reading heuristic. Keeps the whole model testable
/// with no external service in the loop.
pub struct GradientPolicy {
    /// Payload below this routes the agent home.
    pub low_payload: f32,
    /// Trail reading above this is worth following.
    pub trail_threshold: f32,
    /// Oxygen below this marks a hypoxic pocket worth targeting.
    pub hypoxic_oxygen: f32,
}

impl Default for GradientPolicy {
    fn default() -> Self {
        GradientPolicy {
            low_payload: 2.0,
            trail_threshold: 1.0,
            hypoxic_oxygen: 10.0,
        }
    }
}

impl DecisionPolicy for GradientPolicy {
    fn decide(&self, observation: &PolicyObservation) -> anyhow::Result<PolicyAction> {
        if observation.payload < self.low_payload {
            return Ok(PolicyAction::Return);
        }
        if observation.trail > self.trail_threshold {
            return Ok(PolicyAction::FollowTrail);
        }
        if observation.oxygen < self.hypoxic_oxygen {
            return Ok(PolicyAction::Target);
        }
        Ok(PolicyAction::Explore)
    }
}
