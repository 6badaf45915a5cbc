//! Simulation configuration.
//!
//! All tunables enter the model through these structs; the core never reads
//! environment variables or global state. Invalid geometry and numerically
//! unstable substrate parameters are rejected at construction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Conversion factor: 1 cm²/s = 6e9 µm²/min.
pub const CM2_PER_S_TO_UM2_PER_MIN: f32 = 6.0e9;

/// Hard cap on the integration timestep (minutes).
pub const MAX_DT_MIN: f32 = 0.1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("domain size must be positive, got {0}")]
    InvalidDomain(f32),
    #[error("voxel size must be positive and no larger than the domain, got {0}")]
    InvalidVoxelSize(f32),
    #[error("dimensionality must be 2 or 3, got {0}")]
    InvalidDimensionality(usize),
    #[error("substrate '{0}' is already registered")]
    DuplicateSubstrate(String),
    #[error("tumor radius {tumor} must exceed necrotic core radius {core}")]
    InvalidTumorRadii { tumor: f32, core: f32 },
}

/// Boundary condition for a substrate field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Boundary {
    /// Fixed concentration at the domain edges.
    Dirichlet(f32),
    /// Zero-gradient (no-flux) edges.
    NoFlux,
}

/// Parameters for one diffusible substrate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubstrateSpec {
    pub name: String,
    /// Diffusion coefficient in cm²/s (converted internally to µm²/min).
    pub diffusion_cm2_per_s: f32,
    /// First-order decay rate in 1/min.
    pub decay_rate: f32,
    pub initial_value: f32,
    pub boundary: Boundary,
}

impl SubstrateSpec {
    pub fn oxygen(boundary_mmhg: f32) -> Self {
        SubstrateSpec {
            name: "oxygen".into(),
            diffusion_cm2_per_s: 1.0e-5,
            decay_rate: 0.1,
            initial_value: boundary_mmhg,
            boundary: Boundary::Dirichlet(boundary_mmhg),
        }
    }

    pub fn drug(diffusion_cm2_per_s: f32) -> Self {
        SubstrateSpec {
            name: "drug".into(),
            diffusion_cm2_per_s,
            decay_rate: 0.05,
            initial_value: 0.0,
            boundary: Boundary::Dirichlet(0.0),
        }
    }

    /// Pheromone-class signal: faster diffusion than drug, no-flux edges.
    pub fn signal(name: &str, decay_rate: f32) -> Self {
        SubstrateSpec {
            name: name.into(),
            diffusion_cm2_per_s: 1.0e-6,
            decay_rate,
            initial_value: 0.0,
            boundary: Boundary::NoFlux,
        }
    }
}

/// Tumor geometry generation parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TumorConfig {
    /// Tumor radius in µm.
    pub radius: f32,
    /// Necrotic core radius as a fraction of the tumor radius.
    pub necrotic_core_fraction: f32,
    /// Cells per µm² (2D) or µm³ (3D).
    pub cell_density: f32,
    /// Vessels per µm of tumor periphery.
    pub vessel_density: f32,
}

impl Default for TumorConfig {
    fn default() -> Self {
        TumorConfig {
            radius: 200.0,
            necrotic_core_fraction: 0.25,
            cell_density: 0.001,
            vessel_density: 0.01,
        }
    }
}

/// Queen coordination parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueenConfig {
    pub enabled: bool,
    /// Guidance is recomputed every this many steps.
    pub interval: usize,
    /// Use the three-pool priority policy instead of nearest-hypoxic.
    pub enhanced: bool,
    /// Minimum payload (µg) before an agent is worth directing.
    pub payload_threshold: f32,
}

impl Default for QueenConfig {
    fn default() -> Self {
        QueenConfig {
            enabled: false,
            interval: 10,
            enhanced: false,
            payload_threshold: 10.0,
        }
    }
}

/// Remote decision-advisor parameters. The advisor is optional; when absent
/// the swarm runs on pure chemotaxis heuristics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdvisorConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    /// Hard wall-clock budget per call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        AdvisorConfig {
            endpoint: "http://localhost:8080/v1/chat/completions".into(),
            model: "default".into(),
            api_key: String::new(),
            timeout_ms: 10_000,
        }
    }
}

/// Top-level simulation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Square/cubic domain side length in µm.
    pub domain_size: f32,
    /// Voxel spacing in µm (shared by all axes).
    pub voxel_size: f32,
    pub dimensionality: usize,
    pub n_nanobots: usize,
    pub tumor: TumorConfig,
    pub queen: QueenConfig,
    /// Substrates registered at model construction.
    pub substrates: Vec<SubstrateSpec>,
    /// Per-substrate chemotaxis weights shared by all agents. Negative
    /// weights attract agents down the gradient (toward depletion).
    pub chemotaxis_weights: BTreeMap<String, f32>,
    /// RNG seed; fixed seeds give reproducible trajectories.
    pub seed: u64,
    /// Full-grid substrate snapshots are taken every this many steps.
    /// Zero disables them.
    pub field_snapshot_interval: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let substrates = vec![
            SubstrateSpec::oxygen(38.0),
            SubstrateSpec::drug(1.0e-7),
            SubstrateSpec::signal("trail", 0.1),
            SubstrateSpec::signal("alarm", 0.15),
            SubstrateSpec::signal("recruitment", 0.12),
            SubstrateSpec::signal("chemokine_signal", 0.08),
            SubstrateSpec::signal("toxicity_signal", 0.2),
            SubstrateSpec::signal("ifn_gamma", 0.05),
            SubstrateSpec::signal("tnf_alpha", 0.08),
            SubstrateSpec::signal("perforin", 0.12),
        ];
        let chemotaxis_weights = BTreeMap::from([
            ("oxygen".into(), -1.0),
            ("trail".into(), 0.8),
            ("alarm".into(), -0.5),
            ("recruitment".into(), 0.6),
            ("chemokine_signal".into(), 1.2),
            ("toxicity_signal".into(), -1.5),
        ]);
        SimulationConfig {
            domain_size: 600.0,
            voxel_size: 10.0,
            dimensionality: 2,
            n_nanobots: 10,
            tumor: TumorConfig::default(),
            queen: QueenConfig::default(),
            substrates,
            chemotaxis_weights,
            seed: 42,
            field_snapshot_interval: 10,
        }
    }
}

impl SimulationConfig {
    /// Fail-fast validation of domain geometry and substrate parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain_size <= 0.0 {
            return Err(ConfigError::InvalidDomain(self.domain_size));
        }
        if self.voxel_size <= 0.0 || self.voxel_size > self.domain_size {
            return Err(ConfigError::InvalidVoxelSize(self.voxel_size));
        }
        if self.dimensionality != 2 && self.dimensionality != 3 {
            return Err(ConfigError::InvalidDimensionality(self.dimensionality));
        }
        let core = self.tumor.radius * self.tumor.necrotic_core_fraction;
        if core >= self.tumor.radius || self.tumor.radius <= 0.0 {
            return Err(ConfigError::InvalidTumorRadii {
                tumor: self.tumor.radius,
                core,
            });
        }
        let mut seen = std::collections::BTreeSet::new();
        for spec in &self.substrates {
            if !seen.insert(spec.name.clone()) {
                return Err(ConfigError::DuplicateSubstrate(spec.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn duplicate_substrate_rejected() {
        let mut cfg = SimulationConfig::default();
        cfg.substrates.push(SubstrateSpec::oxygen(38.0));
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DuplicateSubstrate(name)) if name == "oxygen"
        ));
    }

    #[test]
    fn bad_geometry_rejected() {
        let mut cfg = SimulationConfig::default();
        cfg.voxel_size = -1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidVoxelSize(_))));

        let mut cfg = SimulationConfig::default();
        cfg.tumor.necrotic_core_fraction = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidTumorRadii { .. })
        ));
    }
}
