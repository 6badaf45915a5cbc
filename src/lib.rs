//! nanoswarm-core - Tumor microenvironment simulation with a drug-delivery
//! nanobot swarm.
//!
//! The engine has three interacting layers: a finite-volume substrate grid
//! (oxygen, drug, signaling fields), a tumor/immune cell population with
//! phase machines and pharmacodynamics, and a swarm of nanobot agents that
//! navigate by chemotaxis under queen-level coordination. Everything is
//! deterministic under a fixed seed.

pub mod config;
pub mod microenv;
pub mod model;
pub mod policy;
pub mod snapshot;
pub mod swarm;
pub mod telemetry;
pub mod tumor;

pub use config::{ConfigError, SimulationConfig, SubstrateSpec};
pub use microenv::Microenvironment;
pub use model::TumorNanobotModel;
pub use policy::{DecisionPolicy, GradientPolicy, PolicyAction};
pub use snapshot::StepSnapshot;
pub use swarm::{BotState, Nanobot, QueenCoordinator};
pub use telemetry::{TelemetryEvent, TelemetrySink};
pub use tumor::TumorGeometry;

/// Initialize tracing for the library.
pub fn setup_logging(level: Option<String>) {
    let filter = level.unwrap_or_else(|| "info".to_string());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
