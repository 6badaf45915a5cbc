//! The nanobot swarm: individual agent state machines plus the queen
//! coordination layer that nudges searching agents toward high-value
//! targets.

pub mod nanobot;
pub mod queen;

pub use nanobot::{BotState, Nanobot};
pub use queen::QueenCoordinator;
