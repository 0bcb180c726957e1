//! In-process adapters for tests, demos and the replay binary.
//!
//! [`SimulatedPlayer`] advances a media clock on the tokio timer, so tests
//! running on a paused runtime observe deterministic positions.

pub mod gateway;
pub mod player;
pub mod recorder;

pub use gateway::MemoryGateway;
pub use player::{PlayerCommand, SimulatedPlayer};
pub use recorder::SimulatedRecorder;
