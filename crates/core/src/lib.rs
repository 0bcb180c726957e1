//! Domain logic for the shadowing practice session.
//!
//! Pure types and transitions only: no I/O, no clocks, no task spawning.
//! The async runtime that drives a session lives in `shadow-session`.

pub mod clip;
pub mod error;
pub mod gateway;
pub mod loop_range;
pub mod playback_rate;
pub mod player;
pub mod recorder;
pub mod recording;
pub mod session;
pub mod speech_rate;
pub mod transcript;
pub mod types;
