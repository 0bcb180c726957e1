//! Async runtime for a shadowing practice session.
//!
//! [`PracticeSession`] drives the pure state machine from `shadow-core`
//! against a player, a microphone recorder and a persistence gateway, and
//! publishes every notice on a [`shadow_events::EventBus`].

pub mod config;
pub mod controller;
mod driver;
pub mod error;
pub mod playback_url;
pub mod side_effects;
pub mod sim;

pub use config::SessionConfig;
pub use controller::{PracticeSession, SessionDeps};
pub use error::SessionError;
