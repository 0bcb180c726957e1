//! Pure practice-session state machine.
//!
//! [`SessionState`] is the single authoritative record of a session. Every
//! input (player event, polling tick, user action, completion of an async
//! operation) is applied to it synchronously and returns the [`Effect`]s the
//! runtime must carry out. The machine never performs I/O itself, which keeps
//! every transition testable without a player, a microphone, or a clock.
//!
//! Async completions carry the `generation` they were started under. The
//! machine compares it against its current generation and ignores anything
//! issued by a superseded attempt.

pub mod effect;
pub mod machine;

use serde::Serialize;

pub use effect::{DiscardReason, Effect, SessionNotice};
pub use machine::{MachineConfig, SessionState, Snapshot, DEFAULT_END_PAUSE_TOLERANCE_MS};

/// Top-level session mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Practice,
    Recording,
}

impl Mode {
    pub fn other(self) -> Self {
        match self {
            Self::Practice => Self::Recording,
            Self::Recording => Self::Practice,
        }
    }
}

/// Recording sub-state. Only meaningful in [`Mode::Recording`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingPhase {
    Idle,
    Recording,
    Reviewing,
}
