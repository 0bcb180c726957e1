//! Outputs of the session machine.

use serde::Serialize;

use crate::loop_range::LoopRange;
use crate::recording::Recording;
use crate::session::{Mode, RecordingPhase};
use crate::transcript::ActiveLine;

/// An action the runtime must perform on the machine's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Play,
    Pause,
    Seek(f64),
    SetRate(f64),
    /// Seek once a preceding pause has settled in the player.
    ///
    /// Dropped if the machine's generation has moved on by then.
    SeekAfterPause { to_sec: f64, generation: u64 },
    StartRecorder { generation: u64 },
    /// Stop the recorder. `keep` means the audio goes to review.
    StopRecorder { generation: u64, keep: bool },
    Notify(SessionNotice),
}

/// Why captured audio was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// The player paused before the clip end.
    PlaybackInterrupted,
    /// The user gave up mid-recording.
    UserAbandoned,
    /// The user chose not to keep a reviewed recording.
    ReviewDiscarded,
    ModeSwitched,
    SessionClosed,
}

/// Something the presentation layer should hear about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionNotice {
    Unlocked,
    ModeChanged { mode: Mode },
    PhaseChanged { phase: RecordingPhase },
    ActiveLineChanged { line: Option<ActiveLine> },
    LoopChanged { range: LoopRange },
    LoopRestarted { from_sec: f64, to_sec: f64 },
    RateChanged { rate: f64 },
    ReviewReady { duration_ms: u64 },
    RecordingDiscarded { reason: DiscardReason },
    RecordingSaved { recording: Recording },
    RecordingLoaded { recording: Option<Recording> },
    RecordingDeleted,
    /// Short user-facing failure message.
    Error { message: String },
}

impl SessionNotice {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Dot-separated name used as the event type on the bus.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unlocked => "session.unlocked",
            Self::ModeChanged { .. } => "session.mode_changed",
            Self::PhaseChanged { .. } => "recording.phase_changed",
            Self::ActiveLineChanged { .. } => "transcript.line_changed",
            Self::LoopChanged { .. } => "loop.changed",
            Self::LoopRestarted { .. } => "loop.restarted",
            Self::RateChanged { .. } => "playback.rate_changed",
            Self::ReviewReady { .. } => "recording.review_ready",
            Self::RecordingDiscarded { .. } => "recording.discarded",
            Self::RecordingSaved { .. } => "recording.saved",
            Self::RecordingLoaded { .. } => "recording.loaded",
            Self::RecordingDeleted => "recording.deleted",
            Self::Error { .. } => "session.error",
        }
    }
}
