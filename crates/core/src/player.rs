//! Remote player adapter contract.
//!
//! Commands are fire-and-forget: their effect is observed later through
//! [`PlayerEvent`]s, which the adapter delivers out of band. An adapter that
//! loses its connection simply stops emitting events.

use serde::{Deserialize, Serialize};

/// Closed set of player states the session reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    CueMarked,
}

impl PlayerState {
    /// Translate an embedded player's numeric state code.
    ///
    /// Codes follow the common iframe embed convention:
    /// `-1` unstarted, `0` ended, `1` playing, `2` paused, `3` buffering,
    /// `5` cued. Unknown codes yield `None`.
    pub fn from_embed_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::Unstarted),
            0 => Some(Self::Ended),
            1 => Some(Self::Playing),
            2 => Some(Self::Paused),
            3 => Some(Self::Buffering),
            5 => Some(Self::CueMarked),
            _ => None,
        }
    }
}

/// Asynchronous notification from the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Ready,
    StateChange(PlayerState),
}

/// Handle on an embedded video player.
///
/// Implementations must not block: every call returns immediately and the
/// real player catches up on its own schedule.
pub trait PlayerAdapter: Send + Sync {
    /// Load `video_id` bounded to `[start_sec, end_sec)`.
    fn load(&self, video_id: &str, start_sec: f64, end_sec: f64);

    fn play(&self);

    fn pause(&self);

    fn seek(&self, time_sec: f64);

    /// Last position the player reported, in seconds.
    fn current_time(&self) -> f64;

    fn set_rate(&self, rate: f64);

    /// Release the underlying player. Called once when the session closes.
    fn destroy(&self) {}
}
