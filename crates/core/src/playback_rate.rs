//! Playback-rate cycle.

use serde::{Serialize, Serializer};

use crate::error::CoreError;

/// Allowed playback multipliers, in cycle order.
pub const PLAYBACK_RATES: &[f64] = &[0.5, 0.75, 0.9, 1.0];

/// Index of `1.0` in [`PLAYBACK_RATES`].
const NORMAL_RATE_INDEX: usize = 3;

/// One of the [`PLAYBACK_RATES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackRate(usize);

impl PlaybackRate {
    pub fn value(self) -> f64 {
        PLAYBACK_RATES[self.0]
    }

    /// The next rate in the cycle, wrapping from the fastest to the slowest.
    pub fn next(self) -> Self {
        Self((self.0 + 1) % PLAYBACK_RATES.len())
    }

    /// Look up an allowed multiplier.
    pub fn from_value(value: f64) -> Result<Self, CoreError> {
        PLAYBACK_RATES
            .iter()
            .position(|&r| (r - value).abs() < f64::EPSILON)
            .map(Self)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Unsupported playback rate {value}. Must be one of: {PLAYBACK_RATES:?}"
                ))
            })
    }
}

impl Default for PlaybackRate {
    fn default() -> Self {
        Self(NORMAL_RATE_INDEX)
    }
}

impl Serialize for PlaybackRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}
