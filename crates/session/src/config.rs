use std::time::Duration;

use shadow_core::session::{MachineConfig, DEFAULT_END_PAUSE_TOLERANCE_MS};

/// Default polling interval for sampling the player clock.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Default delay between the pause and the seek of a mode switch.
pub const DEFAULT_MODE_SWITCH_SEEK_DELAY_MS: u64 = 200;

/// Default lifetime requested for signed playback URLs.
pub const DEFAULT_PLAYBACK_URL_TTL_SECS: u64 = 3600;

/// Session runtime configuration loaded from environment variables.
///
/// All fields have defaults tuned for an embedded web player.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the player clock is sampled while playing.
    pub poll_interval: Duration,
    /// Window before the clip end where a pause counts as completion.
    pub end_pause_tolerance_ms: u64,
    /// Delay before seeking after the pause issued by a mode switch.
    pub mode_switch_seek_delay: Duration,
    /// TTL requested for signed playback URLs.
    pub playback_url_ttl_secs: u64,
}

impl SessionConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `POLL_INTERVAL_MS`          | `50`    |
    /// | `END_PAUSE_TOLERANCE_MS`    | `200`   |
    /// | `MODE_SWITCH_SEEK_DELAY_MS` | `200`   |
    /// | `PLAYBACK_URL_TTL_SECS`     | `3600`  |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to
    /// the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str, default: u64| -> u64 {
            match lookup(key) {
                None => default,
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    tracing::warn!(key, value = %raw, default, "Invalid config value, using default");
                    default
                }),
            }
        };

        let mut poll_interval_ms = read("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS);
        if poll_interval_ms == 0 {
            tracing::warn!(
                default = DEFAULT_POLL_INTERVAL_MS,
                "POLL_INTERVAL_MS must be positive, using default"
            );
            poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        }

        Self {
            poll_interval: Duration::from_millis(poll_interval_ms),
            end_pause_tolerance_ms: read("END_PAUSE_TOLERANCE_MS", DEFAULT_END_PAUSE_TOLERANCE_MS),
            mode_switch_seek_delay: Duration::from_millis(read(
                "MODE_SWITCH_SEEK_DELAY_MS",
                DEFAULT_MODE_SWITCH_SEEK_DELAY_MS,
            )),
            playback_url_ttl_secs: read("PLAYBACK_URL_TTL_SECS", DEFAULT_PLAYBACK_URL_TTL_SECS),
        }
    }

    /// The subset of settings the pure state machine needs.
    pub fn machine(&self) -> MachineConfig {
        MachineConfig {
            end_pause_tolerance_ms: self.end_pause_tolerance_ms,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
