//! Cache for the signed URL of the user's stored recording.
//!
//! Signed URLs are time-limited. A cached URL is handed out until shortly
//! before it expires, then a fresh one must be requested.

use std::time::Duration;

use tokio::time::Instant;

/// Refresh this long before the gateway-side expiry, capped at a tenth of
/// the TTL for short-lived URLs.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct CachedUrl {
    storage_path: String,
    url: String,
    refresh_at: Instant,
}

#[derive(Debug, Default)]
pub struct PlaybackUrlCache {
    entry: Option<CachedUrl>,
}

impl PlaybackUrlCache {
    /// The cached URL for `storage_path`, if still fresh at `now`.
    pub fn get(&self, storage_path: &str, now: Instant) -> Option<&str> {
        self.entry
            .as_ref()
            .filter(|e| e.storage_path == storage_path && now < e.refresh_at)
            .map(|e| e.url.as_str())
    }

    pub fn store(&mut self, storage_path: &str, url: String, ttl: Duration, now: Instant) {
        let margin = EXPIRY_MARGIN.min(ttl / 10);
        self.entry = Some(CachedUrl {
            storage_path: storage_path.to_string(),
            url,
            refresh_at: now + ttl.saturating_sub(margin),
        });
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
