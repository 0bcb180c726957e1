//! The user's own recording of a clip, and the audio blob it is made from.
//!
//! There is at most one recording per (user, clip). Every save overwrites
//! the object stored under [`storage_key`].

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Default MIME type produced by browser-style recorders.
pub const DEFAULT_AUDIO_MIME: &str = "audio/webm";

/// Fixed storage key for a (user, clip) recording.
pub fn storage_key(user_id: DbId, clip_id: DbId) -> String {
    format!("{user_id}/{clip_id}")
}

/// A persisted recording slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub user_id: DbId,
    pub clip_id: DbId,
    pub storage_path: String,
    pub created_at: Timestamp,
}

/// Finite audio captured by a recorder adapter.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub duration_ms: u64,
}

impl AudioBlob {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            duration_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// Audio payloads are large; keep them out of debug logs.
impl std::fmt::Debug for AudioBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBlob")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("duration_ms", &self.duration_ms)
            .finish()
    }
}
