//! Microphone recorder adapter contract.

use async_trait::async_trait;

use crate::recording::AudioBlob;

/// Why a recorder could not start capturing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecorderError {
    #[error("Microphone access was denied")]
    PermissionDenied,

    #[error("No microphone is available")]
    DeviceUnavailable,

    #[error("Microphone error: {0}")]
    DeviceError(String),
}

/// Local audio capture: start, capture continuously, stop into one blob.
///
/// At most one capture is in flight per instance. Calling [`start`] while a
/// capture is running violates the contract; the session never does so.
///
/// [`start`]: RecorderAdapter::start
#[async_trait]
pub trait RecorderAdapter: Send + Sync {
    /// Acquire the microphone and begin capturing.
    ///
    /// May wait indefinitely on a user permission prompt.
    async fn start(&self) -> Result<(), RecorderError>;

    /// Finish capturing and hand back the audio.
    ///
    /// Returns `None` when no capture was running.
    async fn stop(&self) -> Option<AudioBlob>;
}
