use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use shadow_core::recorder::{RecorderAdapter, RecorderError};
use shadow_core::recording::{AudioBlob, DEFAULT_AUDIO_MIME};
use tokio::time::Instant;

/// Synthetic payload size per captured second.
const BYTES_PER_SEC: u64 = 2_000;

#[derive(Debug, Default)]
struct RecorderState {
    capturing_since: Option<Instant>,
    fail_next_start: Option<RecorderError>,
    start_delay: Duration,
    starts: usize,
}

/// A recorder that "captures" silence for as long as it runs.
///
/// Failures and a permission-prompt delay can be injected before `start`.
#[derive(Debug, Default)]
pub struct SimulatedRecorder {
    state: Mutex<RecorderState>,
}

impl SimulatedRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `start` fail with `error`.
    pub fn fail_next_start(&self, error: RecorderError) {
        self.lock().fail_next_start = Some(error);
    }

    /// Hold every `start` for `delay`, like an open permission prompt.
    pub fn set_start_delay(&self, delay: Duration) {
        self.lock().start_delay = delay;
    }

    pub fn is_capturing(&self) -> bool {
        self.lock().capturing_since.is_some()
    }

    /// Number of captures that actually began.
    pub fn start_count(&self) -> usize {
        self.lock().starts
    }
}

#[async_trait]
impl RecorderAdapter for SimulatedRecorder {
    async fn start(&self) -> Result<(), RecorderError> {
        let delay = self.lock().start_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if let Some(error) = state.fail_next_start.take() {
            return Err(error);
        }
        assert!(
            state.capturing_since.is_none(),
            "start called while a capture is already running"
        );
        state.capturing_since = Some(Instant::now());
        state.starts += 1;
        Ok(())
    }

    async fn stop(&self) -> Option<AudioBlob> {
        let since = self.lock().capturing_since.take()?;
        let duration_ms = since.elapsed().as_millis() as u64;
        let len = (duration_ms * BYTES_PER_SEC / 1000).max(1) as usize;
        Some(AudioBlob::new(vec![0u8; len], DEFAULT_AUDIO_MIME, duration_ms))
    }
}
