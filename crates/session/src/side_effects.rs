//! Fire-and-forget persistence calls.
//!
//! History entries, streak bumps and favorites must never block or fail the
//! practice flow. Failures are logged and otherwise ignored.

use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinHandle;

/// Spawn `fut` in the background, logging its outcome under `task`.
pub fn spawn_best_effort<F, E>(task: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        match fut.await {
            Ok(()) => tracing::debug!(task, "Background update completed"),
            Err(e) => tracing::warn!(task, error = %e, "Background update failed"),
        }
    })
}
