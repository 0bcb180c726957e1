//! The scripted walk through a session.

use std::time::Duration;

use anyhow::Context;
use shadow_core::loop_range::LoopMarker;
use shadow_core::session::{Mode, RecordingPhase};
use shadow_events::SessionEvent;
use shadow_session::{PracticeSession, SessionConfig};
use tokio::sync::broadcast::{self, error::RecvError};

/// Log every session event as JSON until the bus is dropped.
pub async fn log_events(mut rx: broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match event.event_type {
                "transcript.line_changed" => tracing::debug!(event = %event.to_json(), "event"),
                _ => tracing::info!(event = %event.to_json(), "event"),
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Sleep for `media_sec` of clip time at `time_scale`.
async fn wait_media(media_sec: f64, time_scale: f64) {
    tokio::time::sleep(Duration::from_secs_f64(media_sec / time_scale)).await;
}

/// Practice with a loop, then record, review and save one take.
pub async fn run(
    session: &PracticeSession,
    config: &SessionConfig,
    time_scale: f64,
) -> anyhow::Result<()> {
    let clip = session.clip().await;
    let duration = clip.duration_sec();

    // -- practice --
    session.play()?;
    wait_media(duration / 3.0, time_scale).await;
    session.toggle_loop_marker(LoopMarker::A).await?;
    let loop_range = session.snapshot().await.loop_range;
    tracing::info!(?loop_range, "Loop marker A set");

    // Run past the end once so the loop restarts.
    wait_media(duration, time_scale).await;
    session.cycle_rate().await?;
    session.clear_loop().await?;
    session.pause()?;

    // -- recording --
    session.switch_mode(Mode::Recording).await?;
    tokio::time::sleep(config.mode_switch_seek_delay + config.poll_interval).await;
    session.start_recording().await?;

    // Slowest rate is 0.5x; allow for it plus polling slack.
    let deadline = tokio::time::Instant::now()
        + Duration::from_secs_f64(duration * 2.0 / time_scale)
        + Duration::from_secs(2);
    loop {
        let snapshot = session.snapshot().await;
        if snapshot.phase == RecordingPhase::Reviewing && snapshot.has_review_audio {
            break;
        }
        if snapshot.phase == RecordingPhase::Idle {
            anyhow::bail!("recording ended without audio to review");
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for the recording to finish");
        }
        tokio::time::sleep(config.poll_interval).await;
    }

    let recording = session
        .save_recording()
        .await
        .context("saving the recording")?;
    let url = session.playback_url().await?;
    tracing::info!(
        storage_path = %recording.storage_path,
        playback_url = url.as_deref().unwrap_or("-"),
        "Take saved"
    );

    let snapshot = serde_json::to_string(&session.snapshot().await)?;
    tracing::info!(%snapshot, "Final session state");
    Ok(())
}
