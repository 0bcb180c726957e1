//! Replays a scripted practice session against the simulated adapters.
//!
//! Usage: `shadow-replay [clip.json]`. Without an argument the clip is read
//! from `REPLAY_CLIP_PATH`, falling back to the bundled sample.

mod clip_file;
mod script;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shadow_events::EventBus;
use shadow_session::sim::{MemoryGateway, SimulatedPlayer, SimulatedRecorder};
use shadow_session::{PracticeSession, SessionConfig, SessionDeps};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// User the replay session runs as.
const REPLAY_USER_ID: i64 = 1;

/// Default media speed-up so a replay finishes in a few seconds.
const DEFAULT_TIME_SCALE: f64 = 10.0;

const LOGGER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shadow_session=debug,shadow_replay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let clip_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("REPLAY_CLIP_PATH").ok())
        .map(PathBuf::from);
    let clip = clip_file::load(clip_path.as_deref())?;

    let time_scale: f64 = std::env::var("REPLAY_TIME_SCALE")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v: &f64| v.is_finite() && *v > 0.0)
        .unwrap_or(DEFAULT_TIME_SCALE);

    let config = SessionConfig::from_env();
    tracing::info!(
        clip_id = clip.id,
        video_id = %clip.video_id,
        duration_sec = clip.duration_sec(),
        speech_rate_wpm = clip.speech_rate_wpm,
        time_scale,
        "Replay starting"
    );

    let gateway = MemoryGateway::new();
    gateway.insert_clip(clip.clone()).await;
    let (player, player_events) = SimulatedPlayer::with_time_scale(time_scale);
    let bus = Arc::new(EventBus::default());

    let logger = tokio::spawn(script::log_events(bus.subscribe()));

    let session = PracticeSession::open(
        REPLAY_USER_ID,
        clip.id,
        SessionDeps {
            player,
            player_events,
            recorder: SimulatedRecorder::new(),
            gateway: gateway.clone(),
            events: Arc::clone(&bus),
        },
        config.clone(),
    )
    .await?;

    let outcome = script::run(&session, &config, time_scale).await;
    session.close().await;
    drop(session);
    drop(bus);
    // Completions spawned by the session may briefly keep the bus alive.
    if tokio::time::timeout(LOGGER_DRAIN_TIMEOUT, logger).await.is_err() {
        tracing::debug!("Event logger still draining, detaching");
    }

    outcome?;
    let recordings = gateway.recording_count().await;
    let streak = gateway.streak(REPLAY_USER_ID).await;
    let history = gateway.history().await.len();
    tracing::info!(recordings, streak, history, "Replay finished");
    Ok(())
}
