//! The session's event loop.
//!
//! Multiplexes player events and the polling tick onto the shared state
//! until the session's cancellation token fires.

use std::sync::Arc;

use shadow_core::player::PlayerEvent;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::controller::SessionInner;

pub(crate) async fn run(
    inner: Arc<SessionInner>,
    mut player_events: mpsc::UnboundedReceiver<PlayerEvent>,
) {
    let mut interval = tokio::time::interval(inner.config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut events_open = true;

    tracing::debug!(
        user_id = inner.user_id,
        poll_interval_ms = inner.config.poll_interval.as_millis() as u64,
        "Session driver started"
    );

    loop {
        tokio::select! {
            biased;

            _ = inner.cancel.cancelled() => {
                tracing::debug!(user_id = inner.user_id, "Session driver stopping");
                break;
            }
            event = player_events.recv(), if events_open => match event {
                Some(event) => inner.handle_player_event(event).await,
                None => {
                    // Lost connection: keep polling, the tick still catches
                    // the clip end.
                    tracing::warn!(user_id = inner.user_id, "Player event stream closed");
                    events_open = false;
                }
            },
            _ = interval.tick() => inner.handle_tick().await,
        }
    }
}
