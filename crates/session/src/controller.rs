//! Async runtime around the pure [`SessionState`] machine.
//!
//! A [`PracticeSession`] owns one player, one recorder and a gateway handle.
//! Every input (user action, player event, polling tick, completion of a
//! spawned task) locks the state, applies one transition and carries out the
//! returned effects before releasing the lock. Effects are therefore applied
//! in order and never interleave with another transition.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shadow_core::clip::Clip;
use shadow_core::error::CoreError;
use shadow_core::gateway::SessionGateway;
use shadow_core::loop_range::LoopMarker;
use shadow_core::player::{PlayerAdapter, PlayerEvent};
use shadow_core::recorder::RecorderAdapter;
use shadow_core::recording::Recording;
use shadow_core::session::{Effect, Mode, SessionNotice, SessionState, Snapshot};
use shadow_core::types::DbId;
use shadow_events::{EventBus, SessionEvent};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::driver;
use crate::error::SessionError;
use crate::playback_url::PlaybackUrlCache;
use crate::side_effects::spawn_best_effort;

/// Adapters and channels a session is built from.
pub struct SessionDeps {
    pub player: Arc<dyn PlayerAdapter>,
    /// Receiving half of the player's event channel.
    pub player_events: mpsc::UnboundedReceiver<PlayerEvent>,
    pub recorder: Arc<dyn RecorderAdapter>,
    pub gateway: Arc<dyn SessionGateway>,
    pub events: Arc<EventBus>,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// The persisted recording for the current clip.
struct RecordingSlot {
    /// Bumped whenever the clip changes. Gateway results that started under
    /// an older epoch are dropped.
    epoch: u64,
    clip_id: DbId,
    recording: Option<Recording>,
    url: PlaybackUrlCache,
}

/// State shared between the handle, the driver and spawned completions.
///
/// Lock order is `state` before `slot`.
pub(crate) struct SessionInner {
    pub(crate) user_id: DbId,
    pub(crate) state: Mutex<SessionState>,
    slot: Mutex<RecordingSlot>,
    pub(crate) player: Arc<dyn PlayerAdapter>,
    recorder: Arc<dyn RecorderAdapter>,
    gateway: Arc<dyn SessionGateway>,
    events: Arc<EventBus>,
    pub(crate) config: SessionConfig,
    pub(crate) cancel: CancellationToken,
}

impl SessionInner {
    /// Carry out `effects` for the transition that produced them.
    ///
    /// Must be called while the `state` guard is held.
    pub(crate) fn apply(self: &Arc<Self>, state: &SessionState, effects: Vec<Effect>) {
        let clip_id = state.clip().id;
        for effect in effects {
            match effect {
                Effect::Play => self.player.play(),
                Effect::Pause => self.player.pause(),
                Effect::Seek(to_sec) => self.player.seek(to_sec),
                Effect::SetRate(rate) => self.player.set_rate(rate),
                Effect::SeekAfterPause { to_sec, generation } => {
                    self.spawn_deferred_seek(to_sec, generation)
                }
                Effect::StartRecorder { generation } => self.spawn_recorder_start(generation),
                Effect::StopRecorder { generation, keep } => {
                    self.spawn_recorder_stop(generation, keep)
                }
                Effect::Notify(notice) => self.publish(clip_id, notice),
            }
        }
    }

    fn publish(&self, clip_id: DbId, notice: SessionNotice) {
        match &notice {
            SessionNotice::Error { message } => {
                tracing::warn!(user_id = self.user_id, clip_id, %message, "Session error surfaced");
            }
            SessionNotice::ActiveLineChanged { .. } | SessionNotice::LoopRestarted { .. } => {
                tracing::trace!(clip_id, kind = notice.kind(), "Session notice");
            }
            _ => tracing::debug!(clip_id, kind = notice.kind(), "Session notice"),
        }
        self.events
            .publish(SessionEvent::new(notice).for_session(self.user_id, clip_id));
    }

    pub(crate) async fn handle_player_event(self: &Arc<Self>, event: PlayerEvent) {
        let mut state = self.state.lock().await;
        let now_sec = self.player.current_time();
        tracing::debug!(?event, now_sec, "Player event");
        let effects = state.on_player_event(event, now_sec);
        self.apply(&state, effects);
    }

    pub(crate) async fn handle_tick(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if !state.is_playing() {
            return;
        }
        let now_sec = self.player.current_time();
        let effects = state.on_tick(now_sec);
        self.apply(&state, effects);
    }

    // -- spawned completions -------------------------------------------------

    fn spawn_deferred_seek(self: &Arc<Self>, to_sec: f64, generation: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(inner.config.mode_switch_seek_delay).await;
            let mut state = inner.state.lock().await;
            match state.settle_seek(generation, to_sec) {
                Some(effect) => inner.apply(&state, vec![effect]),
                None => tracing::debug!(generation, "Dropped superseded seek"),
            }
        });
    }

    fn spawn_recorder_start(self: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner.recorder.start().await;
            let mut state = inner.state.lock().await;
            let effects = match result {
                Ok(()) => {
                    tracing::info!(user_id = inner.user_id, generation, "Microphone capture started");
                    state.recorder_started(generation)
                }
                Err(e) => {
                    tracing::warn!(user_id = inner.user_id, generation, error = %e, "Microphone capture failed to start");
                    state.recorder_start_failed(generation, &e)
                }
            };
            inner.apply(&state, effects);
        });
    }

    fn spawn_recorder_stop(self: &Arc<Self>, generation: u64, keep: bool) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let audio = inner.recorder.stop().await;
            tracing::debug!(
                generation,
                keep,
                bytes = audio.as_ref().map(|a| a.len()).unwrap_or(0),
                "Microphone capture stopped"
            );
            let mut state = inner.state.lock().await;
            let effects = state.recorder_stopped(generation, audio, keep);
            inner.apply(&state, effects);
        });
    }

    fn spawn_recording_load(self: &Arc<Self>, epoch: u64, clip_id: DbId) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner.gateway.get_recording(inner.user_id, clip_id).await;
            let mut slot = inner.slot.lock().await;
            if slot.epoch != epoch {
                tracing::debug!(clip_id, epoch, "Dropped stale recording load");
                return;
            }
            match result {
                Ok(recording) => {
                    slot.recording = recording.clone();
                    slot.url.invalidate();
                    inner.publish(clip_id, SessionNotice::RecordingLoaded { recording });
                }
                Err(e) => {
                    tracing::warn!(user_id = inner.user_id, clip_id, error = %e, "Failed to load recording");
                    inner.publish(
                        clip_id,
                        SessionNotice::error("Could not load your previous recording"),
                    );
                }
            }
        });
    }

    /// Discard any capture in progress and destroy the player.
    async fn teardown(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            let effects = state.close();
            self.apply(&state, effects);
        }
        self.player.destroy();
    }

    fn log_practice(&self, clip_id: DbId) {
        let gateway = Arc::clone(&self.gateway);
        let user_id = self.user_id;
        spawn_best_effort("record_practice_event", async move {
            gateway.record_practice_event(user_id, clip_id, Utc::now()).await
        });
    }
}

// ---------------------------------------------------------------------------
// PracticeSession
// ---------------------------------------------------------------------------

/// Handle on a running practice session.
///
/// All user operations go through this handle. Refused actions return
/// [`SessionError::Core`] with a [`CoreError::Conflict`] and leave the state
/// untouched.
pub struct PracticeSession {
    inner: Arc<SessionInner>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl PracticeSession {
    /// Fetch `clip_id` from the gateway and start a session on it.
    pub async fn open(
        user_id: DbId,
        clip_id: DbId,
        deps: SessionDeps,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let clip = deps.gateway.get_clip(clip_id).await?;
        Self::start(user_id, clip, deps, config)
    }

    /// Start a session on an already loaded clip.
    ///
    /// Loads the player, appends the practice history entry, fetches any
    /// existing recording and spawns the polling driver. Must be called
    /// from within a tokio runtime.
    pub fn start(
        user_id: DbId,
        clip: Clip,
        deps: SessionDeps,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        clip.validate()?;
        let clip = Arc::new(clip);

        // Rate is applied once the player reports ready.
        deps.player
            .load(&clip.video_id, clip.start_sec, clip.end_sec);

        let inner = Arc::new(SessionInner {
            user_id,
            state: Mutex::new(SessionState::new(Arc::clone(&clip), config.machine())),
            slot: Mutex::new(RecordingSlot {
                epoch: 0,
                clip_id: clip.id,
                recording: None,
                url: PlaybackUrlCache::default(),
            }),
            player: deps.player,
            recorder: deps.recorder,
            gateway: deps.gateway,
            events: deps.events,
            config,
            cancel: CancellationToken::new(),
        });

        tracing::info!(
            user_id,
            clip_id = clip.id,
            video_id = %clip.video_id,
            start_sec = clip.start_sec,
            end_sec = clip.end_sec,
            "Practice session opened"
        );

        inner.log_practice(clip.id);
        inner.spawn_recording_load(0, clip.id);
        let driver = tokio::spawn(driver::run(Arc::clone(&inner), deps.player_events));

        Ok(Self {
            inner,
            driver: Mutex::new(Some(driver)),
        })
    }

    pub fn user_id(&self) -> DbId {
        self.inner.user_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.state.lock().await.snapshot()
    }

    pub async fn clip(&self) -> Arc<Clip> {
        Arc::clone(self.inner.state.lock().await.clip())
    }

    /// The persisted recording for the current clip, if any.
    pub async fn recording(&self) -> Option<Recording> {
        self.inner.slot.lock().await.recording.clone()
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(CoreError::Conflict("The session has ended".to_string()).into());
        }
        Ok(())
    }

    /// Apply one user-triggered transition.
    async fn act<F>(&self, action: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut SessionState) -> Result<Vec<Effect>, CoreError>,
    {
        self.ensure_open()?;
        let mut state = self.inner.state.lock().await;
        let effects = action(&mut *state)?;
        self.inner.apply(&state, effects);
        Ok(())
    }

    // -- playback ------------------------------------------------------------

    /// Forward a play press. The state follows once the player reports it.
    pub fn play(&self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.inner.player.play();
        Ok(())
    }

    pub fn pause(&self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.inner.player.pause();
        Ok(())
    }

    pub async fn restart(&self) -> Result<(), SessionError> {
        self.act(SessionState::restart).await
    }

    pub async fn cycle_rate(&self) -> Result<(), SessionError> {
        self.act(|state| Ok(state.cycle_rate())).await
    }

    pub async fn set_rate(&self, rate: f64) -> Result<(), SessionError> {
        self.act(|state| state.set_rate(rate)).await
    }

    /// Mark or clear a loop marker at the player's current position.
    pub async fn toggle_loop_marker(&self, marker: LoopMarker) -> Result<(), SessionError> {
        let player = Arc::clone(&self.inner.player);
        self.act(move |state| Ok(state.toggle_loop_marker(marker, player.current_time())))
            .await
    }

    pub async fn clear_loop(&self) -> Result<(), SessionError> {
        self.act(|state| Ok(state.clear_loop())).await
    }

    // -- mode ----------------------------------------------------------------

    pub async fn switch_mode(&self, mode: Mode) -> Result<(), SessionError> {
        self.act(|state| state.switch_mode(mode)).await
    }

    pub async fn toggle_mode(&self) -> Result<(), SessionError> {
        self.act(SessionState::toggle_mode).await
    }

    // -- recording -----------------------------------------------------------

    /// Rewind, play, and start capturing from the microphone.
    pub async fn start_recording(&self) -> Result<(), SessionError> {
        self.act(SessionState::begin_recording).await
    }

    /// Stop capturing and keep the audio for review.
    pub async fn finish_recording(&self) -> Result<(), SessionError> {
        self.act(SessionState::finish_recording).await
    }

    /// Stop capturing and throw the audio away.
    pub async fn give_up_recording(&self) -> Result<(), SessionError> {
        self.act(SessionState::abandon_recording).await
    }

    pub async fn discard_review(&self) -> Result<(), SessionError> {
        self.act(SessionState::discard_review).await
    }

    /// Upload the reviewed audio, overwriting any previous recording.
    ///
    /// On failure the audio stays in review so the user can retry.
    pub async fn save_recording(&self) -> Result<Recording, SessionError> {
        self.ensure_open()?;
        let (generation, audio, clip_id) = {
            let mut state = self.inner.state.lock().await;
            let (generation, audio) = state.begin_save()?;
            (generation, audio, state.clip().id)
        };
        let user_id = self.inner.user_id;

        tracing::info!(
            user_id,
            clip_id,
            bytes = audio.len(),
            duration_ms = audio.duration_ms,
            "Uploading recording"
        );

        match self
            .inner
            .gateway
            .save_recording(user_id, clip_id, audio)
            .await
        {
            Ok(recording) => {
                {
                    let mut slot = self.inner.slot.lock().await;
                    if slot.clip_id == clip_id {
                        // Supersedes any load still in flight.
                        slot.epoch += 1;
                        slot.recording = Some(recording.clone());
                        slot.url.invalidate();
                    }
                }
                self.inner.publish(
                    clip_id,
                    SessionNotice::RecordingSaved {
                        recording: recording.clone(),
                    },
                );
                {
                    let mut state = self.inner.state.lock().await;
                    let effects = state.save_succeeded(generation);
                    self.inner.apply(&state, effects);
                }

                let gateway = Arc::clone(&self.inner.gateway);
                spawn_best_effort("update_streak", async move {
                    gateway.update_streak(user_id).await
                });

                tracing::info!(user_id, clip_id, storage_path = %recording.storage_path, "Recording saved");
                Ok(recording)
            }
            Err(e) => {
                tracing::warn!(user_id, clip_id, error = %e, "Recording upload failed");
                let mut state = self.inner.state.lock().await;
                let effects =
                    state.save_failed(generation, "Could not save your recording, please try again");
                self.inner.apply(&state, effects);
                Err(e.into())
            }
        }
    }

    /// Signed URL for playing back the stored recording.
    ///
    /// Cached for the session and re-requested shortly before it expires.
    pub async fn playback_url(&self) -> Result<Option<String>, SessionError> {
        self.ensure_open()?;
        let (epoch, clip_id, storage_path) = {
            let slot = self.inner.slot.lock().await;
            let Some(recording) = slot.recording.as_ref() else {
                return Ok(None);
            };
            if let Some(url) = slot.url.get(&recording.storage_path, Instant::now()) {
                return Ok(Some(url.to_string()));
            }
            (slot.epoch, slot.clip_id, recording.storage_path.clone())
        };

        let ttl_secs = self.inner.config.playback_url_ttl_secs;
        let url = match self
            .inner
            .gateway
            .signed_playback_url(&storage_path, ttl_secs)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(clip_id, error = %e, "Failed to sign playback URL");
                self.inner.publish(
                    clip_id,
                    SessionNotice::error("Could not load your recording for playback"),
                );
                return Err(e.into());
            }
        };

        let mut slot = self.inner.slot.lock().await;
        if slot.epoch == epoch {
            slot.url.store(
                &storage_path,
                url.clone(),
                Duration::from_secs(ttl_secs),
                Instant::now(),
            );
        }
        Ok(Some(url))
    }

    pub async fn delete_recording(&self) -> Result<(), SessionError> {
        self.ensure_open()?;
        let clip_id = self.inner.slot.lock().await.clip_id;
        let user_id = self.inner.user_id;

        if let Err(e) = self.inner.gateway.delete_recording(user_id, clip_id).await {
            tracing::warn!(user_id, clip_id, error = %e, "Failed to delete recording");
            self.inner
                .publish(clip_id, SessionNotice::error("Could not delete your recording"));
            return Err(e.into());
        }

        {
            let mut slot = self.inner.slot.lock().await;
            if slot.clip_id == clip_id {
                slot.epoch += 1;
                slot.recording = None;
                slot.url.invalidate();
            }
        }
        tracing::info!(user_id, clip_id, "Recording deleted");
        self.inner.publish(clip_id, SessionNotice::RecordingDeleted);
        Ok(())
    }

    // -- clip ----------------------------------------------------------------

    pub async fn set_favorite(&self, favorite: bool) -> Result<(), SessionError> {
        self.ensure_open()?;
        let clip_id = self.inner.slot.lock().await.clip_id;
        let user_id = self.inner.user_id;
        let result = if favorite {
            self.inner.gateway.add_favorite(user_id, clip_id).await
        } else {
            self.inner.gateway.remove_favorite(user_id, clip_id).await
        };
        if let Err(e) = result {
            tracing::warn!(user_id, clip_id, favorite, error = %e, "Failed to update favorite");
            self.inner
                .publish(clip_id, SessionNotice::error("Could not update your favorites"));
            return Err(e.into());
        }
        Ok(())
    }

    /// Move the session to another clip.
    ///
    /// The player is reloaded only when the video changes; a new time range
    /// on the same video is a seek. Rate and the unlock flag carry over.
    pub async fn replace_clip(&self, clip: Clip) -> Result<(), SessionError> {
        self.ensure_open()?;
        clip.validate()?;
        let clip = Arc::new(clip);

        let mut state = self.inner.state.lock().await;
        let same_video = state.clip().video_id == clip.video_id;
        let mut effects = state.replace_clip(Arc::clone(&clip))?;

        if same_video {
            effects.insert(0, Effect::Seek(clip.start_sec));
            effects.insert(0, Effect::Pause);
        } else {
            self.inner
                .player
                .load(&clip.video_id, clip.start_sec, clip.end_sec);
        }
        self.inner.apply(&state, effects);

        let epoch = {
            let mut slot = self.inner.slot.lock().await;
            slot.epoch += 1;
            slot.clip_id = clip.id;
            slot.recording = None;
            slot.url.invalidate();
            slot.epoch
        };
        drop(state);

        tracing::info!(
            user_id = self.inner.user_id,
            clip_id = clip.id,
            reloaded = !same_video,
            "Practice session moved to new clip"
        );

        self.inner.log_practice(clip.id);
        self.inner.spawn_recording_load(epoch, clip.id);
        Ok(())
    }

    /// Tear the session down.
    ///
    /// Stops the driver, discards any capture in progress and destroys the
    /// player. Idempotent.
    pub async fn close(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();
        self.inner.teardown().await;

        if let Some(handle) = self.driver.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Session driver task failed");
            }
        }
        tracing::info!(user_id = self.inner.user_id, "Practice session closed");
    }
}

impl fmt::Debug for PracticeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PracticeSession")
            .field("user_id", &self.inner.user_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Dropping an open session tears it down in the background.
impl Drop for PracticeSession {
    fn drop(&mut self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inner = Arc::clone(&self.inner);
                runtime.spawn(async move {
                    inner.teardown().await;
                    tracing::info!(user_id = inner.user_id, "Dropped practice session torn down");
                });
            }
            Err(_) => {
                tracing::warn!(
                    user_id = self.inner.user_id,
                    "Practice session dropped outside a runtime, microphone may stay open"
                );
                self.inner.player.destroy();
            }
        }
    }
}
