//! The session state and its transitions.

use std::sync::Arc;

use serde::Serialize;

use crate::clip::{seconds_to_ms, Clip};
use crate::error::CoreError;
use crate::loop_range::{LoopMarker, LoopRange};
use crate::player::{PlayerEvent, PlayerState};
use crate::playback_rate::PlaybackRate;
use crate::recorder::RecorderError;
use crate::recording::AudioBlob;
use crate::session::effect::{DiscardReason, Effect, SessionNotice};
use crate::session::{Mode, RecordingPhase};
use crate::transcript::{ActiveLine, TranscriptIndex};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default window before the clip end in which a pause counts as the clip
/// finishing rather than the user interrupting.
pub const DEFAULT_END_PAUSE_TOLERANCE_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    /// Measured in media time, independent of the playback rate.
    pub end_pause_tolerance_ms: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            end_pause_tolerance_ms: DEFAULT_END_PAUSE_TOLERANCE_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// Recorder bookkeeping
// ---------------------------------------------------------------------------

/// What the machine believes the single recorder instance is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecorderStatus {
    Off,
    Starting,
    Live,
    Stopping,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Read-only view of the session for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub clip_id: DbId,
    pub current_sec: f64,
    pub is_playing: bool,
    pub rate: PlaybackRate,
    pub mode: Mode,
    pub phase: RecordingPhase,
    /// Loop and record controls should stay hidden until this is true.
    pub unlocked: bool,
    pub loop_range: LoopRange,
    pub loop_active: bool,
    pub active_line: Option<ActiveLine>,
    pub has_review_audio: bool,
    pub is_saving: bool,
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

pub struct SessionState {
    clip: Arc<Clip>,
    config: MachineConfig,
    current_sec: f64,
    playing: bool,
    rate: PlaybackRate,
    mode: Mode,
    phase: RecordingPhase,
    unlocked: bool,
    loop_range: LoopRange,
    recorder: RecorderStatus,
    review_blob: Option<AudioBlob>,
    saving: bool,
    active_line: Option<ActiveLine>,
    generation: u64,
    /// Set when a take starts; cleared by the first `Playing` after it.
    /// Stop reports seen before then belong to earlier playback.
    awaiting_take_playback: bool,
}

impl SessionState {
    /// A fresh session always starts in practice mode, idle, at the clip start.
    pub fn new(clip: Arc<Clip>, config: MachineConfig) -> Self {
        let current_sec = clip.start_sec;
        Self {
            clip,
            config,
            current_sec,
            playing: false,
            rate: PlaybackRate::default(),
            mode: Mode::Practice,
            phase: RecordingPhase::Idle,
            unlocked: false,
            loop_range: LoopRange::default(),
            recorder: RecorderStatus::Off,
            review_blob: None,
            saving: false,
            active_line: None,
            generation: 0,
            awaiting_take_playback: false,
        }
    }

    // -- accessors -----------------------------------------------------------

    pub fn clip(&self) -> &Arc<Clip> {
        &self.clip
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn phase(&self) -> RecordingPhase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn current_sec(&self) -> f64 {
        self.current_sec
    }

    pub fn rate(&self) -> PlaybackRate {
        self.rate
    }

    pub fn unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn loop_range(&self) -> LoopRange {
        self.loop_range
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn review_audio(&self) -> Option<&AudioBlob> {
        self.review_blob.as_ref()
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn active_line(&self) -> Option<ActiveLine> {
        self.active_line
    }

    /// True while the microphone is (or is about to be) capturing.
    pub fn is_capturing(&self) -> bool {
        self.mode == Mode::Recording && self.phase == RecordingPhase::Recording
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            clip_id: self.clip.id,
            current_sec: self.current_sec,
            is_playing: self.playing,
            rate: self.rate,
            mode: self.mode,
            phase: self.phase,
            unlocked: self.unlocked,
            loop_range: self.loop_range,
            loop_active: self
                .loop_range
                .is_active(self.clip.start_sec, self.clip.end_sec),
            active_line: self.active_line,
            has_review_audio: self.review_blob.is_some(),
            is_saving: self.saving,
        }
    }

    // -- player input --------------------------------------------------------

    /// Apply a player event. `now_sec` is the player time sampled on receipt.
    pub fn on_player_event(&mut self, event: PlayerEvent, now_sec: f64) -> Vec<Effect> {
        self.current_sec = now_sec;
        match event {
            PlayerEvent::Ready => vec![Effect::SetRate(self.rate.value())],
            PlayerEvent::StateChange(state) => self.on_player_state(state),
        }
    }

    fn on_player_state(&mut self, state: PlayerState) -> Vec<Effect> {
        let mut effects = Vec::new();
        match state {
            PlayerState::Playing => {
                self.playing = true;
                self.awaiting_take_playback = false;
                if !self.unlocked {
                    self.unlocked = true;
                    effects.push(Effect::Notify(SessionNotice::Unlocked));
                }
            }
            PlayerState::Paused => {
                self.playing = false;
                if self.is_capturing() && !self.awaiting_take_playback {
                    if self.near_clip_end() {
                        effects.extend(self.finish_capture());
                    } else {
                        effects.extend(self.abandon_capture(DiscardReason::PlaybackInterrupted));
                    }
                }
            }
            PlayerState::Ended => {
                if self.is_capturing() {
                    self.playing = false;
                    if !self.awaiting_take_playback {
                        effects.extend(self.finish_capture());
                    }
                } else if self.mode == Mode::Practice
                    && self
                        .loop_range
                        .is_active(self.clip.start_sec, self.clip.end_sec)
                {
                    let (start, end) = self
                        .loop_range
                        .effective_bounds(self.clip.start_sec, self.clip.end_sec);
                    // A tick may already have restarted the loop.
                    if self.current_sec >= end - self.tolerance_sec() {
                        effects.extend(self.restart_loop(self.current_sec, start));
                    }
                    self.playing = true;
                } else {
                    self.playing = false;
                }
            }
            PlayerState::Unstarted | PlayerState::CueMarked => {
                self.playing = false;
            }
            // Buffering is transient; keep the last known play state.
            PlayerState::Buffering => {}
        }
        effects
    }

    fn tolerance_sec(&self) -> f64 {
        self.config.end_pause_tolerance_ms as f64 / 1000.0
    }

    fn near_clip_end(&self) -> bool {
        self.current_sec >= self.clip.end_sec - self.tolerance_sec()
    }

    /// Apply a polling tick carrying the sampled player time.
    ///
    /// Updates the active transcript line, then runs the practice loop check
    /// or the recording auto-finish check depending on the mode.
    pub fn on_tick(&mut self, now_sec: f64) -> Vec<Effect> {
        self.current_sec = now_sec;
        let mut effects = self.refresh_active_line();
        if !self.playing {
            return effects;
        }

        match self.mode {
            Mode::Practice => {
                if let Some(to_sec) =
                    self.loop_range
                        .seek_target(now_sec, self.clip.start_sec, self.clip.end_sec)
                {
                    effects.extend(self.restart_loop(now_sec, to_sec));
                }
            }
            Mode::Recording => {
                // Some backends never emit `ended`/`paused` at the clip end.
                if self.phase == RecordingPhase::Recording
                    && self.recorder == RecorderStatus::Live
                    && now_sec >= self.clip.end_sec
                {
                    effects.extend(self.finish_capture());
                }
            }
        }
        effects
    }

    /// Jump back to the loop start. `Play` is included because a player
    /// bounded at the clip end may already have stopped there.
    fn restart_loop(&mut self, from_sec: f64, to_sec: f64) -> Vec<Effect> {
        self.current_sec = to_sec;
        vec![
            Effect::Seek(to_sec),
            Effect::Play,
            Effect::Notify(SessionNotice::LoopRestarted { from_sec, to_sec }),
        ]
    }

    fn refresh_active_line(&mut self) -> Vec<Effect> {
        let line = TranscriptIndex::for_clip(&self.clip).line_at(seconds_to_ms(self.current_sec));
        if line == self.active_line {
            return Vec::new();
        }
        self.active_line = line;
        vec![Effect::Notify(SessionNotice::ActiveLineChanged { line })]
    }

    // -- playback controls ---------------------------------------------------

    /// Seek to the clip start and play.
    pub fn restart(&mut self) -> Result<Vec<Effect>, CoreError> {
        if self.is_capturing() {
            return Err(CoreError::Conflict(
                "Cannot restart while recording".to_string(),
            ));
        }
        self.current_sec = self.clip.start_sec;
        Ok(vec![Effect::Seek(self.clip.start_sec), Effect::Play])
    }

    pub fn cycle_rate(&mut self) -> Vec<Effect> {
        self.rate = self.rate.next();
        self.rate_effects()
    }

    pub fn set_rate(&mut self, value: f64) -> Result<Vec<Effect>, CoreError> {
        self.rate = PlaybackRate::from_value(value)?;
        Ok(self.rate_effects())
    }

    fn rate_effects(&self) -> Vec<Effect> {
        let rate = self.rate.value();
        vec![
            Effect::SetRate(rate),
            Effect::Notify(SessionNotice::RateChanged { rate }),
        ]
    }

    /// Mark or clear a loop marker at the player's current position.
    pub fn toggle_loop_marker(&mut self, marker: LoopMarker, now_sec: f64) -> Vec<Effect> {
        self.current_sec = now_sec;
        self.loop_range.toggle(marker, now_sec);
        vec![Effect::Notify(SessionNotice::LoopChanged {
            range: self.loop_range,
        })]
    }

    pub fn clear_loop(&mut self) -> Vec<Effect> {
        self.loop_range.clear();
        vec![Effect::Notify(SessionNotice::LoopChanged {
            range: self.loop_range,
        })]
    }

    // -- mode ----------------------------------------------------------------

    /// Switch between practice and recording.
    ///
    /// Refused while capturing or saving. Any audio awaiting review is
    /// dropped. Loop markers, rate and the unlock flag carry over.
    pub fn switch_mode(&mut self, target: Mode) -> Result<Vec<Effect>, CoreError> {
        if self.phase == RecordingPhase::Recording {
            return Err(CoreError::Conflict(
                "Cannot switch mode while recording".to_string(),
            ));
        }
        if self.saving {
            return Err(CoreError::Conflict(
                "Cannot switch mode while a recording is being saved".to_string(),
            ));
        }
        if target == self.mode {
            return Ok(Vec::new());
        }

        let had_review = self.phase == RecordingPhase::Reviewing;
        self.mode = target;
        self.phase = RecordingPhase::Idle;
        self.review_blob = None;
        self.generation += 1;

        let mut effects = vec![
            Effect::Pause,
            Effect::SeekAfterPause {
                to_sec: self.clip.start_sec,
                generation: self.generation,
            },
            Effect::Notify(SessionNotice::ModeChanged { mode: target }),
        ];
        if had_review {
            effects.push(Effect::Notify(SessionNotice::PhaseChanged {
                phase: RecordingPhase::Idle,
            }));
            effects.push(Effect::Notify(SessionNotice::RecordingDiscarded {
                reason: DiscardReason::ModeSwitched,
            }));
        }
        Ok(effects)
    }

    pub fn toggle_mode(&mut self) -> Result<Vec<Effect>, CoreError> {
        self.switch_mode(self.mode.other())
    }

    /// Resolve a deferred seek. Returns the seek to issue, if still current.
    pub fn settle_seek(&mut self, generation: u64, to_sec: f64) -> Option<Effect> {
        if generation != self.generation {
            return None;
        }
        self.current_sec = to_sec;
        Some(Effect::Seek(to_sec))
    }

    // -- recording -----------------------------------------------------------

    /// Idle → Recording: rewind, play, and ask for the microphone.
    pub fn begin_recording(&mut self) -> Result<Vec<Effect>, CoreError> {
        if self.mode != Mode::Recording {
            return Err(CoreError::Conflict(
                "Switch to recording mode before recording".to_string(),
            ));
        }
        if self.phase != RecordingPhase::Idle {
            return Err(CoreError::Conflict(
                "A recording is already in progress or awaiting review".to_string(),
            ));
        }
        if self.recorder != RecorderStatus::Off {
            return Err(CoreError::Conflict(
                "The microphone is still being released".to_string(),
            ));
        }

        self.generation += 1;
        self.phase = RecordingPhase::Recording;
        self.recorder = RecorderStatus::Starting;
        self.current_sec = self.clip.start_sec;
        self.awaiting_take_playback = true;

        Ok(vec![
            Effect::Seek(self.clip.start_sec),
            Effect::Play,
            Effect::StartRecorder {
                generation: self.generation,
            },
            Effect::Notify(SessionNotice::PhaseChanged {
                phase: RecordingPhase::Recording,
            }),
        ])
    }

    /// The recorder acquired the microphone.
    ///
    /// If the attempt was abandoned while the permission prompt was open,
    /// the capture is stopped and thrown away.
    pub fn recorder_started(&mut self, generation: u64) -> Vec<Effect> {
        if self.recorder != RecorderStatus::Starting {
            return Vec::new();
        }
        if generation == self.generation && self.is_capturing() {
            self.recorder = RecorderStatus::Live;
            Vec::new()
        } else {
            self.recorder = RecorderStatus::Stopping;
            vec![Effect::StopRecorder {
                generation,
                keep: false,
            }]
        }
    }

    /// The recorder could not start. Rolls back to idle if still current.
    pub fn recorder_start_failed(&mut self, generation: u64, error: &RecorderError) -> Vec<Effect> {
        if self.recorder == RecorderStatus::Starting {
            self.recorder = RecorderStatus::Off;
        }
        if generation != self.generation || !self.is_capturing() {
            return Vec::new();
        }
        self.phase = RecordingPhase::Idle;
        vec![
            Effect::Pause,
            Effect::Notify(SessionNotice::PhaseChanged {
                phase: RecordingPhase::Idle,
            }),
            Effect::Notify(SessionNotice::error(error.to_string())),
        ]
    }

    /// User pressed "finish": take the save path.
    pub fn finish_recording(&mut self) -> Result<Vec<Effect>, CoreError> {
        if !self.is_capturing() {
            return Err(CoreError::Conflict("Not currently recording".to_string()));
        }
        Ok(self.finish_capture())
    }

    /// User pressed "give up": take the discard path.
    pub fn abandon_recording(&mut self) -> Result<Vec<Effect>, CoreError> {
        if !self.is_capturing() {
            return Err(CoreError::Conflict("Not currently recording".to_string()));
        }
        Ok(self.abandon_capture(DiscardReason::UserAbandoned))
    }

    /// Recording → Reviewing.
    fn finish_capture(&mut self) -> Vec<Effect> {
        if self.recorder != RecorderStatus::Live {
            // The permission prompt is still open; nothing has been captured.
            self.phase = RecordingPhase::Idle;
            return vec![
                Effect::Pause,
                Effect::Notify(SessionNotice::PhaseChanged {
                    phase: RecordingPhase::Idle,
                }),
                Effect::Notify(SessionNotice::error(
                    "The microphone was not ready, nothing was recorded",
                )),
            ];
        }
        self.recorder = RecorderStatus::Stopping;
        self.phase = RecordingPhase::Reviewing;
        vec![
            Effect::Pause,
            Effect::StopRecorder {
                generation: self.generation,
                keep: true,
            },
            Effect::Notify(SessionNotice::PhaseChanged {
                phase: RecordingPhase::Reviewing,
            }),
        ]
    }

    /// Recording → Idle, dropping the audio.
    fn abandon_capture(&mut self, reason: DiscardReason) -> Vec<Effect> {
        self.phase = RecordingPhase::Idle;
        let mut effects = vec![Effect::Pause];
        if self.recorder == RecorderStatus::Live {
            self.recorder = RecorderStatus::Stopping;
            effects.push(Effect::StopRecorder {
                generation: self.generation,
                keep: false,
            });
        }
        effects.push(Effect::Notify(SessionNotice::PhaseChanged {
            phase: RecordingPhase::Idle,
        }));
        effects.push(Effect::Notify(SessionNotice::RecordingDiscarded { reason }));
        effects
    }

    /// The recorder handed back its audio (or nothing).
    pub fn recorder_stopped(
        &mut self,
        generation: u64,
        audio: Option<AudioBlob>,
        keep: bool,
    ) -> Vec<Effect> {
        if self.recorder == RecorderStatus::Stopping {
            self.recorder = RecorderStatus::Off;
        }
        if !keep
            || generation != self.generation
            || self.phase != RecordingPhase::Reviewing
            || self.review_blob.is_some()
        {
            return Vec::new();
        }

        match audio {
            Some(blob) if !blob.is_empty() => {
                let duration_ms = blob.duration_ms;
                self.review_blob = Some(blob);
                vec![Effect::Notify(SessionNotice::ReviewReady { duration_ms })]
            }
            _ => {
                self.phase = RecordingPhase::Idle;
                vec![
                    Effect::Notify(SessionNotice::PhaseChanged {
                        phase: RecordingPhase::Idle,
                    }),
                    Effect::Notify(SessionNotice::error("No audio was captured")),
                ]
            }
        }
    }

    /// Reviewing → Idle without persisting.
    pub fn discard_review(&mut self) -> Result<Vec<Effect>, CoreError> {
        if self.phase != RecordingPhase::Reviewing {
            return Err(CoreError::Conflict("No recording to discard".to_string()));
        }
        if self.saving {
            return Err(CoreError::Conflict(
                "The recording is being saved".to_string(),
            ));
        }
        self.review_blob = None;
        self.phase = RecordingPhase::Idle;
        Ok(vec![
            Effect::Notify(SessionNotice::PhaseChanged {
                phase: RecordingPhase::Idle,
            }),
            Effect::Notify(SessionNotice::RecordingDiscarded {
                reason: DiscardReason::ReviewDiscarded,
            }),
        ])
    }

    /// Claim the reviewed audio for upload.
    ///
    /// Returns the generation to hand back to [`save_succeeded`] or
    /// [`save_failed`]. The audio stays in review until the upload succeeds.
    ///
    /// [`save_succeeded`]: SessionState::save_succeeded
    /// [`save_failed`]: SessionState::save_failed
    pub fn begin_save(&mut self) -> Result<(u64, AudioBlob), CoreError> {
        if self.phase != RecordingPhase::Reviewing {
            return Err(CoreError::Conflict("No recording to save".to_string()));
        }
        if self.saving {
            return Err(CoreError::Conflict(
                "The recording is already being saved".to_string(),
            ));
        }
        let blob = self.review_blob.clone().ok_or_else(|| {
            CoreError::Conflict("The recording is still being finalized".to_string())
        })?;
        self.saving = true;
        Ok((self.generation, blob))
    }

    /// Upload finished: Reviewing → Idle.
    pub fn save_succeeded(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.generation {
            return Vec::new();
        }
        self.saving = false;
        self.review_blob = None;
        self.phase = RecordingPhase::Idle;
        vec![Effect::Notify(SessionNotice::PhaseChanged {
            phase: RecordingPhase::Idle,
        })]
    }

    /// Upload failed: stay in review so the user can retry or discard.
    pub fn save_failed(&mut self, generation: u64, message: impl Into<String>) -> Vec<Effect> {
        if generation != self.generation {
            return Vec::new();
        }
        self.saving = false;
        vec![Effect::Notify(SessionNotice::error(message))]
    }

    // -- lifecycle -----------------------------------------------------------

    /// Swap in a new clip, resetting everything but rate and unlock.
    pub fn replace_clip(&mut self, clip: Arc<Clip>) -> Result<Vec<Effect>, CoreError> {
        if self.is_capturing() || self.saving {
            return Err(CoreError::Conflict(
                "Cannot change clip while recording or saving".to_string(),
            ));
        }
        let previous_mode = self.mode;
        self.generation += 1;
        self.current_sec = clip.start_sec;
        self.clip = clip;
        self.mode = Mode::Practice;
        self.phase = RecordingPhase::Idle;
        self.review_blob = None;
        self.loop_range.clear();
        self.active_line = None;

        let mut effects = vec![Effect::Notify(SessionNotice::LoopChanged {
            range: self.loop_range,
        })];
        if previous_mode != Mode::Practice {
            effects.push(Effect::Notify(SessionNotice::ModeChanged {
                mode: Mode::Practice,
            }));
        }
        Ok(effects)
    }

    /// Tear the session down. Any capture in progress is discarded.
    pub fn close(&mut self) -> Vec<Effect> {
        let mut effects = vec![Effect::Pause];
        let had_audio = self.phase != RecordingPhase::Idle;
        if self.recorder == RecorderStatus::Live {
            self.recorder = RecorderStatus::Stopping;
            effects.push(Effect::StopRecorder {
                generation: self.generation,
                keep: false,
            });
        }
        self.generation += 1;
        self.phase = RecordingPhase::Idle;
        self.review_blob = None;
        self.saving = false;
        if had_audio {
            effects.push(Effect::Notify(SessionNotice::RecordingDiscarded {
                reason: DiscardReason::SessionClosed,
            }));
        }
        effects
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::TranscriptSegment;
    use crate::recording::DEFAULT_AUDIO_MIME;
    use assert_matches::assert_matches;

    fn clip(start_sec: f64, end_sec: f64) -> Arc<Clip> {
        Arc::new(Clip {
            id: 9,
            video_id: "abc123".to_string(),
            start_sec,
            end_sec,
            transcript: vec![
                TranscriptSegment::new("one", 0, 1_000),
                TranscriptSegment::new("two", 1_000, 1_500),
                TranscriptSegment::new("three", 2_500, 1_500),
                TranscriptSegment::new("four", 4_000, 2_000),
                TranscriptSegment::new("five", 6_000, 2_000),
            ],
            translation: None,
            speech_rate_wpm: None,
        })
    }

    fn blob() -> AudioBlob {
        AudioBlob::new(vec![0u8; 64], DEFAULT_AUDIO_MIME, 30_000)
    }

    fn notices(effects: &[Effect]) -> Vec<&SessionNotice> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn playing(state: &mut SessionState, at: f64) {
        state.on_player_event(PlayerEvent::StateChange(PlayerState::Playing), at);
    }

    /// Recording mode, mic live, player playing from the clip start.
    fn capturing(start: f64, end: f64) -> SessionState {
        let mut state = SessionState::new(clip(start, end), MachineConfig::default());
        state.switch_mode(Mode::Recording).unwrap();
        state.begin_recording().unwrap();
        let generation = state.generation();
        assert!(state.recorder_started(generation).is_empty());
        playing(&mut state, start);
        state
    }

    // -- player events -------------------------------------------------------

    #[test]
    fn first_playing_event_unlocks_permanently() {
        let mut state = SessionState::new(clip(0.0, 8.0), MachineConfig::default());
        assert!(!state.unlocked());

        let effects = state.on_player_event(PlayerEvent::StateChange(PlayerState::Playing), 0.0);
        assert_eq!(effects, vec![Effect::Notify(SessionNotice::Unlocked)]);
        assert!(state.unlocked());

        state.on_player_event(PlayerEvent::StateChange(PlayerState::Paused), 1.0);
        let effects = state.on_player_event(PlayerEvent::StateChange(PlayerState::Playing), 1.0);
        assert!(effects.is_empty());
        assert!(state.unlocked());
    }

    #[test]
    fn ready_reapplies_rate() {
        let mut state = SessionState::new(clip(0.0, 8.0), MachineConfig::default());
        state.set_rate(0.75).unwrap();
        assert_eq!(
            state.on_player_event(PlayerEvent::Ready, 0.0),
            vec![Effect::SetRate(0.75)]
        );
    }

    #[test]
    fn buffering_keeps_play_state() {
        let mut state = SessionState::new(clip(0.0, 8.0), MachineConfig::default());
        playing(&mut state, 0.0);
        state.on_player_event(PlayerEvent::StateChange(PlayerState::Buffering), 0.5);
        assert!(state.is_playing());
    }

    // -- ticks ---------------------------------------------------------------

    #[test]
    fn tick_tracks_active_line() {
        let mut state = SessionState::new(clip(0.0, 8.0), MachineConfig::default());
        let effects = state.on_tick(4.2);
        assert_eq!(
            effects,
            vec![Effect::Notify(SessionNotice::ActiveLineChanged {
                line: Some(ActiveLine {
                    index: 3,
                    translation_index: None
                })
            })]
        );
        assert!(state.on_tick(4.3).is_empty());
    }

    #[test]
    fn loop_seeks_back_to_marker_when_end_defaults_to_clip_end() {
        let mut state = SessionState::new(clip(0.0, 60.0), MachineConfig::default());
        playing(&mut state, 10.0);
        state.toggle_loop_marker(LoopMarker::A, 10.0);

        let effects = state.on_tick(61.0);
        assert!(effects.contains(&Effect::Seek(10.0)));
        assert_eq!(state.current_sec(), 10.0);
        assert!(!effects.contains(&Effect::Pause));
    }

    #[test]
    fn ended_with_active_loop_restarts_it() {
        let mut state = SessionState::new(clip(0.0, 60.0), MachineConfig::default());
        playing(&mut state, 10.0);
        state.toggle_loop_marker(LoopMarker::A, 10.0);

        let effects =
            state.on_player_event(PlayerEvent::StateChange(PlayerState::Ended), 60.0);
        assert_eq!(&effects[..2], &[Effect::Seek(10.0), Effect::Play]);
        assert_matches!(
            effects[2],
            Effect::Notify(SessionNotice::LoopRestarted { to_sec, .. }) if to_sec == 10.0
        );
        assert!(state.is_playing());
    }

    #[test]
    fn ended_after_tick_restart_is_ignored() {
        let mut state = SessionState::new(clip(0.0, 60.0), MachineConfig::default());
        playing(&mut state, 10.0);
        state.toggle_loop_marker(LoopMarker::A, 10.0);
        state.on_tick(60.0);

        let effects =
            state.on_player_event(PlayerEvent::StateChange(PlayerState::Ended), 10.05);
        assert!(effects.is_empty());
        assert!(state.is_playing());
    }

    #[test]
    fn ended_without_loop_just_stops() {
        let mut state = SessionState::new(clip(0.0, 60.0), MachineConfig::default());
        playing(&mut state, 10.0);
        let effects =
            state.on_player_event(PlayerEvent::StateChange(PlayerState::Ended), 60.0);
        assert!(effects.is_empty());
        assert!(!state.is_playing());
    }

    #[test]
    fn loop_does_not_fire_while_paused() {
        let mut state = SessionState::new(clip(0.0, 60.0), MachineConfig::default());
        state.toggle_loop_marker(LoopMarker::A, 10.0);
        assert!(!state.on_tick(61.0).contains(&Effect::Seek(10.0)));
    }

    #[test]
    fn loop_is_ignored_in_recording_mode() {
        let mut state = SessionState::new(clip(0.0, 60.0), MachineConfig::default());
        state.toggle_loop_marker(LoopMarker::B, 20.0);
        state.switch_mode(Mode::Recording).unwrap();
        playing(&mut state, 0.0);
        assert!(!state.on_tick(25.0).contains(&Effect::Seek(0.0)));
    }

    #[test]
    fn tick_at_clip_end_finishes_recording_without_events() {
        let mut state = capturing(5.0, 35.0);
        let effects = state.on_tick(35.1);
        assert_eq!(state.phase(), RecordingPhase::Reviewing);
        assert!(effects.contains(&Effect::Pause));
        assert_matches!(
            effects.as_slice(),
            [Effect::Pause, Effect::StopRecorder { keep: true, .. }, ..]
                | [Effect::Notify(_), Effect::Pause, Effect::StopRecorder { keep: true, .. }, ..]
        );
    }

    #[test]
    fn tick_before_mic_is_live_does_not_finish() {
        let mut state = SessionState::new(clip(5.0, 35.0), MachineConfig::default());
        state.switch_mode(Mode::Recording).unwrap();
        state.begin_recording().unwrap();
        playing(&mut state, 40.0);
        state.on_tick(40.0);
        assert_eq!(state.phase(), RecordingPhase::Recording);
    }

    // -- mode ----------------------------------------------------------------

    #[test]
    fn switching_mode_twice_restores_original() {
        let mut state = SessionState::new(clip(0.0, 60.0), MachineConfig::default());
        state.toggle_loop_marker(LoopMarker::A, 12.0);
        state.cycle_rate();
        let loop_before = state.loop_range();
        let rate_before = state.rate();

        state.toggle_mode().unwrap();
        assert_eq!(state.mode(), Mode::Recording);
        state.toggle_mode().unwrap();

        assert_eq!(state.mode(), Mode::Practice);
        assert_eq!(state.phase(), RecordingPhase::Idle);
        assert_eq!(state.loop_range(), loop_before);
        assert_eq!(state.rate(), rate_before);
    }

    #[test]
    fn switching_mode_pauses_then_defers_seek() {
        let mut state = SessionState::new(clip(3.0, 60.0), MachineConfig::default());
        let effects = state.switch_mode(Mode::Recording).unwrap();
        let generation = state.generation();
        assert_eq!(effects[0], Effect::Pause);
        assert_eq!(
            effects[1],
            Effect::SeekAfterPause {
                to_sec: 3.0,
                generation
            }
        );
        assert_eq!(state.settle_seek(generation, 3.0), Some(Effect::Seek(3.0)));
    }

    #[test]
    fn stale_deferred_seek_is_dropped() {
        let mut state = SessionState::new(clip(3.0, 60.0), MachineConfig::default());
        state.switch_mode(Mode::Recording).unwrap();
        let stale = state.generation();
        state.switch_mode(Mode::Practice).unwrap();
        assert_eq!(state.settle_seek(stale, 3.0), None);
    }

    #[test]
    fn switching_mode_keeps_unlock() {
        let mut state = SessionState::new(clip(0.0, 60.0), MachineConfig::default());
        playing(&mut state, 0.0);
        state.toggle_mode().unwrap();
        assert!(state.unlocked());
    }

    #[test]
    fn cannot_switch_mode_mid_recording() {
        let mut state = capturing(0.0, 30.0);
        assert_matches!(state.toggle_mode(), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn switching_mode_from_review_drops_audio() {
        let mut state = capturing(0.0, 30.0);
        state.finish_recording().unwrap();
        let generation = state.generation();
        state.recorder_stopped(generation, Some(blob()), true);
        assert!(state.review_audio().is_some());

        let effects = state.toggle_mode().unwrap();
        assert!(state.review_audio().is_none());
        assert_eq!(state.phase(), RecordingPhase::Idle);
        assert!(notices(&effects).contains(&&SessionNotice::RecordingDiscarded {
            reason: DiscardReason::ModeSwitched
        }));
    }

    // -- recording lifecycle -------------------------------------------------

    #[test]
    fn begin_recording_requires_recording_mode() {
        let mut state = SessionState::new(clip(0.0, 30.0), MachineConfig::default());
        assert_matches!(state.begin_recording(), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn begin_recording_rewinds_plays_and_starts_mic() {
        let mut state = SessionState::new(clip(5.0, 35.0), MachineConfig::default());
        state.switch_mode(Mode::Recording).unwrap();
        let effects = state.begin_recording().unwrap();
        let generation = state.generation();
        assert_eq!(
            &effects[..3],
            &[
                Effect::Seek(5.0),
                Effect::Play,
                Effect::StartRecorder { generation }
            ]
        );
        assert_eq!(state.phase(), RecordingPhase::Recording);
    }

    #[test]
    fn ended_event_moves_to_review() {
        let mut state = capturing(0.0, 30.0);
        state.on_player_event(PlayerEvent::StateChange(PlayerState::Ended), 30.0);
        assert_eq!(state.phase(), RecordingPhase::Reviewing);
    }

    #[test]
    fn pause_near_end_counts_as_completion() {
        let mut state = capturing(0.0, 30.0);
        let effects = state.on_player_event(PlayerEvent::StateChange(PlayerState::Paused), 29.85);
        assert_eq!(state.phase(), RecordingPhase::Reviewing);
        assert!(effects.iter().any(|e| matches!(e, Effect::StopRecorder { keep: true, .. })));
    }

    #[test]
    fn tolerance_ignores_playback_rate() {
        let mut state = SessionState::new(clip(0.0, 30.0), MachineConfig::default());
        state.set_rate(0.5).unwrap();
        state.switch_mode(Mode::Recording).unwrap();
        state.begin_recording().unwrap();
        let generation = state.generation();
        state.recorder_started(generation);
        playing(&mut state, 0.0);

        state.on_player_event(PlayerEvent::StateChange(PlayerState::Paused), 29.85);
        assert_eq!(state.phase(), RecordingPhase::Reviewing);
    }

    #[test]
    fn pause_mid_clip_discards() {
        let mut state = capturing(0.0, 30.0);
        let effects = state.on_player_event(PlayerEvent::StateChange(PlayerState::Paused), 12.0);
        assert_eq!(state.phase(), RecordingPhase::Idle);
        assert!(effects.iter().any(|e| matches!(e, Effect::StopRecorder { keep: false, .. })));
        assert!(notices(&effects).contains(&&SessionNotice::RecordingDiscarded {
            reason: DiscardReason::PlaybackInterrupted
        }));
    }

    #[test]
    fn pause_from_mode_switch_does_not_discard_new_take() {
        let mut state = SessionState::new(clip(0.0, 30.0), MachineConfig::default());
        playing(&mut state, 4.0);
        state.switch_mode(Mode::Recording).unwrap();
        state.begin_recording().unwrap();
        let generation = state.generation();
        state.recorder_started(generation);

        // The pause issued by the switch is reported after the take began.
        let effects = state.on_player_event(PlayerEvent::StateChange(PlayerState::Paused), 4.0);
        assert!(effects.is_empty());
        assert_eq!(state.phase(), RecordingPhase::Recording);

        playing(&mut state, 0.0);
        let effects = state.on_player_event(PlayerEvent::StateChange(PlayerState::Paused), 12.0);
        assert_eq!(state.phase(), RecordingPhase::Idle);
        assert!(notices(&effects).contains(&&SessionNotice::RecordingDiscarded {
            reason: DiscardReason::PlaybackInterrupted
        }));
    }

    #[test]
    fn ended_from_earlier_playback_does_not_finish_new_take() {
        let mut state = SessionState::new(clip(0.0, 30.0), MachineConfig::default());
        state.switch_mode(Mode::Recording).unwrap();
        state.begin_recording().unwrap();
        let generation = state.generation();
        state.recorder_started(generation);

        let effects = state.on_player_event(PlayerEvent::StateChange(PlayerState::Ended), 30.0);
        assert!(effects.is_empty());
        assert_eq!(state.phase(), RecordingPhase::Recording);
    }

    #[test]
    fn tolerance_is_configurable() {
        let mut state = SessionState::new(
            clip(0.0, 30.0),
            MachineConfig {
                end_pause_tolerance_ms: 1_000,
            },
        );
        state.switch_mode(Mode::Recording).unwrap();
        state.begin_recording().unwrap();
        let generation = state.generation();
        state.recorder_started(generation);
        playing(&mut state, 0.0);
        state.on_player_event(PlayerEvent::StateChange(PlayerState::Paused), 29.2);
        assert_eq!(state.phase(), RecordingPhase::Reviewing);
    }

    #[test]
    fn mic_failure_rolls_back_and_pauses() {
        let mut state = SessionState::new(clip(0.0, 30.0), MachineConfig::default());
        state.switch_mode(Mode::Recording).unwrap();
        state.begin_recording().unwrap();
        let generation = state.generation();

        let effects = state.recorder_start_failed(generation, &RecorderError::PermissionDenied);
        assert_eq!(state.phase(), RecordingPhase::Idle);
        assert_eq!(effects[0], Effect::Pause);
        assert!(notices(&effects).contains(&&SessionNotice::error("Microphone access was denied")));

        // The recorder is free again.
        assert!(state.begin_recording().is_ok());
    }

    #[test]
    fn mic_granted_after_abandon_is_stopped_and_dropped() {
        let mut state = SessionState::new(clip(0.0, 30.0), MachineConfig::default());
        state.switch_mode(Mode::Recording).unwrap();
        state.begin_recording().unwrap();
        let generation = state.generation();
        state.abandon_recording().unwrap();

        let effects = state.recorder_started(generation);
        assert_eq!(
            effects,
            vec![Effect::StopRecorder {
                generation,
                keep: false
            }]
        );
        // Busy until the stop completes.
        assert_matches!(state.begin_recording(), Err(CoreError::Conflict(_)));
        state.recorder_stopped(generation, None, false);
        assert!(state.begin_recording().is_ok());
    }

    #[test]
    fn finish_before_mic_ready_returns_to_idle() {
        let mut state = SessionState::new(clip(0.0, 30.0), MachineConfig::default());
        state.switch_mode(Mode::Recording).unwrap();
        state.begin_recording().unwrap();
        let effects = state.finish_recording().unwrap();
        assert_eq!(state.phase(), RecordingPhase::Idle);
        assert!(notices(&effects)
            .iter()
            .any(|n| matches!(n, SessionNotice::Error { .. })));
    }

    #[test]
    fn review_then_save_returns_to_idle() {
        let mut state = capturing(0.0, 30.0);
        state.finish_recording().unwrap();
        let generation = state.generation();
        let effects = state.recorder_stopped(generation, Some(blob()), true);
        assert_eq!(
            effects,
            vec![Effect::Notify(SessionNotice::ReviewReady {
                duration_ms: 30_000
            })]
        );

        let (save_generation, audio) = state.begin_save().unwrap();
        assert_eq!(audio, blob());
        assert!(state.is_saving());
        assert_matches!(state.begin_save(), Err(CoreError::Conflict(_)));

        state.save_succeeded(save_generation);
        assert_eq!(state.phase(), RecordingPhase::Idle);
        assert!(state.review_audio().is_none());
        assert!(!state.is_saving());
    }

    #[test]
    fn failed_save_keeps_audio_for_retry() {
        let mut state = capturing(0.0, 30.0);
        state.finish_recording().unwrap();
        let generation = state.generation();
        state.recorder_stopped(generation, Some(blob()), true);

        let (save_generation, _) = state.begin_save().unwrap();
        let effects = state.save_failed(save_generation, "Network error: timeout");
        assert_eq!(state.phase(), RecordingPhase::Reviewing);
        assert!(state.review_audio().is_some());
        assert!(!state.is_saving());
        assert_eq!(
            effects,
            vec![Effect::Notify(SessionNotice::error("Network error: timeout"))]
        );
        assert!(state.begin_save().is_ok());
    }

    #[test]
    fn save_before_audio_arrives_is_refused() {
        let mut state = capturing(0.0, 30.0);
        state.finish_recording().unwrap();
        assert_matches!(state.begin_save(), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn empty_audio_returns_to_idle_with_error() {
        let mut state = capturing(0.0, 30.0);
        state.finish_recording().unwrap();
        let generation = state.generation();
        state.recorder_stopped(generation, None, true);
        assert_eq!(state.phase(), RecordingPhase::Idle);
    }

    #[test]
    fn discard_review_clears_audio() {
        let mut state = capturing(0.0, 30.0);
        state.finish_recording().unwrap();
        let generation = state.generation();
        state.recorder_stopped(generation, Some(blob()), true);
        state.discard_review().unwrap();
        assert_eq!(state.phase(), RecordingPhase::Idle);
        assert!(state.review_audio().is_none());
    }

    #[test]
    fn restart_is_refused_while_recording() {
        let mut state = capturing(0.0, 30.0);
        assert_matches!(state.restart(), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn restart_seeks_and_plays() {
        let mut state = SessionState::new(clip(4.0, 30.0), MachineConfig::default());
        assert_eq!(
            state.restart().unwrap(),
            vec![Effect::Seek(4.0), Effect::Play]
        );
    }

    // -- lifecycle -----------------------------------------------------------

    #[test]
    fn replace_clip_resets_but_keeps_rate() {
        let mut state = SessionState::new(clip(0.0, 30.0), MachineConfig::default());
        state.set_rate(0.5).unwrap();
        state.toggle_loop_marker(LoopMarker::A, 3.0);
        state.switch_mode(Mode::Recording).unwrap();
        let generation = state.generation();

        state.replace_clip(clip(10.0, 40.0)).unwrap();
        assert_eq!(state.mode(), Mode::Practice);
        assert_eq!(state.loop_range(), LoopRange::default());
        assert_eq!(state.rate().value(), 0.5);
        assert_eq!(state.current_sec(), 10.0);
        assert!(state.generation() > generation);
    }

    #[test]
    fn close_discards_live_capture() {
        let mut state = capturing(0.0, 30.0);
        let generation = state.generation();
        let effects = state.close();
        assert!(effects.contains(&Effect::StopRecorder {
            generation,
            keep: false
        }));
        assert_eq!(state.phase(), RecordingPhase::Idle);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut state = SessionState::new(clip(0.0, 30.0), MachineConfig::default());
        state.toggle_loop_marker(LoopMarker::A, 2.0);
        let snap = state.snapshot();
        assert_eq!(snap.clip_id, 9);
        assert!(snap.loop_active);
        assert_eq!(snap.mode, Mode::Practice);
        assert!(!snap.unlocked);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["rate"], 1.0);
    }
}
