use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shadow_core::player::{PlayerAdapter, PlayerEvent, PlayerState};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// A command received from the session, kept for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Load {
        video_id: String,
        start_sec: f64,
        end_sec: f64,
    },
    Play,
    Pause,
    Seek(f64),
    SetRate(f64),
    Destroy,
}

#[derive(Debug)]
struct Clock {
    /// Media position at `resumed_at`, or the frozen position while paused.
    position_sec: f64,
    resumed_at: Option<Instant>,
    rate: f64,
    end_sec: f64,
    destroyed: bool,
    log: Vec<PlayerCommand>,
}

impl Clock {
    fn now_sec(&self, time_scale: f64) -> f64 {
        match self.resumed_at {
            Some(at) => {
                self.position_sec + at.elapsed().as_secs_f64() * self.rate * time_scale
            }
            None => self.position_sec,
        }
    }

    /// Fold elapsed time into `position_sec` so rate or state can change.
    fn settle(&mut self, time_scale: f64) {
        self.position_sec = self.now_sec(time_scale);
        if self.resumed_at.is_some() {
            self.resumed_at = Some(Instant::now());
        }
    }
}

/// A player whose position advances with the tokio clock.
///
/// State changes are reported on the event channel returned by
/// [`new`](SimulatedPlayer::new). When `ends_at_clip_end` is set, the first
/// position sample at or past the loaded end bound stops the clock there and
/// emits `Ended`, the way an embed with an end parameter behaves.
#[derive(Debug)]
pub struct SimulatedPlayer {
    clock: Mutex<Clock>,
    events: mpsc::UnboundedSender<PlayerEvent>,
    ends_at_clip_end: bool,
    time_scale: f64,
}

impl SimulatedPlayer {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PlayerEvent>) {
        Self::build(true, 1.0)
    }

    /// A player that never reports the clip end on its own.
    pub fn without_end_events() -> (Arc<Self>, mpsc::UnboundedReceiver<PlayerEvent>) {
        Self::build(false, 1.0)
    }

    /// A player whose media clock runs `time_scale` times faster than the
    /// tokio clock. Used by the replay binary to skim through a clip.
    pub fn with_time_scale(time_scale: f64) -> (Arc<Self>, mpsc::UnboundedReceiver<PlayerEvent>) {
        Self::build(true, time_scale)
    }

    fn build(
        ends_at_clip_end: bool,
        time_scale: f64,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = Arc::new(Self {
            clock: Mutex::new(Clock {
                position_sec: 0.0,
                resumed_at: None,
                rate: 1.0,
                end_sec: f64::INFINITY,
                destroyed: false,
                log: Vec::new(),
            }),
            events: tx,
            ends_at_clip_end,
            time_scale,
        });
        (player, rx)
    }

    fn lock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PlayerEvent) {
        // A closed channel means the session is gone.
        let _ = self.events.send(event);
    }

    /// Report a state change that did not originate from a session command,
    /// e.g. a buffering stall.
    pub fn emit_state(&self, state: PlayerState) {
        self.emit(PlayerEvent::StateChange(state));
    }

    /// Pause from the player's own controls.
    pub fn user_pause(&self) {
        self.pause_clock(false);
    }

    pub fn is_playing(&self) -> bool {
        self.lock().resumed_at.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    pub fn rate(&self) -> f64 {
        self.lock().rate
    }

    /// Every command received so far.
    pub fn commands(&self) -> Vec<PlayerCommand> {
        self.lock().log.clone()
    }

    /// Drain the command log.
    pub fn take_commands(&self) -> Vec<PlayerCommand> {
        std::mem::take(&mut self.lock().log)
    }

    fn pause_clock(&self, logged: bool) {
        let mut clock = self.lock();
        if logged {
            clock.log.push(PlayerCommand::Pause);
        }
        if clock.resumed_at.is_none() {
            return;
        }
        clock.settle(self.time_scale);
        clock.resumed_at = None;
        drop(clock);
        self.emit_state(PlayerState::Paused);
    }
}

impl PlayerAdapter for SimulatedPlayer {
    fn load(&self, video_id: &str, start_sec: f64, end_sec: f64) {
        let mut clock = self.lock();
        clock.log.push(PlayerCommand::Load {
            video_id: video_id.to_string(),
            start_sec,
            end_sec,
        });
        clock.position_sec = start_sec;
        clock.resumed_at = None;
        clock.end_sec = end_sec;
        drop(clock);
        self.emit(PlayerEvent::Ready);
        self.emit_state(PlayerState::CueMarked);
    }

    fn play(&self) {
        let mut clock = self.lock();
        clock.log.push(PlayerCommand::Play);
        if clock.resumed_at.is_some() || clock.destroyed {
            return;
        }
        clock.resumed_at = Some(Instant::now());
        drop(clock);
        self.emit_state(PlayerState::Playing);
    }

    fn pause(&self) {
        self.pause_clock(true);
    }

    fn seek(&self, time_sec: f64) {
        let mut clock = self.lock();
        clock.log.push(PlayerCommand::Seek(time_sec));
        clock.position_sec = time_sec;
        if clock.resumed_at.is_none() || clock.destroyed {
            return;
        }
        clock.resumed_at = Some(Instant::now());
        drop(clock);
        // Embeds rebuffer and report playing again after a seek mid-play.
        self.emit_state(PlayerState::Buffering);
        self.emit_state(PlayerState::Playing);
    }

    fn current_time(&self) -> f64 {
        let mut clock = self.lock();
        let now = clock.now_sec(self.time_scale);
        if self.ends_at_clip_end && clock.resumed_at.is_some() && now >= clock.end_sec {
            clock.position_sec = clock.end_sec;
            clock.resumed_at = None;
            let end = clock.end_sec;
            drop(clock);
            self.emit_state(PlayerState::Ended);
            return end;
        }
        now
    }

    fn set_rate(&self, rate: f64) {
        let mut clock = self.lock();
        clock.log.push(PlayerCommand::SetRate(rate));
        clock.settle(self.time_scale);
        clock.rate = rate;
    }

    fn destroy(&self) {
        let mut clock = self.lock();
        clock.log.push(PlayerCommand::Destroy);
        clock.settle(self.time_scale);
        clock.resumed_at = None;
        clock.destroyed = true;
    }
}
