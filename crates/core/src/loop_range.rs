//! A/B loop markers for practice mode.
//!
//! Markers are "mark here" toggles: setting one captures the player's current
//! position, toggling it again clears it. An unset marker falls back to the
//! corresponding clip bound.

use serde::Serialize;

/// Which loop marker an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMarker {
    A,
    B,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoopRange {
    pub a: Option<f64>,
    pub b: Option<f64>,
    pub enabled: bool,
}

impl LoopRange {
    /// Set the marker to `current_sec` if unset, otherwise clear it.
    ///
    /// Setting either marker enables looping. Clearing a marker while the
    /// other one is also unset disables it.
    pub fn toggle(&mut self, marker: LoopMarker, current_sec: f64) {
        let slot = match marker {
            LoopMarker::A => &mut self.a,
            LoopMarker::B => &mut self.b,
        };
        if slot.is_some() {
            *slot = None;
            if self.a.is_none() && self.b.is_none() {
                self.enabled = false;
            }
        } else {
            *slot = Some(current_sec);
            self.enabled = true;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Effective `(start, end)` with unset markers defaulting to the clip bounds.
    pub fn effective_bounds(&self, clip_start: f64, clip_end: f64) -> (f64, f64) {
        (self.a.unwrap_or(clip_start), self.b.unwrap_or(clip_end))
    }

    /// Looping applies only when enabled and the effective range is ordered.
    pub fn is_active(&self, clip_start: f64, clip_end: f64) -> bool {
        let (start, end) = self.effective_bounds(clip_start, clip_end);
        self.enabled && start < end
    }

    /// Where to seek when `current_sec` has run past the loop end.
    pub fn seek_target(&self, current_sec: f64, clip_start: f64, clip_end: f64) -> Option<f64> {
        if !self.is_active(clip_start, clip_end) {
            return None;
        }
        let (start, end) = self.effective_bounds(clip_start, clip_end);
        (current_sec >= end).then_some(start)
    }
}
