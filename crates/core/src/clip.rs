//! Clip and transcript segment types, validation, and window clipping.
//!
//! A [`Clip`] is the immutable unit a practice session operates on: a
//! time-bounded slice of a source video plus its primary transcript and an
//! optional translated transcript.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Transcript segment
// ---------------------------------------------------------------------------

/// One timed line of a transcript.
///
/// Offsets are absolute within the source video, not relative to the clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    #[serde(rename = "offset")]
    pub offset_ms: u64,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, offset_ms: u64, duration_ms: u64) -> Self {
        Self {
            text: text.into(),
            offset_ms,
            duration_ms,
        }
    }

    /// Exclusive end of the segment in milliseconds.
    pub fn end_ms(&self) -> u64 {
        self.offset_ms.saturating_add(self.duration_ms)
    }
}

// ---------------------------------------------------------------------------
// Clip
// ---------------------------------------------------------------------------

/// An immutable, time-bounded reference to a source video and its transcripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: DbId,
    pub video_id: String,
    /// Inclusive start in seconds.
    pub start_sec: f64,
    /// Exclusive end in seconds.
    pub end_sec: f64,
    pub transcript: Vec<TranscriptSegment>,
    /// Translated transcript. Not necessarily aligned with `transcript`.
    #[serde(default)]
    pub translation: Option<Vec<TranscriptSegment>>,
    /// Words per minute, computed once at authoring time.
    #[serde(default)]
    pub speech_rate_wpm: Option<u32>,
}

impl Clip {
    pub fn duration_sec(&self) -> f64 {
        self.end_sec - self.start_sec
    }

    pub fn start_ms(&self) -> u64 {
        seconds_to_ms(self.start_sec)
    }

    pub fn end_ms(&self) -> u64 {
        seconds_to_ms(self.end_sec)
    }

    /// Check the clip invariants.
    ///
    /// - `video_id` is non-empty
    /// - both bounds are finite, `start_sec >= 0` and `end_sec > start_sec`
    /// - every segment has non-blank text and segments are ordered by offset
    /// - primary segment offsets fall inside `[start_ms, end_ms)`
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.video_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "Clip video_id must not be empty".to_string(),
            ));
        }
        if !self.start_sec.is_finite() || !self.end_sec.is_finite() {
            return Err(CoreError::Validation(
                "Clip bounds must be finite numbers".to_string(),
            ));
        }
        if self.start_sec < 0.0 {
            return Err(CoreError::Validation(format!(
                "Clip start_sec must be >= 0, got {}",
                self.start_sec
            )));
        }
        if self.end_sec <= self.start_sec {
            return Err(CoreError::Validation(format!(
                "Clip end_sec ({}) must be greater than start_sec ({})",
                self.end_sec, self.start_sec
            )));
        }

        validate_segments(&self.transcript, "transcript")?;
        let (start_ms, end_ms) = (self.start_ms(), self.end_ms());
        if let Some(seg) = self
            .transcript
            .iter()
            .find(|s| s.offset_ms < start_ms || s.offset_ms >= end_ms)
        {
            return Err(CoreError::Validation(format!(
                "Transcript segment at {}ms lies outside the clip window [{start_ms}, {end_ms})",
                seg.offset_ms
            )));
        }

        if let Some(translation) = &self.translation {
            validate_segments(translation, "translation")?;
        }
        Ok(())
    }
}

fn validate_segments(segments: &[TranscriptSegment], label: &str) -> Result<(), CoreError> {
    for (i, seg) in segments.iter().enumerate() {
        if seg.text.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "{label} segment {i} has empty text"
            )));
        }
    }
    if let Some(i) = segments
        .windows(2)
        .position(|pair| pair[1].offset_ms < pair[0].offset_ms)
    {
        return Err(CoreError::Validation(format!(
            "{label} segments must be ordered by offset (segment {} precedes segment {i})",
            i + 1
        )));
    }
    Ok(())
}

/// Convert seconds to whole milliseconds, clamping negatives to zero.
pub fn seconds_to_ms(sec: f64) -> u64 {
    if sec <= 0.0 {
        0
    } else {
        (sec * 1000.0).round() as u64
    }
}

// ---------------------------------------------------------------------------
// Window clipping
// ---------------------------------------------------------------------------

/// Restrict a raw source transcript to the clip window `[start_sec, end_sec)`.
///
/// Segments entirely outside the window or with blank text are dropped.
/// A segment that starts before the window but runs into it is moved to the
/// window start; durations are cut at the window end. Text is trimmed and
/// the input order is preserved.
pub fn clip_transcript(
    segments: &[TranscriptSegment],
    start_sec: f64,
    end_sec: f64,
) -> Vec<TranscriptSegment> {
    let start_ms = seconds_to_ms(start_sec);
    let end_ms = seconds_to_ms(end_sec);

    segments
        .iter()
        .filter_map(|seg| {
            let text = seg.text.trim();
            if text.is_empty() || seg.offset_ms >= end_ms || seg.end_ms() <= start_ms {
                return None;
            }
            let offset_ms = seg.offset_ms.max(start_ms);
            let seg_end = seg.end_ms().min(end_ms);
            Some(TranscriptSegment::new(text, offset_ms, seg_end - offset_ms))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sample_clip() -> Clip {
        Clip {
            id: 1,
            video_id: "dQw4w9WgXcQ".to_string(),
            start_sec: 5.0,
            end_sec: 35.0,
            transcript: vec![
                TranscriptSegment::new("We're no strangers", 5_000, 2_000),
                TranscriptSegment::new("to love", 7_500, 1_500),
            ],
            translation: None,
            speech_rate_wpm: None,
        }
    }

    // -- validate ------------------------------------------------------------

    #[test]
    fn valid_clip_passes() {
        assert!(sample_clip().validate().is_ok());
    }

    #[test]
    fn rejects_end_not_after_start() {
        let mut clip = sample_clip();
        clip.end_sec = clip.start_sec;
        assert_matches!(clip.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_empty_video_id() {
        let mut clip = sample_clip();
        clip.video_id = "  ".to_string();
        assert_matches!(clip.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_blank_segment_text() {
        let mut clip = sample_clip();
        clip.transcript[1].text = " ".to_string();
        assert_matches!(clip.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_segment_outside_window() {
        let mut clip = sample_clip();
        clip.transcript.push(TranscriptSegment::new("late", 35_000, 500));
        assert_matches!(clip.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_unordered_segments() {
        let mut clip = sample_clip();
        clip.transcript.swap(0, 1);
        assert_matches!(clip.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn translation_is_not_window_checked() {
        let mut clip = sample_clip();
        clip.translation = Some(vec![TranscriptSegment::new("hors fenêtre", 90_000, 1_000)]);
        assert!(clip.validate().is_ok());
    }

    // -- clip_transcript -----------------------------------------------------

    #[test]
    fn clipping_drops_out_of_window_and_blank_segments() {
        let raw = vec![
            TranscriptSegment::new("before", 0, 1_000),
            TranscriptSegment::new("  ", 5_500, 500),
            TranscriptSegment::new("inside", 6_000, 1_000),
            TranscriptSegment::new("after", 10_000, 1_000),
        ];
        let clipped = clip_transcript(&raw, 5.0, 10.0);
        assert_eq!(clipped, vec![TranscriptSegment::new("inside", 6_000, 1_000)]);
    }

    #[test]
    fn clipping_moves_straddling_segment_to_window_start() {
        let raw = vec![TranscriptSegment::new(" straddle ", 4_000, 2_000)];
        let clipped = clip_transcript(&raw, 5.0, 10.0);
        assert_eq!(clipped, vec![TranscriptSegment::new("straddle", 5_000, 1_000)]);
    }

    #[test]
    fn clipping_cuts_duration_at_window_end() {
        let raw = vec![TranscriptSegment::new("tail", 9_500, 2_000)];
        let clipped = clip_transcript(&raw, 5.0, 10.0);
        assert_eq!(clipped, vec![TranscriptSegment::new("tail", 9_500, 500)]);
    }

    #[test]
    fn segment_json_uses_offset_and_duration_keys() {
        let seg: TranscriptSegment =
            serde_json::from_str(r#"{"text":"hi","offset":1200,"duration":800}"#).unwrap();
        assert_eq!(seg, TranscriptSegment::new("hi", 1_200, 800));
        assert_eq!(seg.end_ms(), 2_000);
    }
}
