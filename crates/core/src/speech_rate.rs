//! Speech-rate (words per minute) computation.
//!
//! Computed once when a clip is authored and stored on the clip; the
//! session never recomputes it.

use crate::clip::{Clip, TranscriptSegment};
use crate::error::CoreError;

/// Count whitespace-separated words across all segments.
pub fn word_count(segments: &[TranscriptSegment]) -> usize {
    segments
        .iter()
        .map(|s| s.text.split_whitespace().count())
        .sum()
}

/// Words per minute over `duration_sec`, rounded to the nearest integer.
pub fn words_per_minute(
    segments: &[TranscriptSegment],
    duration_sec: f64,
) -> Result<u32, CoreError> {
    if !duration_sec.is_finite() || duration_sec <= 0.0 {
        return Err(CoreError::Validation(format!(
            "Speech rate needs a positive duration, got {duration_sec}"
        )));
    }
    let minutes = duration_sec / 60.0;
    Ok((word_count(segments) as f64 / minutes).round() as u32)
}

/// Compute the speech rate of a clip's primary transcript over its duration.
pub fn clip_speech_rate(clip: &Clip) -> Result<u32, CoreError> {
    words_per_minute(&clip.transcript, clip.duration_sec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_words_across_segments() {
        let segs = vec![
            TranscriptSegment::new("hello  there", 0, 1_000),
            TranscriptSegment::new("general kenobi\n", 1_000, 1_000),
        ];
        assert_eq!(word_count(&segs), 4);
    }

    #[test]
    fn thirty_words_in_twenty_seconds_is_ninety_wpm() {
        let text = vec!["word"; 30].join(" ");
        let segs = vec![TranscriptSegment::new(text, 0, 20_000)];
        assert_eq!(words_per_minute(&segs, 20.0).unwrap(), 90);
    }

    #[test]
    fn rounds_to_nearest() {
        let segs = vec![TranscriptSegment::new("a b c", 0, 1_000)];
        // 3 words in 7 seconds = 25.71 wpm
        assert_eq!(words_per_minute(&segs, 7.0).unwrap(), 26);
    }

    #[test]
    fn rejects_zero_duration() {
        let segs = vec![TranscriptSegment::new("a", 0, 1_000)];
        assert!(words_per_minute(&segs, 0.0).is_err());
    }
}
