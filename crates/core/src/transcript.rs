//! Time-to-line lookup for primary and translated transcripts.
//!
//! Everything here is stateless; the session machine calls into it on every
//! polling tick.

use serde::Serialize;

use crate::clip::{Clip, TranscriptSegment};

/// Maximum offset distance for a nearest-offset translation match.
///
/// Used only when the translated transcript has a different segment count
/// from the primary one, i.e. alignment was not performed at authoring time.
pub const TRANSLATION_MATCH_WINDOW_MS: u64 = 3_000;

/// Index of the last segment whose offset is `<= current_ms`.
///
/// Returns `None` when `current_ms` precedes every segment.
pub fn active_index(segments: &[TranscriptSegment], current_ms: u64) -> Option<usize> {
    segments.iter().rposition(|s| s.offset_ms <= current_ms)
}

/// Find the translated segment that corresponds to `primary[index]`.
///
/// Equal segment counts are treated as positionally aligned. Otherwise the
/// secondary segment with the smallest absolute offset difference is chosen,
/// provided that difference is below [`TRANSLATION_MATCH_WINDOW_MS`]. Ties go
/// to the earlier segment.
pub fn match_translation(
    primary: &[TranscriptSegment],
    secondary: &[TranscriptSegment],
    index: usize,
) -> Option<usize> {
    let target = primary.get(index)?;

    if primary.len() == secondary.len() {
        return Some(index);
    }

    let (best, diff) = secondary
        .iter()
        .enumerate()
        .map(|(i, s)| (i, s.offset_ms.abs_diff(target.offset_ms)))
        .min_by_key(|&(_, diff)| diff)?;

    (diff < TRANSLATION_MATCH_WINDOW_MS).then_some(best)
}

/// The line shown for a given playback position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveLine {
    /// Index into the primary transcript.
    pub index: usize,
    /// Index into the translated transcript, if one matched.
    pub translation_index: Option<usize>,
}

/// Borrowing view over a clip's transcripts.
pub struct TranscriptIndex<'a> {
    primary: &'a [TranscriptSegment],
    secondary: Option<&'a [TranscriptSegment]>,
}

impl<'a> TranscriptIndex<'a> {
    pub fn new(primary: &'a [TranscriptSegment], secondary: Option<&'a [TranscriptSegment]>) -> Self {
        Self { primary, secondary }
    }

    pub fn for_clip(clip: &'a Clip) -> Self {
        Self::new(&clip.transcript, clip.translation.as_deref())
    }

    /// Resolve the active primary line and its translation at `current_ms`.
    pub fn line_at(&self, current_ms: u64) -> Option<ActiveLine> {
        let index = active_index(self.primary, current_ms)?;
        let translation_index = self
            .secondary
            .and_then(|secondary| match_translation(self.primary, secondary, index));
        Some(ActiveLine {
            index,
            translation_index,
        })
    }

    /// Primary text for a line.
    pub fn text(&self, line: &ActiveLine) -> Option<&'a str> {
        self.primary.get(line.index).map(|s| s.text.as_str())
    }

    /// Translated text for a line, if it has one.
    pub fn translation_text(&self, line: &ActiveLine) -> Option<&'a str> {
        let secondary = self.secondary?;
        line.translation_index
            .and_then(|i| secondary.get(i))
            .map(|s| s.text.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
