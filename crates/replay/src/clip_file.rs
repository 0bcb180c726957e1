//! Loading a clip definition from JSON.
//!
//! The file may carry the full source transcript; it is cut down to the clip
//! window before validation.

use std::path::Path;

use anyhow::Context;
use shadow_core::clip::{clip_transcript, Clip};
use shadow_core::speech_rate::clip_speech_rate;

/// Bundled clip used when no path is given.
const SAMPLE_CLIP: &str = include_str!("../../../demos/sample_clip.json");

pub fn load(path: Option<&Path>) -> anyhow::Result<Clip> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading clip file {}", path.display()))?,
        None => SAMPLE_CLIP.to_string(),
    };
    parse(&raw)
}

pub fn parse(raw: &str) -> anyhow::Result<Clip> {
    let mut clip: Clip = serde_json::from_str(raw).context("parsing clip JSON")?;

    clip.transcript = clip_transcript(&clip.transcript, clip.start_sec, clip.end_sec);
    clip.translation = clip
        .translation
        .as_deref()
        .map(|segments| clip_transcript(segments, clip.start_sec, clip.end_sec))
        .filter(|segments| !segments.is_empty());

    if clip.speech_rate_wpm.is_none() {
        clip.speech_rate_wpm = clip_speech_rate(&clip).ok();
    }

    clip.validate().context("invalid clip")?;
    Ok(clip)
}
