//! Groups consecutive subtitle entries into ≥30-second chunks.

use crate::subtitles::SubtitleEntry;

/// Minimum span a chunk covers before it is closed.
pub const MIN_CHUNK_SPAN_SECS: f64 = 30.0;

/// A contiguous group of subtitle entries, text concatenated.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleChunk {
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
}

/// Accumulate consecutive entries; a chunk closes once its cumulative span
/// reaches the minimum, and a trailing partial chunk is flushed.
pub fn chunk_entries(entries: &[SubtitleEntry]) -> Vec<SubtitleChunk> {
    let mut chunks = Vec::new();
    let mut current: Option<SubtitleChunk> = None;

    for entry in entries {
        let chunk = current.get_or_insert_with(|| SubtitleChunk {
            start_sec: entry.start_sec,
            end_sec: entry.end_sec,
            text: String::new(),
        });

        if !chunk.text.is_empty() {
            chunk.text.push(' ');
        }
        chunk.text.push_str(&entry.text);
        chunk.end_sec = entry.end_sec;

        if chunk.end_sec - chunk.start_sec >= MIN_CHUNK_SPAN_SECS {
            chunks.extend(current.take());
        }
    }
    chunks.extend(current);
    chunks
}
