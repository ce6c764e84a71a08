//! Scene seek assistant: answer → seek clause → windowed vector search.

use std::ops::Range;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{info, warn};

use matinee_common::SceneError;
use matinee_store::SharedStore;
use matinee_sync::protocol::paths;
use matinee_sync::{MediaController, PlayerAction, PlaybackSyncEngine};

use crate::index::{cosine_similarity, EmbeddingIndexBuilder, MovieChunk};
use crate::LanguageModel;

/// How far around a fraction hint the search window extends, as a share of
/// the movie's chunk count.
const WINDOW_HALF_WIDTH: f64 = 1.0 / 8.0;

const SCENE_SYSTEM_PROMPT: &str = "You are the watch-party assistant for a movie the viewers are \
watching together. Answer questions about the movie concisely. When the viewer asks to jump to a \
moment in the movie, end your reply with a sentence of the exact form: Seeking to the scene where \
<short description>... You may append (n/d of the movie) when you can estimate how far into the \
movie the scene falls. Never use that closing form unless a jump was requested.";

// ---------------------------------------------------------------------------
// Seek clause extraction
// ---------------------------------------------------------------------------

/// A parsed "jump to scene" request from a model answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekRequest {
    pub description: String,
    /// Rough position hint as a fraction (numerator, denominator).
    pub fraction: Option<(u32, u32)>,
}

static SEEK_CLAUSE: OnceLock<Regex> = OnceLock::new();

fn seek_clause_re() -> &'static Regex {
    SEEK_CLAUSE.get_or_init(|| {
        Regex::new(
            r"Seeking to the scene where (?P<desc>.+?)\.\.\.(?:\s*\((?P<n>\d+)\s*/\s*(?P<d>\d+) of the movie\))?\s*$",
        )
        .expect("seek clause pattern is valid")
    })
}

/// Extract the trailing seek clause from an answer, if present. Answers
/// without the clause mean no seek was requested.
pub fn extract_seek_request(answer: &str) -> Option<SeekRequest> {
    let caps = seek_clause_re().captures(answer.trim_end())?;
    let description = caps.name("desc")?.as_str().trim().to_string();
    if description.is_empty() {
        return None;
    }
    let fraction = match (caps.name("n"), caps.name("d")) {
        (Some(n), Some(d)) => {
            let n: u32 = n.as_str().parse().ok()?;
            let d: u32 = d.as_str().parse().ok()?;
            (d > 0).then_some((n, d))
        }
        _ => None,
    };
    Some(SeekRequest {
        description,
        fraction,
    })
}

// ---------------------------------------------------------------------------
// Windowed search
// ---------------------------------------------------------------------------

/// Chunk-index window for a fraction hint: `[n/d − 1/8, n/d + 1/8]` of the
/// chunk count, clamped to the valid range. No hint searches everything.
fn search_window(total: usize, fraction: Option<(u32, u32)>) -> Range<usize> {
    let Some((n, d)) = fraction else {
        return 0..total;
    };
    if d == 0 {
        return 0..total;
    }
    let center = f64::from(n) / f64::from(d);
    let lo = (center - WINDOW_HALF_WIDTH).clamp(0.0, 1.0);
    let hi = (center + WINDOW_HALF_WIDTH).clamp(0.0, 1.0);
    let start = (total as f64 * lo).floor() as usize;
    let end = ((total as f64 * hi).ceil() as usize).min(total);
    if start >= end {
        return 0..total;
    }
    start..end
}

/// The chunk in `window` most similar to `query`; ties go to the lowest
/// index.
fn best_chunk(chunks: &[MovieChunk], query: &[f32], window: Range<usize>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for i in window {
        let Some(chunk) = chunks.get(i) else { break };
        let similarity = cosine_similarity(&chunk.vector, query);
        match best {
            Some((_, s)) if similarity <= s => {}
            _ => best = Some((i, similarity)),
        }
    }
    best.map(|(i, _)| i)
}

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

/// The model's reply plus the seek it produced, if any.
#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub answer: String,
    pub seek_to: Option<f64>,
}

pub struct SceneSeekAssistant {
    llm: Arc<dyn LanguageModel>,
    builder: Arc<EmbeddingIndexBuilder>,
    store: Arc<dyn SharedStore>,
    engine: Arc<PlaybackSyncEngine>,
    controller: Arc<dyn MediaController>,
}

impl SceneSeekAssistant {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        builder: Arc<EmbeddingIndexBuilder>,
        store: Arc<dyn SharedStore>,
        engine: Arc<PlaybackSyncEngine>,
        controller: Arc<dyn MediaController>,
    ) -> Self {
        Self {
            llm,
            builder,
            store,
            engine,
            controller,
        }
    }

    /// Full pipeline: ask the model, extract a seek clause, locate the
    /// scene, and apply the seek.
    pub async fn ask(
        &self,
        room_id: &str,
        movie_id: &str,
        movie_title: &str,
        question: &str,
    ) -> Result<AssistantReply, SceneError> {
        let answer = self
            .llm
            .complete(SCENE_SYSTEM_PROMPT, question)
            .await
            .map_err(|e| SceneError::Model(e.to_string()))?;

        let seek_to = match extract_seek_request(&answer) {
            Some(request) => {
                self.seek_to_scene(room_id, movie_id, movie_title, &request)
                    .await?
            }
            None => None,
        };
        Ok(AssistantReply { answer, seek_to })
    }

    /// Locate the requested scene and apply the seek. Returns the target
    /// position, or `None` when no seek happened (missing subtitles or a
    /// provider failure, both non-fatal).
    pub async fn seek_to_scene(
        &self,
        room_id: &str,
        movie_id: &str,
        movie_title: &str,
        request: &SeekRequest,
    ) -> Result<Option<f64>, SceneError> {
        let Some(target) = self.locate(movie_id, movie_title, request).await? else {
            return Ok(None);
        };
        self.apply_seek(room_id, target).await;
        Ok(Some(target))
    }

    /// Resolve a request to a playback position without applying it.
    pub async fn locate(
        &self,
        movie_id: &str,
        movie_title: &str,
        request: &SeekRequest,
    ) -> Result<Option<f64>, SceneError> {
        let index = match self.builder.index_for(movie_id, movie_title).await {
            Ok(index) => index,
            Err(SceneError::SubtitlesUnavailable(title)) => {
                warn!(movie_title = %title, "no subtitles, skipping seek");
                return Ok(None);
            }
            Err(SceneError::Provider(e)) => {
                warn!(movie_id, "provider failure during index build, skipping seek: {e}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let query = match self.builder.embeddings().embed(&request.description).await {
            Ok(v) => v,
            Err(e) => {
                warn!(movie_id, "embedding failure, skipping seek: {e}");
                return Ok(None);
            }
        };

        let window = search_window(index.chunks.len(), request.fraction);
        let Some(best) = best_chunk(&index.chunks, &query, window) else {
            return Ok(None);
        };
        let chunk = &index.chunks[best];
        let target = chunk.start_sec.floor().max(0.0);
        info!(
            movie_id,
            chunk = best,
            target,
            description = %request.description,
            "scene located"
        );
        Ok(Some(target))
    }

    /// In an active session the seek rides the shared `playerState` log so
    /// every peer follows; otherwise only the local player moves. The local
    /// player is sought either way, since our own log entry is dropped as
    /// an echo.
    async fn apply_seek(&self, room_id: &str, target: f64) {
        let in_session = self
            .store
            .once(&paths::in_session(room_id))
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if in_session {
            if let Err(e) = self
                .engine
                .handle_local_event(room_id, PlayerAction::Seek, target)
                .await
            {
                warn!(room_id, "could not propagate scene seek: {e}");
            }
        }
        self.controller.seek(target).await;
    }
}
