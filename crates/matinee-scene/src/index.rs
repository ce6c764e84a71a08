//! The per-movie embedding index and its single-slot cache.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use matinee_common::SceneError;

use crate::chunker::chunk_entries;
use crate::{EmbeddingProvider, SubtitleProvider};

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// One embedded subtitle chunk.
#[derive(Debug, Clone)]
pub struct MovieChunk {
    pub start_sec: f64,
    pub end_sec: f64,
    pub vector: Vec<f32>,
}

/// The embedding index for one movie.
#[derive(Debug, Clone)]
pub struct MovieEmbeddingIndex {
    pub movie_id: String,
    pub chunks: Vec<MovieChunk>,
}

/// Cosine similarity, 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds movie indexes (fetch → chunk → embed) and keeps the most recent
/// one resident.
///
/// The cache is a single slot for the whole process: a lookup for a
/// different movie rebuilds and replaces it. Reads racing a rebuild see
/// the stale-but-valid previous index; no locking beyond the slot itself.
pub struct EmbeddingIndexBuilder {
    subtitles: Arc<dyn SubtitleProvider>,
    embeddings: Arc<dyn EmbeddingProvider>,
    cache: RwLock<Option<Arc<MovieEmbeddingIndex>>>,
}

impl EmbeddingIndexBuilder {
    pub fn new(
        subtitles: Arc<dyn SubtitleProvider>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            subtitles,
            embeddings,
            cache: RwLock::new(None),
        }
    }

    pub fn embeddings(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embeddings
    }

    /// Return the index for a movie, rebuilding when the cached one is for
    /// a different movie (or absent).
    pub async fn index_for(
        &self,
        movie_id: &str,
        movie_title: &str,
    ) -> Result<Arc<MovieEmbeddingIndex>, SceneError> {
        if let Some(index) = self.cached(movie_id).await {
            debug!(movie_id, "using cached embedding index");
            return Ok(index);
        }

        let entries = self
            .subtitles
            .fetch_subtitles(movie_title)
            .await
            .map_err(|e| SceneError::Provider(e.to_string()))?;
        if entries.is_empty() {
            return Err(SceneError::SubtitlesUnavailable(movie_title.to_string()));
        }

        let chunks = chunk_entries(&entries);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embeddings
            .embed_batch(&texts)
            .await
            .map_err(|e| SceneError::Provider(e.to_string()))?;
        if vectors.len() != chunks.len() {
            return Err(SceneError::EmbeddingMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let index = Arc::new(MovieEmbeddingIndex {
            movie_id: movie_id.to_string(),
            chunks: chunks
                .into_iter()
                .zip(vectors)
                .map(|(c, vector)| MovieChunk {
                    start_sec: c.start_sec,
                    end_sec: c.end_sec,
                    vector,
                })
                .collect(),
        });

        info!(movie_id, chunks = index.chunks.len(), "embedding index built");
        *self.cache.write().await = Some(Arc::clone(&index));
        Ok(index)
    }

    /// The cached index, if it is for this movie.
    pub async fn cached(&self, movie_id: &str) -> Option<Arc<MovieEmbeddingIndex>> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|index| index.movie_id == movie_id)
            .map(Arc::clone)
    }
}
