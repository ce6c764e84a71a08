//! Semantic "jump to scene" assistant.
//!
//! Turns a free-text scene request into a playback position: subtitles are
//! fetched and chunked, chunks are embedded, and the best-matching chunk's
//! start time becomes the seek target. The language model only supplies
//! the scene description; the locator is deterministic given an index.

pub mod assistant;
pub mod chunker;
pub mod embeddings;
pub mod index;
pub mod llm;
pub mod subtitles;

use async_trait::async_trait;

pub use assistant::{extract_seek_request, AssistantReply, SceneSeekAssistant, SeekRequest};
pub use chunker::{chunk_entries, SubtitleChunk, MIN_CHUNK_SPAN_SECS};
pub use embeddings::{EmbeddingConfig, HttpEmbeddingProvider};
pub use index::{cosine_similarity, EmbeddingIndexBuilder, MovieChunk, MovieEmbeddingIndex};
pub use llm::{HttpLanguageModel, LlmConfig};
pub use subtitles::{HttpSubtitleProvider, SubtitleConfig, SubtitleEntry};

/// Errors from the external providers this crate consumes.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    Api(String),
    #[error("rate limited")]
    RateLimited,
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Free-text completion provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError>;
}

/// Text-to-vector provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per text, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_batch(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::Parse("provider returned no vectors".into()))
    }
}

/// Subtitle track provider (search + download + extraction live behind it).
#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    /// Fetch the subtitle track for a movie title, ordered by start time.
    /// An empty result means no subtitles are available.
    async fn fetch_subtitles(&self, movie_title: &str)
        -> Result<Vec<SubtitleEntry>, ProviderError>;
}
