//! Subtitle entries and the HTTP subtitle provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ProviderError, SubtitleProvider};

/// One timed subtitle line, second resolution. Produced by the provider's
/// track parsing; consumed only by the chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleEntry {
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
}

// ---------------------------------------------------------------------------
// HTTP provider
// ---------------------------------------------------------------------------

/// Configuration for the subtitle search service.
#[derive(Clone)]
pub struct SubtitleConfig {
    /// Base URL of the subtitle API.
    pub api_url: String,
    pub api_key: String,
}

impl std::fmt::Debug for SubtitleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubtitleConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Subtitle provider backed by a JSON search service. Archive download and
/// track extraction happen server-side; the response is already parsed
/// entries.
pub struct HttpSubtitleProvider {
    config: SubtitleConfig,
    http: reqwest::Client,
}

impl HttpSubtitleProvider {
    pub fn new(config: SubtitleConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("failed to build HTTP client"),
        }
    }
}

#[async_trait]
impl SubtitleProvider for HttpSubtitleProvider {
    async fn fetch_subtitles(
        &self,
        movie_title: &str,
    ) -> Result<Vec<SubtitleEntry>, ProviderError> {
        debug!(movie_title, "fetching subtitles");

        let response = self
            .http
            .get(format!("{}/subtitles", self.config.api_url))
            .query(&[("query", movie_title)])
            .header("x-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.chars().take(200).collect::<String>();
            return Err(ProviderError::Api(format!("HTTP {status}: {text}")));
        }

        let mut entries: Vec<SubtitleEntry> = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        entries.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));
        Ok(entries)
    }
}
