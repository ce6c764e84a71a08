//! HTTP embedding provider (OpenAI-compatible embeddings endpoint).

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::{EmbeddingProvider, ProviderError};

/// Embedding client configuration.
#[derive(Clone)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl EmbeddingConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: "https://api.openai.com/v1/embeddings".to_string(),
            api_key: api_key.into(),
            model: "text-embedding-3-small".to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

pub struct HttpEmbeddingProvider {
    config: EmbeddingConfig,
    http: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> Self {
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
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.config.model,
            "input": texts,
        });

        debug!(model = %self.config.model, batch = texts.len(), "embedding request");

        let response = self
            .http
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.chars().take(200).collect::<String>();
            return Err(ProviderError::Api(format!("HTTP {status}: {text}")));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        json["data"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row["embedding"]
                            .as_array()
                            .map(|xs| {
                                xs.iter()
                                    .filter_map(|x| x.as_f64())
                                    .map(|x| x as f32)
                                    .collect::<Vec<f32>>()
                            })
                            .ok_or_else(|| {
                                ProviderError::Parse("row has no embedding array".into())
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .ok_or_else(|| ProviderError::Parse("response has no data array".into()))?
    }
}
