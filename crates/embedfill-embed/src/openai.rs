//! Embeddings over an OpenAI-compatible `/embeddings` endpoint.
//!
//! This adapter makes exactly one HTTP request per call. Retries, backoff and
//! the per-request deadline belong to [`crate::EmbeddingClient`].

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use embedfill_core::config::EmbeddingConfig;
use embedfill_core::error::ProviderError;
use embedfill_core::traits::EmbeddingProvider;

pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    id: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, cfg: &EmbeddingConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!cfg.model.trim().is_empty(), "missing embedding model name");
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth).context("invalid OpenAI API key")?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build OpenAI HTTP client")?;
        let endpoint = format!("{}/embeddings", cfg.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model: cfg.model.clone(),
            dimensions: cfg.dimensions,
            id: format!("openai:{}:d{}", cfg.model, cfg.dimensions),
        })
    }

    /// Reads the key from the config, then from `OPENAI_API_KEY`.
    pub fn from_config(cfg: &EmbeddingConfig) -> anyhow::Result<Self> {
        let key = cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| anyhow::anyhow!("OpenAI API key is not set; set embedding.api_key or OPENAI_API_KEY"))?;
        Self::new(&key, cfg)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest { model: &self.model, input: texts, dimensions: self.dimensions };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ProviderError::Http { status: status.as_u16(), body });
        }

        let mut parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("failed to parse embedding response: {e}")))?;
        parsed.data.sort_by_key(|entry| entry.index);
        debug!(inputs = texts.len(), returned = parsed.data.len(), "openai embeddings response");
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
