use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use embedfill_core::config::EmbeddingConfig;
use embedfill_core::error::{EmbedError, ProviderError};
use embedfill_core::retry::RetryPolicy;
use embedfill_core::traits::EmbeddingProvider;
use embedfill_core::types::EmbeddingVector;

/// Policy-wrapped access to an [`EmbeddingProvider`].
///
/// Each provider call runs under its own `request_timeout`; a timeout is a
/// retryable failure and counts against the retry budget. Nothing is cached.
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
    request_timeout: Duration,
    max_text_chars: usize,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy, request_timeout: Duration::from_secs(30), max_text_chars: 4000 }
    }

    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, cfg: &EmbeddingConfig) -> Self {
        Self::new(provider, cfg.retry_policy())
            .with_request_timeout(cfg.request_timeout())
            .with_max_text_chars(cfg.max_text_chars)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_text_chars(mut self, max: usize) -> Self {
        self.max_text_chars = max.max(1);
        self
    }

    pub fn embedder_id(&self) -> &str {
        self.provider.embedder_id()
    }

    pub fn dim(&self) -> usize {
        self.provider.dim()
    }

    /// Trimmed, length-capped text, or `None` when nothing would be left to embed.
    pub fn prepare(&self, text: &str) -> Option<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.char_indices().nth(self.max_text_chars) {
            Some((cut, _)) => Some(trimmed[..cut].to_string()),
            None => Some(trimmed.to_string()),
        }
    }

    pub async fn generate_one(&self, text: &str) -> Result<EmbeddingVector, EmbedError> {
        let input = self.prepare(text).ok_or(EmbedError::InvalidInput)?;
        let inputs = [input];
        let vector = self
            .policy
            .execute(|| async {
                let mut out = self.call(&inputs).await?;
                out.pop().ok_or_else(|| ProviderError::Malformed("empty response".to_string()))
            })
            .await?;
        debug!(dim = vector.dim(), "single embedding generated");
        Ok(vector)
    }

    /// Position-aligned with `texts`. Blank entries never reach the provider and come back as `None`.
    ///
    /// On exhaustion the typed failure is returned as-is; per-item recovery is the caller's job.
    pub async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Option<EmbeddingVector>>, EmbedError> {
        let mut results: Vec<Option<EmbeddingVector>> = vec![None; texts.len()];
        let (indices, inputs): (Vec<usize>, Vec<String>) = texts
            .iter()
            .enumerate()
            .filter_map(|(i, t)| self.prepare(t).map(|p| (i, p)))
            .unzip();

        if inputs.is_empty() {
            debug!(count = texts.len(), "no non-blank texts in batch, skipping provider call");
            return Ok(results);
        }

        let vectors = self.policy.execute(|| self.call(&inputs)).await?;
        for (i, v) in indices.into_iter().zip(vectors) {
            results[i] = Some(v);
        }
        debug!(sent = inputs.len(), total = texts.len(), "batch embedding succeeded");
        Ok(results)
    }

    async fn call(&self, inputs: &[String]) -> Result<Vec<EmbeddingVector>, ProviderError> {
        let vectors = tokio::time::timeout(self.request_timeout, self.provider.embed_batch(inputs))
            .await
            .map_err(|_| ProviderError::Timeout(self.request_timeout))??;
        if vectors.len() != inputs.len() {
            return Err(ProviderError::Malformed(format!(
                "provider returned {} embeddings for {} inputs",
                vectors.len(),
                inputs.len()
            )));
        }
        let dim = self.provider.dim();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(ProviderError::Malformed(format!("dim mismatch: got {} expected {}", bad.len(), dim)));
        }
        Ok(vectors.into_iter().map(EmbeddingVector::from).collect())
    }
}
