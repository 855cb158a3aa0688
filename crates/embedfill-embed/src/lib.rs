//! Embedding client and providers.
//!
//! Respects `APP_USE_FAKE_EMBEDDINGS=1` to switch to the [`FakeEmbedder`] for
//! fast and deterministic outputs in tests and development.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use embedfill_core::config::EmbeddingConfig;
use embedfill_core::traits::EmbeddingProvider;

pub mod client;
pub mod fake;
pub mod openai;

pub use client::EmbeddingClient;
pub use fake::FakeEmbedder;
pub use openai::OpenAiProvider;

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn get_default_provider(cfg: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    if use_fake_embeddings() {
        info!(dim = cfg.dimensions, "using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(cfg.dimensions)));
    }
    let provider = OpenAiProvider::from_config(cfg)?;
    info!(model = %cfg.model, dim = cfg.dimensions, "using OpenAI embeddings");
    Ok(Arc::new(provider))
}
