//! Narrow interfaces to the collaborators the pipeline depends on.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::{ProviderError, StoreError};
use crate::types::{EmbeddingRecord, EmbeddingType, InsertOutcome, PersistOutcome, RecordId, SourceRecord, StoreStats};

#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Number of candidate records a pass for `embedding_type` walks over.
    async fn count_unembedded(&self, embedding_type: EmbeddingType) -> Result<u64, StoreError>;

    /// A page of records in a stable order. Offsets stay meaningful only while
    /// the source is append-only for the duration of a run.
    async fn fetch_page(&self, offset: u64, limit: usize) -> Result<Vec<SourceRecord>, StoreError>;

    /// The subset of `ids` that already has an embedding of `embedding_type`.
    async fn check_existing(
        &self,
        ids: &[RecordId],
        embedding_type: EmbeddingType,
    ) -> Result<HashSet<RecordId>, StoreError>;
}

#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Insert-if-absent for a whole batch. Existing keys count as `already_present`.
    async fn insert_many(&self, records: &[EmbeddingRecord]) -> Result<PersistOutcome, StoreError>;

    async fn insert_one(&self, record: &EmbeddingRecord) -> Result<InsertOutcome, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `openai:text-embedding-3-small:d1536`).
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}
