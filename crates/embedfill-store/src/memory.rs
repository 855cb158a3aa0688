//! Process-local store implementing both the source and destination side.
//!
//! Keeps records in insertion order (the paging key) and embeddings in a map
//! keyed by `(source_record_id, embedding_type)`, so the uniqueness invariant
//! holds by construction.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

use embedfill_core::error::StoreError;
use embedfill_core::traits::{DestinationStore, SourceStore};
use embedfill_core::types::{
    EmbeddingRecord, EmbeddingType, InsertOutcome, PersistOutcome, RecordId, SourceRecord, StoreStats,
};

type Key = (RecordId, EmbeddingType);

#[derive(Default)]
struct Inner {
    records: Vec<SourceRecord>,
    embeddings: BTreeMap<Key, EmbeddingRecord>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    expected_dim: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SourceRecord>) -> Self {
        Self { inner: RwLock::new(Inner { records, embeddings: BTreeMap::new() }), expected_dim: None }
    }

    /// Vectors of any other length are rejected with [`StoreError::Rejected`].
    pub fn with_expected_dim(mut self, dim: usize) -> Self {
        self.expected_dim = Some(dim);
        self
    }

    pub async fn add_records(&self, records: impl IntoIterator<Item = SourceRecord>) {
        self.inner.write().await.records.extend(records);
    }

    /// Pre-populate an embedding, as if an earlier run had written it.
    pub async fn seed_embedding(&self, record: EmbeddingRecord) {
        self.inner.write().await.embeddings.insert(record.key(), record);
    }

    pub async fn embeddings(&self) -> Vec<EmbeddingRecord> {
        self.inner.read().await.embeddings.values().cloned().collect()
    }

    pub async fn get(&self, id: &RecordId, embedding_type: EmbeddingType) -> Option<EmbeddingRecord> {
        self.inner.read().await.embeddings.get(&(id.clone(), embedding_type)).cloned()
    }

    pub async fn embedding_count(&self) -> usize {
        self.inner.read().await.embeddings.len()
    }

    fn check_dim(&self, record: &EmbeddingRecord) -> Result<(), StoreError> {
        match self.expected_dim {
            Some(dim) if record.vector.dim() != dim => Err(StoreError::Rejected(format!(
                "vector for {} has dim {} (expected {dim})",
                record.source_record_id,
                record.vector.dim()
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SourceStore for InMemoryStore {
    async fn count_unembedded(&self, _embedding_type: EmbeddingType) -> Result<u64, StoreError> {
        Ok(self.inner.read().await.records.len() as u64)
    }

    async fn fetch_page(&self, offset: u64, limit: usize) -> Result<Vec<SourceRecord>, StoreError> {
        let inner = self.inner.read().await;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(inner.records.iter().skip(start).take(limit).cloned().collect())
    }

    async fn check_existing(
        &self,
        ids: &[RecordId],
        embedding_type: EmbeddingType,
    ) -> Result<HashSet<RecordId>, StoreError> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter(|id| inner.embeddings.contains_key(&((*id).clone(), embedding_type)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DestinationStore for InMemoryStore {
    async fn insert_many(&self, records: &[EmbeddingRecord]) -> Result<PersistOutcome, StoreError> {
        for record in records {
            self.check_dim(record)?;
        }
        let mut inner = self.inner.write().await;
        let mut outcome = PersistOutcome::default();
        for record in records {
            if inner.embeddings.contains_key(&record.key()) {
                outcome.already_present += 1;
            } else {
                inner.embeddings.insert(record.key(), record.clone());
                outcome.written_count += 1;
            }
        }
        Ok(outcome)
    }

    async fn insert_one(&self, record: &EmbeddingRecord) -> Result<InsertOutcome, StoreError> {
        self.check_dim(record)?;
        let mut inner = self.inner.write().await;
        if inner.embeddings.contains_key(&record.key()) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        inner.embeddings.insert(record.key(), record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let inner = self.inner.read().await;
        let today = Utc::now().date_naive();
        let mut stats = StoreStats::default();
        for ty in EmbeddingType::ALL {
            stats.by_type.insert(ty, 0);
        }
        for record in inner.embeddings.values() {
            stats.total += 1;
            *stats.by_type.entry(record.embedding_type).or_insert(0) += 1;
            if record.created_at.date_naive() == today {
                stats.today += 1;
            }
        }
        Ok(stats)
    }
}
