//! Domain types shared by the stores, the embedding client and the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Opaque, unique identifier of a source record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A text record owned by the source store. Read-only to the pipeline.
///
/// `text` may be empty or whitespace-only; such records are never embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: RecordId,
    pub text: String,
}

impl SourceRecord {
    pub fn new(id: impl Into<RecordId>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Fixed-dimensionality vector produced by the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(v: Vec<f32>) -> Self {
        Self(v)
    }
}

/// Semantic purpose of an embedding for a given record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingType {
    /// Title and body merged; the input used for clustering.
    #[default]
    Combined,
    Content,
    Title,
}

impl EmbeddingType {
    pub const ALL: [EmbeddingType; 3] = [Self::Combined, Self::Content, Self::Title];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Combined => "combined",
            Self::Content => "content",
            Self::Title => "title",
        }
    }
}

impl fmt::Display for EmbeddingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown embedding type '{0}' (expected combined, content or title)")]
pub struct UnknownEmbeddingType(pub String);

impl FromStr for EmbeddingType {
    type Err = UnknownEmbeddingType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combined" => Ok(Self::Combined),
            "content" => Ok(Self::Content),
            "title" => Ok(Self::Title),
            other => Err(UnknownEmbeddingType(other.to_string())),
        }
    }
}

/// A persisted embedding. At most one exists per `(source_record_id, embedding_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub source_record_id: RecordId,
    pub embedding_type: EmbeddingType,
    pub vector: EmbeddingVector,
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    pub fn new(
        source_record_id: RecordId,
        embedding_type: EmbeddingType,
        vector: EmbeddingVector,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { source_record_id, embedding_type, vector, created_at }
    }

    pub fn key(&self) -> (RecordId, EmbeddingType) {
        (self.source_record_id.clone(), self.embedding_type)
    }
}

/// Lifecycle of a chunk inside the batch scheduler.
///
/// `Planned -> Filtered -> {EmptyDone | Submitted}`, then either
/// `BatchOk -> Written` or `BatchFailed -> Fallback -> PartialOk -> Written`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Planned,
    Filtered,
    EmptyDone,
    Submitted,
    BatchOk,
    BatchFailed,
    Fallback,
    PartialOk,
    Written,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::EmptyDone | Self::Written)
    }
}

/// One provider-sized chunk of records, in source order.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub items: Vec<SourceRecord>,
    /// Batch-level provider attempts spent on this chunk.
    pub attempt: u32,
    pub state: BatchState,
}

impl BatchJob {
    pub fn new(items: Vec<SourceRecord>) -> Self {
        Self { items, attempt: 0, state: BatchState::Planned }
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.items.iter().map(|r| r.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Result of writing a batch of embedding records.
///
/// `written_count + already_present + failed_ids.len()` equals the number of
/// records handed to the write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub written_count: usize,
    pub already_present: usize,
    pub failed_ids: Vec<RecordId>,
}

impl PersistOutcome {
    pub fn total(&self) -> usize {
        self.written_count + self.already_present + self.failed_ids.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Destination totals shown in the operator summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub by_type: BTreeMap<EmbeddingType, u64>,
    pub today: u64,
}
