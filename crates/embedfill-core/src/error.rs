use std::time::Duration;
use thiserror::Error;

use crate::types::{EmbeddingType, RecordId};

/// Transient failure of a single provider call. Always retryable.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Terminal failure of a retried operation, carrying the last underlying error.
#[derive(Debug, Clone, Error)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    #[source]
    pub last: E,
}

#[derive(Debug, Error)]
pub enum EmbedError {
    /// Blank or empty text. Rejected before any network call.
    #[error("invalid input: text is empty or blank")]
    InvalidInput,

    #[error("provider failed: {0}")]
    Provider(#[from] RetryExhausted<ProviderError>),
}

impl EmbedError {
    /// Short label used in the failure-reason histogram.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidInput => crate::EMPTY_TEXT_REASON,
            Self::Provider(_) => "provider error",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store could not be read (connectivity, missing table, ...).
    #[error("store read failed: {0}")]
    Read(String),

    /// The store could not be written.
    #[error("store write failed: {0}")]
    Write(String),

    /// The `(source_record_id, embedding_type)` pair already exists.
    #[error("embedding for ({id}, {embedding_type}) already exists")]
    Duplicate { id: RecordId, embedding_type: EmbeddingType },

    /// The store refused the payload itself; retrying will not help.
    #[error("record rejected: {0}")]
    Rejected(String),
}

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fatal store read error: {0}")]
    StoreRead(#[source] RetryExhausted<StoreError>),

    #[error("fatal store write error: {0}")]
    StoreWrite(#[source] RetryExhausted<StoreError>),

    #[error("run cancelled before any page completed")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
