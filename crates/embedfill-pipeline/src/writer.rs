use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use embedfill_core::error::{PipelineError, Result, StoreError};
use embedfill_core::retry::RetryPolicy;
use embedfill_core::traits::DestinationStore;
use embedfill_core::types::{EmbeddingRecord, EmbeddingType, EmbeddingVector, InsertOutcome, PersistOutcome, RecordId};

/// Splits store failures into payload problems (kept on the `Ok` side so the
/// retry policy does not repeat them) and connectivity problems (retried).
fn fold_rejection<T>(result: std::result::Result<T, StoreError>) -> std::result::Result<std::result::Result<T, StoreError>, StoreError> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(e @ (StoreError::Rejected(_) | StoreError::Duplicate { .. })) => Ok(Err(e)),
        Err(e) => Err(e),
    }
}

pub struct ResultWriter {
    dest: Arc<dyn DestinationStore>,
    policy: RetryPolicy,
}

impl ResultWriter {
    pub fn new(dest: Arc<dyn DestinationStore>, policy: RetryPolicy) -> Self {
        Self { dest, policy }
    }

    /// Persist successful pairs, one bulk write first, per-record writes if the bulk write is refused.
    ///
    /// Every pair ends up counted once in the returned outcome.
    pub async fn persist(&self, pairs: Vec<(RecordId, EmbeddingVector)>, embedding_type: EmbeddingType) -> Result<PersistOutcome> {
        if pairs.is_empty() {
            return Ok(PersistOutcome::default());
        }
        let created_at = Utc::now();
        let records: Vec<EmbeddingRecord> = pairs
            .into_iter()
            .map(|(id, vector)| EmbeddingRecord::new(id, embedding_type, vector, created_at))
            .collect();

        let bulk = self
            .policy
            .execute(|| async { fold_rejection(self.dest.insert_many(&records).await) })
            .await
            .map_err(PipelineError::StoreWrite)?;

        match bulk {
            Ok(outcome) => {
                debug!(written = outcome.written_count, already = outcome.already_present, "bulk write done");
                Ok(outcome)
            }
            Err(rejection) => {
                warn!(error = %rejection, count = records.len(), "bulk write refused, writing records one by one");
                self.persist_each(&records).await
            }
        }
    }

    async fn persist_each(&self, records: &[EmbeddingRecord]) -> Result<PersistOutcome> {
        let mut outcome = PersistOutcome::default();
        for record in records {
            let result = self
                .policy
                .execute(|| async { fold_rejection(self.dest.insert_one(record).await) })
                .await
                .map_err(PipelineError::StoreWrite)?;
            match result {
                Ok(InsertOutcome::Inserted) => outcome.written_count += 1,
                Ok(InsertOutcome::AlreadyExists) | Err(StoreError::Duplicate { .. }) => outcome.already_present += 1,
                Err(e) => {
                    warn!(id = %record.source_record_id, error = %e, "record rejected by store");
                    outcome.failed_ids.push(record.source_record_id.clone());
                }
            }
        }
        Ok(outcome)
    }
}
