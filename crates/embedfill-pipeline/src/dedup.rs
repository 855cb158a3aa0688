use std::collections::HashSet;
use std::sync::Arc;

use embedfill_core::error::{PipelineError, Result};
use embedfill_core::retry::RetryPolicy;
use embedfill_core::traits::SourceStore;
use embedfill_core::types::{EmbeddingType, RecordId};

/// Drops ids that already have an embedding of the requested type.
///
/// Only saves provider calls; the destination's uniqueness check is what
/// keeps writes exactly-once.
pub struct DedupFilter {
    source: Arc<dyn SourceStore>,
    policy: RetryPolicy,
}

impl DedupFilter {
    pub fn new(source: Arc<dyn SourceStore>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub async fn filter_unembedded(&self, ids: &[RecordId], embedding_type: EmbeddingType) -> Result<HashSet<RecordId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let existing = self
            .policy
            .execute(|| self.source.check_existing(ids, embedding_type))
            .await
            .map_err(PipelineError::StoreRead)?;
        Ok(ids.iter().filter(|id| !existing.contains(*id)).cloned().collect())
    }
}
