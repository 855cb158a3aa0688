use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::debug;

use embedfill_core::error::EmbedError;
use embedfill_core::types::{EmbeddingVector, SourceRecord};
use embedfill_embed::EmbeddingClient;

/// Per-item recovery after a batched call gave up.
///
/// Issues one `generate_one` per record with at most `max_in_flight` calls
/// outstanding. Results keep input order and each item stands alone.
pub struct FallbackExecutor {
    client: Arc<EmbeddingClient>,
    max_in_flight: usize,
}

impl FallbackExecutor {
    /// `max_in_flight == 0` means one slot per item of the chunk.
    pub fn new(client: Arc<EmbeddingClient>, max_in_flight: usize) -> Self {
        Self { client, max_in_flight }
    }

    pub async fn recover(&self, items: &[SourceRecord]) -> Vec<(SourceRecord, Result<EmbeddingVector, EmbedError>)> {
        let limit = match self.max_in_flight {
            0 => items.len(),
            n => n,
        }
        .max(1);
        debug!(items = items.len(), limit, "falling back to single-item calls");
        let client = &self.client;
        stream::iter(items.iter().cloned())
            .map(|record| async move {
                let result = client.generate_one(&record.text).await;
                (record, result)
            })
            .buffered(limit)
            .collect()
            .await
    }
}
