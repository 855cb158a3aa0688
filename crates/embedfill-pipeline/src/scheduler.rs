//! Chunking and per-chunk execution.
//!
//! Chunks of one page run strictly one after another. Provider and item
//! failures are settled here; only store errors leave [`BatchScheduler::run_page`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use embedfill_core::error::{EmbedError, Result};
use embedfill_core::types::{BatchJob, BatchState, EmbeddingType, EmbeddingVector, SourceRecord};
use embedfill_embed::EmbeddingClient;

use crate::dedup::DedupFilter;
use crate::fallback::FallbackExecutor;
use crate::stats::{ProgressReporter, StatsTracker};
use crate::stop::StopSignal;
use crate::writer::ResultWriter;

type Settled = Vec<(SourceRecord, std::result::Result<EmbeddingVector, EmbedError>)>;

/// Failure reason for records the destination refused.
pub const REJECTED_REASON: &str = "rejected by store";

/// Split `records` into chunks of at most `batch_size`, keeping source order.
pub fn plan(records: Vec<SourceRecord>, batch_size: usize) -> Vec<BatchJob> {
    let size = batch_size.max(1);
    let mut jobs = Vec::with_capacity(records.len().div_ceil(size));
    let mut items = records.into_iter().peekable();
    while items.peek().is_some() {
        jobs.push(BatchJob::new(items.by_ref().take(size).collect()));
    }
    jobs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Completed,
    /// The stop signal was seen before every chunk ran.
    Interrupted,
}

pub struct BatchScheduler {
    dedup: DedupFilter,
    client: Arc<EmbeddingClient>,
    fallback: FallbackExecutor,
    writer: ResultWriter,
    embedding_type: EmbeddingType,
    pacing: Duration,
}

impl BatchScheduler {
    pub fn new(
        dedup: DedupFilter,
        client: Arc<EmbeddingClient>,
        fallback: FallbackExecutor,
        writer: ResultWriter,
        embedding_type: EmbeddingType,
        pacing: Duration,
    ) -> Self {
        Self { dedup, client, fallback, writer, embedding_type, pacing }
    }

    pub async fn run_page(
        &self,
        jobs: Vec<BatchJob>,
        stats: &StatsTracker,
        progress: &dyn ProgressReporter,
        stop: &StopSignal,
    ) -> Result<PageOutcome> {
        for job in jobs {
            if stop.is_stopped() {
                info!("stop requested, leaving page early");
                return Ok(PageOutcome::Interrupted);
            }
            let state = self.run_job(job, stats, progress).await?;
            debug_assert!(state.is_terminal(), "chunk left in {state:?}");
            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }
        Ok(PageOutcome::Completed)
    }

    /// Drive one chunk to a terminal state.
    pub async fn run_job(&self, mut job: BatchJob, stats: &StatsTracker, progress: &dyn ProgressReporter) -> Result<BatchState> {
        let pending = self.dedup.filter_unembedded(&job.ids(), self.embedding_type).await?;
        let before = job.len();
        job.items.retain(|r| pending.contains(&r.id));
        job.state = BatchState::Filtered;

        let skipped = (before - job.len()) as u64;
        if skipped > 0 {
            debug!(skipped, "records already embedded");
            stats.record_skipped(skipped);
            progress.advance(skipped);
        }
        if job.is_empty() {
            job.state = BatchState::EmptyDone;
            return Ok(job.state);
        }

        job.state = BatchState::Submitted;
        job.attempt += 1;
        let texts: Vec<String> = job.items.iter().map(|r| r.text.clone()).collect();
        let settled: Settled = match self.client.generate_batch(&texts).await {
            Ok(vectors) => {
                job.state = BatchState::BatchOk;
                job.items
                    .into_iter()
                    .zip(vectors)
                    .map(|(record, vector)| (record, vector.ok_or(EmbedError::InvalidInput)))
                    .collect()
            }
            Err(err) => {
                job.state = BatchState::BatchFailed;
                if let EmbedError::Provider(exhausted) = &err {
                    job.attempt = exhausted.attempts;
                }
                warn!(error = %err, items = job.len(), attempts = job.attempt, "batch call failed, recovering item by item");
                job.state = BatchState::Fallback;
                let recovered = self.fallback.recover(&job.items).await;
                job.state = BatchState::PartialOk;
                recovered
            }
        };

        self.settle(settled, stats, progress).await?;
        job.state = BatchState::Written;
        Ok(job.state)
    }

    async fn settle(&self, settled: Settled, stats: &StatsTracker, progress: &dyn ProgressReporter) -> Result<()> {
        let mut pairs = Vec::with_capacity(settled.len());
        let mut reasons: BTreeMap<&'static str, u64> = BTreeMap::new();
        for (record, result) in settled {
            match result {
                Ok(vector) => pairs.push((record.id, vector)),
                Err(err) => {
                    debug!(id = %record.id, reason = err.reason(), "item failed");
                    *reasons.entry(err.reason()).or_insert(0) += 1;
                }
            }
        }
        let item_failures: u64 = reasons.values().sum();

        // nothing reaches the counters unless the write went through
        let attempted = pairs.len() as u64;
        let outcome = self.writer.persist(pairs, self.embedding_type).await?;
        let rejected = outcome.failed_ids.len() as u64;

        let processed = attempted + item_failures;
        let succeeded = (outcome.written_count + outcome.already_present) as u64;
        for (reason, n) in reasons {
            stats.record_failure(reason, n);
        }
        stats.record_failure(REJECTED_REASON, rejected);
        stats.update(processed, succeeded, item_failures + rejected);
        progress.advance(processed);
        Ok(())
    }
}
