//! Top-level driver: count, page, schedule, report.

use std::sync::Arc;
use tracing::info;

use embedfill_core::config::PipelineSettings;
use embedfill_core::error::{PipelineError, Result};
use embedfill_core::retry::RetryPolicy;
use embedfill_core::traits::{DestinationStore, SourceStore};
use embedfill_embed::EmbeddingClient;

use crate::dedup::DedupFilter;
use crate::fallback::FallbackExecutor;
use crate::scheduler::{plan, BatchScheduler, PageOutcome};
use crate::stats::{FinalReport, ProgressReporter, StatsTracker};
use crate::stop::StopSignal;
use crate::writer::ResultWriter;

#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Records the pass set out to walk (after the `max_records` cap).
    pub total: u64,
    pub pages_completed: u64,
    pub cancelled: bool,
    pub report: FinalReport,
}

pub struct Pipeline {
    source: Arc<dyn SourceStore>,
    scheduler: BatchScheduler,
    settings: PipelineSettings,
    store_policy: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn SourceStore>,
        dest: Arc<dyn DestinationStore>,
        client: Arc<EmbeddingClient>,
        settings: PipelineSettings,
        store_policy: RetryPolicy,
    ) -> Self {
        let scheduler = BatchScheduler::new(
            DedupFilter::new(source.clone(), store_policy),
            client.clone(),
            FallbackExecutor::new(client, settings.fallback_concurrency),
            ResultWriter::new(dest, store_policy),
            settings.embedding_type,
            settings.pacing_interval(),
        );
        Self { source, scheduler, settings, store_policy }
    }

    /// One pass over the source for the configured embedding type.
    ///
    /// `stats` is reset first. Store errors end the run; counters gathered so
    /// far stay in `stats`.
    pub async fn run(&self, stats: &StatsTracker, progress: &dyn ProgressReporter, stop: &StopSignal) -> Result<RunSummary> {
        stats.reset();
        let embedding_type = self.settings.embedding_type;
        let count = self
            .store_policy
            .execute(|| self.source.count_unembedded(embedding_type))
            .await
            .map_err(PipelineError::StoreRead)?;
        let total = self.settings.max_records.map_or(count, |cap| count.min(cap));
        progress.set_total(total);
        info!(total, %embedding_type, batch_size = self.settings.batch_size, "starting embedding pass");

        let page_size = self.settings.page_size.max(1) as u64;
        let mut offset = 0u64;
        let mut pages_completed = 0u64;
        let mut cancelled = false;
        while offset < total {
            if stop.is_stopped() {
                cancelled = true;
                break;
            }
            let limit = page_size.min(total - offset) as usize;
            let page = self
                .store_policy
                .execute(|| self.source.fetch_page(offset, limit))
                .await
                .map_err(PipelineError::StoreRead)?;
            if page.is_empty() {
                break;
            }
            let fetched = page.len() as u64;
            let jobs = plan(page, self.settings.batch_size);
            match self.scheduler.run_page(jobs, stats, progress, stop).await? {
                PageOutcome::Completed => pages_completed += 1,
                PageOutcome::Interrupted => {
                    cancelled = true;
                    break;
                }
            }
            offset += fetched;
        }
        progress.finish();

        if cancelled && pages_completed == 0 {
            return Err(PipelineError::Cancelled);
        }
        let report = stats.final_report();
        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped_existing,
            cancelled,
            "embedding pass finished"
        );
        Ok(RunSummary { total, pages_completed, cancelled, report })
    }
}
