//! Resilient batch embedding pipeline.
//!
//! Pages through a [`SourceStore`](embedfill_core::traits::SourceStore),
//! drops records that are already embedded, sends the rest to the provider in
//! chunks, falls back to single-item calls when a chunk fails, and writes the
//! results exactly once per `(record, embedding_type)`.

pub mod dedup;
pub mod fallback;
pub mod pipeline;
pub mod scheduler;
pub mod stats;
pub mod stop;
pub mod writer;

pub use dedup::DedupFilter;
pub use fallback::FallbackExecutor;
pub use pipeline::{Pipeline, RunSummary};
pub use scheduler::{plan, BatchScheduler, PageOutcome};
pub use stats::{BarProgress, FinalReport, NoProgress, PipelineStats, ProgressReporter, StatsTracker};
pub use stop::StopSignal;
pub use writer::ResultWriter;
