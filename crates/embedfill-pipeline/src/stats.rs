//! Run counters, the final report, and progress display.

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Point-in-time copy of the run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Already embedded when their chunk came up; not part of `processed`.
    pub skipped_existing: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalReport {
    pub duration: Duration,
    /// Processed records per second.
    pub throughput: f64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped_existing: u64,
    pub failure_reasons: BTreeMap<String, u64>,
}

impl FinalReport {
    pub fn from_parts(duration: Duration, stats: PipelineStats, failure_reasons: BTreeMap<String, u64>) -> Self {
        let secs = duration.as_secs_f64();
        let throughput = if secs > 0.0 { stats.processed as f64 / secs } else { 0.0 };
        Self {
            duration,
            throughput,
            processed: stats.processed,
            succeeded: stats.succeeded,
            failed: stats.failed,
            skipped_existing: stats.skipped_existing,
            failure_reasons,
        }
    }
}

/// Monotonic counters written by the driver loop and readable from anywhere.
pub struct StatsTracker {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped_existing: AtomicU64,
    reasons: Mutex<BTreeMap<String, u64>>,
    clock: Mutex<(Instant, DateTime<Utc>)>,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped_existing: AtomicU64::new(0),
            reasons: Mutex::new(BTreeMap::new()),
            clock: Mutex::new((Instant::now(), Utc::now())),
        }
    }

    /// Zero every counter and restart the clock.
    pub fn reset(&self) {
        for counter in [&self.processed, &self.succeeded, &self.failed, &self.skipped_existing] {
            counter.store(0, Ordering::Relaxed);
        }
        self.reasons.lock().unwrap_or_else(PoisonError::into_inner).clear();
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner) = (Instant::now(), Utc::now());
    }

    fn started(&self) -> (Instant, DateTime<Utc>) {
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update(&self, processed: u64, succeeded: u64, failed: u64) {
        self.processed.fetch_add(processed, Ordering::Relaxed);
        self.succeeded.fetch_add(succeeded, Ordering::Relaxed);
        self.failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn record_failure(&self, reason: &str, n: u64) {
        if n == 0 {
            return;
        }
        let mut reasons = self.reasons.lock().unwrap_or_else(PoisonError::into_inner);
        *reasons.entry(reason.to_string()).or_insert(0) += n;
    }

    pub fn record_skipped(&self, n: u64) {
        self.skipped_existing.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped_existing: self.skipped_existing.load(Ordering::Relaxed),
            started_at: self.started().1,
        }
    }

    pub fn failure_reasons(&self) -> BTreeMap<String, u64> {
        self.reasons.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn final_report(&self) -> FinalReport {
        FinalReport::from_parts(self.started().0.elapsed(), self.snapshot(), self.failure_reasons())
    }
}

/// Display sink for run progress. Never mutates the counters.
pub trait ProgressReporter: Send + Sync {
    fn set_total(&self, total: u64);
    fn advance(&self, n: u64);
    fn finish(&self);
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn set_total(&self, _total: u64) {}
    fn advance(&self, _n: u64) {}
    fn finish(&self) {}
}

pub struct BarProgress {
    bar: ProgressBar,
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BarProgress {
    /// Draws on stdout; logs go to stderr.
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stdout());
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }
}

impl ProgressReporter for BarProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
    }

    fn advance(&self, n: u64) {
        self.bar.inc(n);
    }

    fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_is_zero_for_zero_duration() {
        let tracker = StatsTracker::new();
        tracker.update(10, 8, 2);
        let report = FinalReport::from_parts(Duration::ZERO, tracker.snapshot(), BTreeMap::new());
        assert_eq!(report.throughput, 0.0);

        let report = FinalReport::from_parts(Duration::from_secs(2), tracker.snapshot(), BTreeMap::new());
        assert_eq!(report.throughput, 5.0);
    }

    #[test]
    fn reasons_accumulate() {
        let tracker = StatsTracker::new();
        tracker.record_failure("empty text", 1);
        tracker.record_failure("empty text", 2);
        tracker.record_failure("provider error", 0);
        let reasons = tracker.failure_reasons();
        assert_eq!(reasons.get("empty text"), Some(&3));
        assert!(!reasons.contains_key("provider error"));
    }

    #[test]
    fn reset_clears_counters_and_reasons() {
        let tracker = StatsTracker::new();
        let first_start = tracker.snapshot().started_at;
        tracker.update(4, 3, 1);
        tracker.record_skipped(2);
        tracker.record_failure("provider error", 1);

        tracker.reset();

        let snap = tracker.snapshot();
        assert_eq!((snap.processed, snap.succeeded, snap.failed, snap.skipped_existing), (0, 0, 0, 0));
        assert!(snap.started_at >= first_start);
        assert!(tracker.failure_reasons().is_empty());
    }
}
