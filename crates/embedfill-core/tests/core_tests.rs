use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use figment::providers::{Format, Serialized, Toml};
use figment::Figment;

use embedfill_core::config::{AppConfig, Config};
use embedfill_core::retry::RetryPolicy;
use embedfill_core::types::{EmbeddingType, PersistOutcome, RecordId, SourceRecord};

#[tokio::test]
async fn retry_returns_first_success() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(3, Duration::ZERO, true);
    let out = policy
        .execute(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 { Err(format!("boom {n}")) } else { Ok(n) }
        })
        .await
        .expect("third attempt succeeds");
    assert_eq!(out, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_exhaustion_wraps_last_error() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(3, Duration::ZERO, false);
    let err = policy
        .execute(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(format!("failure {n}"))
        })
        .await
        .expect_err("never succeeds");
    assert_eq!(err.attempts, 3);
    assert_eq!(err.last, "failure 2");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn retry_sleeps_with_exponential_backoff() {
    let policy = RetryPolicy::new(3, Duration::from_secs(1), true);
    let started = tokio::time::Instant::now();
    let _ = policy.execute(|| async { Err::<(), _>("down") }).await;
    // 1s after the first failure, 2s after the second, none after the last.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
}

#[test]
fn embedding_type_parses_and_displays() {
    assert_eq!("combined".parse::<EmbeddingType>().unwrap(), EmbeddingType::Combined);
    assert_eq!(" Title ".parse::<EmbeddingType>().unwrap(), EmbeddingType::Title);
    assert!("clustering".parse::<EmbeddingType>().is_err());
    assert_eq!(EmbeddingType::Content.to_string(), "content");
}

#[test]
fn blank_records_are_detected() {
    assert!(SourceRecord::new("1", "").is_blank());
    assert!(SourceRecord::new("2", " \n\t ").is_blank());
    assert!(!SourceRecord::new("3", " a ").is_blank());
}

#[test]
fn persist_outcome_total_counts_every_record() {
    let outcome = PersistOutcome { written_count: 2, already_present: 1, failed_ids: vec![RecordId::from("x")] };
    assert_eq!(outcome.total(), 4);
}

#[test]
fn defaults_follow_documented_values() {
    let app = Config::from_figment(Figment::from(Serialized::defaults(AppConfig::default())))
        .app()
        .expect("defaults are valid");
    assert_eq!(app.pipeline.batch_size, 100);
    assert_eq!(app.pipeline.pacing_interval(), Duration::from_millis(500));
    assert_eq!(app.embedding.dimensions, 1536);
    assert_eq!(app.embedding.retry_policy().max_retries(), 3);
    assert_eq!(app.store.retry_policy().max_retries(), 2);
}

#[test]
fn toml_overrides_are_merged() {
    let toml = r#"
        [pipeline]
        batch_size = 25
        embedding_type = "title"
        max_records = 500

        [embedding]
        retry_delay_secs = 0.25
    "#;
    let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(toml));
    let app = Config::from_figment(figment).app().expect("valid config");
    assert_eq!(app.pipeline.batch_size, 25);
    assert_eq!(app.pipeline.embedding_type, EmbeddingType::Title);
    assert_eq!(app.pipeline.max_records, Some(500));
    assert_eq!(app.embedding.retry_policy().base_delay(), Duration::from_millis(250));
    // untouched sections keep their defaults
    assert_eq!(app.store.records_table, "records");
}

#[test]
fn zero_batch_size_is_rejected() {
    let figment = Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(Toml::string("[pipeline]\nbatch_size = 0\n"));
    let err = Config::from_figment(figment).app().expect_err("invalid");
    assert!(err.to_string().contains("batch_size"));
}
