use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use embedfill_core::error::{EmbedError, ProviderError};
use embedfill_core::retry::RetryPolicy;
use embedfill_core::traits::EmbeddingProvider;
use embedfill_embed::{EmbeddingClient, FakeEmbedder};

/// Fails the first `failures` calls, then answers like the fake embedder.
struct FlakyProvider {
    inner: FakeEmbedder,
    failures: usize,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<String>>>,
}

impl FlakyProvider {
    fn new(failures: usize) -> Self {
        Self { inner: FakeEmbedder::new(16), failures, calls: AtomicUsize::new(0), seen: Mutex::new(Vec::new()) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyProvider {
    fn embedder_id(&self) -> &str {
        "flaky"
    }

    fn dim(&self) -> usize {
        16
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.seen.lock().unwrap().push(texts.to_vec());
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(ProviderError::Http { status: 503, body: "overloaded".to_string() });
        }
        self.inner.embed_batch(texts).await
    }
}

struct SlowProvider;

#[async_trait]
impl EmbeddingProvider for SlowProvider {
    fn embedder_id(&self) -> &str {
        "slow"
    }

    fn dim(&self) -> usize {
        4
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
    }
}

struct WrongDimProvider;

#[async_trait]
impl EmbeddingProvider for WrongDimProvider {
    fn embedder_id(&self) -> &str {
        "wrong-dim"
    }

    fn dim(&self) -> usize {
        8
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|_| vec![1.0; 3]).collect())
    }
}

fn quick(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::ZERO, true)
}

#[tokio::test]
async fn batch_filters_blank_entries_and_keeps_positions() {
    let provider = Arc::new(FlakyProvider::new(0));
    let client = EmbeddingClient::new(provider.clone(), quick(3));
    let texts = vec!["a".to_string(), "".to_string(), "  ".to_string(), "b".to_string()];

    let out = client.generate_batch(&texts).await.expect("batch");

    assert_eq!(out.len(), 4);
    assert!(out[0].is_some());
    assert!(out[1].is_none());
    assert!(out[2].is_none());
    assert!(out[3].is_some());
    let seen = provider.seen.lock().unwrap().clone();
    assert_eq!(seen, vec![vec!["a".to_string(), "b".to_string()]], "blank strings never reach the provider");
}

#[tokio::test]
async fn all_blank_batch_makes_no_call() {
    let provider = Arc::new(FlakyProvider::new(0));
    let client = EmbeddingClient::new(provider.clone(), quick(3));

    let out = client.generate_batch(&["".to_string(), " ".to_string()]).await.expect("batch");

    assert_eq!(out, vec![None, None]);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn single_blank_is_rejected_without_retry() {
    let provider = Arc::new(FlakyProvider::new(0));
    let client = EmbeddingClient::new(provider.clone(), quick(3));

    let err = client.generate_one("   ").await.expect_err("blank input");

    assert!(matches!(err, EmbedError::InvalidInput));
    assert_eq!(err.reason(), "empty text");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let provider = Arc::new(FlakyProvider::new(2));
    let client = EmbeddingClient::new(provider.clone(), quick(3));

    let v = client.generate_one("hello world").await.expect("third attempt succeeds");

    assert_eq!(v.dim(), 16);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn batch_exhaustion_is_returned_not_recovered() {
    let provider = Arc::new(FlakyProvider::new(usize::MAX));
    let client = EmbeddingClient::new(provider.clone(), quick(3));

    let err = client.generate_batch(&["a".to_string(), "b".to_string()]).await.expect_err("always fails");

    match err {
        EmbedError::Provider(exhausted) => {
            assert_eq!(exhausted.attempts, 3);
            assert!(matches!(exhausted.last, ProviderError::Http { status: 503, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    // one batched call per attempt, never split into single calls
    assert_eq!(provider.calls(), 3);
    assert!(provider.seen.lock().unwrap().iter().all(|call| call.len() == 2));
}

#[tokio::test]
async fn timeout_counts_as_a_retryable_failure() {
    let client = EmbeddingClient::new(Arc::new(SlowProvider), quick(2)).with_request_timeout(Duration::from_millis(20));

    let err = client.generate_one("late").await.expect_err("times out");

    match err {
        EmbedError::Provider(exhausted) => {
            assert_eq!(exhausted.attempts, 2);
            assert!(matches!(exhausted.last, ProviderError::Timeout(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn wrong_dimensionality_is_a_provider_failure() {
    let client = EmbeddingClient::new(Arc::new(WrongDimProvider), quick(1));

    let err = client.generate_batch(&["x".to_string()]).await.expect_err("dim mismatch");

    assert!(matches!(err, EmbedError::Provider(ref e) if matches!(e.last, ProviderError::Malformed(_))));
}

#[tokio::test]
async fn long_texts_are_truncated_before_sending() {
    let provider = Arc::new(FlakyProvider::new(0));
    let client = EmbeddingClient::new(provider.clone(), quick(1)).with_max_text_chars(5);

    client.generate_one("  abcdefghij  ").await.expect("embed");

    assert_eq!(provider.seen.lock().unwrap()[0], vec!["abcde".to_string()]);
}

#[tokio::test]
async fn fake_embedder_shapes_and_determinism() {
    let embedder = FakeEmbedder::new(1024);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).await.expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 1024, "embedding dim is 1024");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}
