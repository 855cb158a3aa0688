use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use embedfill_core::config::EmbeddingConfig;
use embedfill_core::error::ProviderError;
use embedfill_core::traits::EmbeddingProvider;
use embedfill_embed::OpenAiProvider;

async fn provider_for(server: &MockServer) -> OpenAiProvider {
    let cfg = EmbeddingConfig { base_url: format!("{}/v1", server.uri()), dimensions: 3, ..Default::default() };
    OpenAiProvider::new("sk-test", &cfg).expect("provider")
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn request_carries_model_and_dimensions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": ["hello"],
            "dimensions": 3
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "index": 0, "embedding": [0.1, 0.2, 0.3] }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let out = provider_for(&server).await.embed_batch(&texts(&["hello"])).await.expect("embed");

    assert_eq!(out, vec![vec![0.1, 0.2, 0.3]]);
}

#[tokio::test]
async fn results_follow_input_order_not_response_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "index": 2, "embedding": [2.0, 2.0, 2.0] },
                { "index": 0, "embedding": [0.0, 0.0, 0.0] },
                { "index": 1, "embedding": [1.0, 1.0, 1.0] }
            ]
        })))
        .mount(&server)
        .await;

    let out = provider_for(&server).await.embed_batch(&texts(&["a", "b", "c"])).await.expect("embed");

    let firsts: Vec<f32> = out.iter().map(|v| v[0]).collect();
    assert_eq!(firsts, vec![0.0, 1.0, 2.0]);
}

#[tokio::test]
async fn error_status_keeps_code_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let err = provider_for(&server).await.embed_batch(&texts(&["a"])).await.expect_err("429");

    match err {
        ProviderError::Http { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unparseable_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": "list" })))
        .mount(&server)
        .await;

    let err = provider_for(&server).await.embed_batch(&texts(&["a"])).await.expect_err("no data field");

    assert!(matches!(err, ProviderError::Malformed(_)), "got {err}");
}

#[tokio::test]
async fn empty_input_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).expect(0).mount(&server).await;

    let out = provider_for(&server).await.embed_batch(&[]).await.expect("no call");

    assert!(out.is_empty());
}
