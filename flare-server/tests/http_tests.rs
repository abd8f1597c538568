//! HTTP contract tests against a router served on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flare_rag::{
    EmbeddingProvider, GenerationClient, GenerationConfig, InMemoryVectorStore, RagConfig,
    RagError, RagPipeline, Result, RetryPolicy, SamplingParams, TextGenerator,
};
use flare_server::{AppState, app_router};
use reqwest::StatusCode;
use serde_json::{Value, json};

/// Maps a few known sentences onto axis vectors; everything else lands on
/// the third axis.
struct AxisEmbedder;

#[async_trait]
impl EmbeddingProvider for AxisEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput("text must not be empty".into()));
        }
        Ok(match text {
            "A cat sat." => vec![1.0, 0.0, 0.0, 0.0],
            "A dog ran." => vec![0.0, 1.0, 0.0, 0.0],
            _ => vec![0.0, 0.0, 1.0, 0.0],
        })
    }

    fn dimensions(&self) -> usize {
        4
    }
}

struct CannedGenerator;

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    async fn complete(&self, prompt: &str, _sampling: &SamplingParams) -> Result<String> {
        Ok(format!("{prompt} A cat."))
    }
}

const MAX_UPLOAD: usize = 64 * 1024;

async fn pipeline(with_generation: bool) -> Arc<RagPipeline> {
    pipeline_with_floor(with_generation, None).await
}

async fn pipeline_with_floor(with_generation: bool, floor: Option<f32>) -> Arc<RagPipeline> {
    let config = RagConfig::builder()
        .chunk_size(200)
        .chunk_overlap(0)
        .vector_size(4)
        .score_threshold(floor)
        .build()
        .unwrap();
    let mut builder = RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(AxisEmbedder))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .retry_policy(RetryPolicy::none());
    if with_generation {
        let client = GenerationClient::new(
            Arc::new(CannedGenerator),
            GenerationConfig { retry_delay: Duration::ZERO, ..GenerationConfig::default() },
        );
        client.initialize().await.unwrap();
        builder = builder.generation(Arc::new(client));
    }
    Arc::new(builder.build().unwrap())
}

async fn spawn_server(pipeline: Arc<RagPipeline>) -> (String, tokio::task::JoinHandle<()>) {
    let app = app_router(AppState::new(pipeline), MAX_UPLOAD);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    (format!("http://{}", addr), handle)
}

async fn seed(client: &reqwest::Client, base: &str) {
    let create = client
        .post(format!("{base}/collection/create"))
        .json(&json!({"collection_name": "animals"}))
        .send()
        .await
        .expect("create response");
    assert_eq!(create.status(), StatusCode::CREATED);

    for (chunk, kind) in [("A cat sat.", "feline"), ("A dog ran.", "canine")] {
        let add = client
            .post(format!("{base}/add"))
            .json(&json!({
                "collection_name": "animals",
                "chunk": chunk,
                "payloads": [{"kind": kind, "source": "first"}, {"source": "zoo"}]
            }))
            .send()
            .await
            .expect("add response");
        assert!(add.status().is_success());
        let body: Value = add.json().await.expect("add json");
        assert_eq!(body["message"], "Vectors added successfully");
        assert!(body["id"].as_str().is_some_and(|id| !id.is_empty()));
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let (base, handle) = spawn_server(pipeline(false).await).await;

    let body: Value = reqwest::get(format!("{base}/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");

    handle.abort();
}

#[tokio::test]
async fn add_then_search_returns_stored_chunk_first() {
    let (base, handle) = spawn_server(pipeline(false).await).await;
    let client = reqwest::Client::new();
    seed(&client, &base).await;

    let response = client
        .post(format!("{base}/search"))
        .json(&json!({"collection_name": "animals", "query": "A cat sat.", "limit": 2}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let results: Vec<Value> = response.json().await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["payload"]["text"], "A cat sat.");
    assert_eq!(results[0]["payload"]["source"], "zoo");
    assert_eq!(results[0]["payload"]["kind"], "feline");
    assert!((results[0]["score"].as_f64().unwrap() - 1.0).abs() < 1e-4);

    handle.abort();
}

#[tokio::test]
async fn null_threshold_lifts_configured_floor() {
    let (base, handle) = spawn_server(pipeline_with_floor(false, Some(0.5)).await).await;
    let client = reqwest::Client::new();
    seed(&client, &base).await;

    let search = |body: Value| {
        let client = client.clone();
        let url = format!("{base}/search");
        async move {
            let results: Vec<Value> =
                client.post(url).json(&body).send().await.unwrap().json().await.unwrap();
            results
        }
    };

    let floored = search(json!({"collection_name": "animals", "query": "A cat sat."})).await;
    assert_eq!(floored.len(), 1);

    let unfloored = search(json!({
        "collection_name": "animals",
        "query": "A cat sat.",
        "score_threshold": null
    }))
    .await;
    assert_eq!(unfloored.len(), 2);

    handle.abort();
}

#[tokio::test]
async fn search_filters_apply_combinator() {
    let (base, handle) = spawn_server(pipeline(false).await).await;
    let client = reqwest::Client::new();
    seed(&client, &base).await;

    let results: Vec<Value> = client
        .post(format!("{base}/search"))
        .json(&json!({
            "collection_name": "animals",
            "query": "A cat sat.",
            "payload_filter": {"kind": "feline"},
            "filter_type": "must_not"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["payload"]["kind"], "canine");

    let bad = client
        .post(format!("{base}/search"))
        .json(&json!({
            "collection_name": "animals",
            "query": "A cat sat.",
            "filter_conditions": [{"key": "kind", "match": "feline"}],
            "filter_type": "xor"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    let body: Value = bad.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("xor"));

    handle.abort();
}

#[tokio::test]
async fn collection_lifecycle() {
    let (base, handle) = spawn_server(pipeline(false).await).await;
    let client = reqwest::Client::new();
    seed(&client, &base).await;

    let listed: Value =
        client.get(format!("{base}/collections")).send().await.unwrap().json().await.unwrap();
    assert_eq!(listed["collections"], json!(["animals"]));

    let info: Value = client
        .get(format!("{base}/collection/animals/info"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["vector_size"], 4);
    assert_eq!(info["points_count"], 2);

    let patched = client
        .patch(format!("{base}/collection/animals"))
        .json(&json!({"indexing_threshold": 0}))
        .send()
        .await
        .unwrap();
    assert!(patched.status().is_success());

    let managed: Value = client
        .post(format!("{base}/collection/animals/manage"))
        .json(&json!({"action": "get_info"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(managed["action"], "info");
    assert_eq!(managed["settings"]["indexing_threshold"], 0);

    let unknown = client
        .post(format!("{base}/collection/animals/manage"))
        .json(&json!({"action": "truncate"}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let deleted = client.delete(format!("{base}/collection/animals")).send().await.unwrap();
    assert!(deleted.status().is_success());

    let missing = client.get(format!("{base}/collection/animals/info")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    handle.abort();
}

#[tokio::test]
async fn create_rejects_unknown_distance() {
    let (base, handle) = spawn_server(pipeline(false).await).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/collection/create"))
        .json(&json!({"collection_name": "x", "distance": "manhattan"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    handle.abort();
}

#[tokio::test]
async fn search_on_missing_collection_is_not_found() {
    let (base, handle) = spawn_server(pipeline(false).await).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/search"))
        .json(&json!({"collection_name": "nowhere", "query": "A cat sat."}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    handle.abort();
}

#[tokio::test]
async fn upload_chunks_and_ingests_text() {
    let (base, handle) = spawn_server(pipeline(false).await).await;
    let client = reqwest::Client::new();
    seed(&client, &base).await;

    let response = client
        .post(format!("{base}/upload?collection=animals&filename=notes.txt"))
        .body("Birds fly south in winter. Fish swim upstream in spring.")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["point_ids"].as_array().unwrap().len(), 1);
    assert!(report["encoding"].is_string());

    let results: Vec<Value> = client
        .post(format!("{base}/search"))
        .json(&json!({
            "collection_name": "animals",
            "query": "migration",
            "payload_filter": {"source": "notes.txt"}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0]["payload"]["text"].as_str().unwrap().starts_with("Birds fly"));

    handle.abort();
}

#[tokio::test]
async fn upload_rejects_unknown_format_and_oversized_bodies() {
    let (base, handle) = spawn_server(pipeline(false).await).await;
    let client = reqwest::Client::new();
    seed(&client, &base).await;

    let unsupported = client
        .post(format!("{base}/upload?collection=animals&filename=slides.pptx"))
        .body("irrelevant")
        .send()
        .await
        .unwrap();
    assert_eq!(unsupported.status(), StatusCode::BAD_REQUEST);

    let oversized = client
        .post(format!("{base}/upload?collection=animals"))
        .body("x".repeat(MAX_UPLOAD + 1))
        .send()
        .await
        .unwrap();
    assert_eq!(oversized.status(), StatusCode::PAYLOAD_TOO_LARGE);

    handle.abort();
}

#[tokio::test]
async fn query_returns_answer_with_context() {
    let (base, handle) = spawn_server(pipeline(true).await).await;
    let client = reqwest::Client::new();
    seed(&client, &base).await;

    let response = client
        .post(format!("{base}/query"))
        .json(&json!({
            "collection_name": "animals",
            "instruction": "Name the animal.",
            "query": "A cat sat.",
            "limit": 1
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["answer"], "A cat.");
    assert_eq!(body["context"].as_array().unwrap().len(), 1);
    assert_eq!(body["context"][0]["payload"]["text"], "A cat sat.");

    handle.abort();
}

#[tokio::test]
async fn query_without_generation_is_unavailable() {
    let (base, handle) = spawn_server(pipeline(false).await).await;
    let client = reqwest::Client::new();
    seed(&client, &base).await;

    let response = client
        .post(format!("{base}/query"))
        .json(&json!({"collection_name": "animals", "instruction": "i", "query": "A cat sat."}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    handle.abort();
}
