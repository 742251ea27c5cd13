#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Pipeline tests against a mocked Ollama server
// Run with: cargo test --test integration_ollama

use datasanity::actions::{Action, ActionRequest};
use datasanity::artifacts::ArtifactStore;
use datasanity::commands::{build_encoder, build_runner, search_artifacts};
use datasanity::config::{Config, EncoderBackend};
use datasanity::dataset::Dataset;
use datasanity::pipeline::{Annotation, FailureKind, Stage};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const EMBED_MODEL: &str = "embed-model";
const CHAT_MODEL: &str = "chat-model";

const PEOPLE_CSV: &str = "\
Name,Age,City
Ada Lovelace,36,London
Alan Turing,41,Wilmslow
Grace Hopper,85,New York
";

/// Answers `/api/embed` with one small deterministic vector per input
struct EchoEmbeddings;

fn vector_for(text: &str) -> Vec<f32> {
    let count = |target: char| text.chars().filter(|&c| c == target).count() as f32;
    vec![text.len() as f32, count('a'), count('e'), count(' ')]
}

impl Respond for EchoEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).unwrap_or(serde_json::Value::Null);
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .map(|input| vector_for(input.as_str().unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn config_for(server: &MockServer, base: &std::path::Path) -> Config {
    let mut config = Config::with_base_dir(base);
    config.ollama.protocol = "http".to_string();
    config.ollama.host = "127.0.0.1".to_string();
    config.ollama.port = server.address().port();
    config.ollama.model = EMBED_MODEL.to_string();
    config.ollama.batch_size = 2;
    config.encoder.backend = EncoderBackend::Ollama;
    config.generation.enabled = true;
    config.generation.model = CHAT_MODEL.to_string();
    config.generation.timeout_secs = 5;
    config
}

async fn mount_tags(server: &MockServer, models: &[&str]) {
    let models: Vec<serde_json::Value> = models.iter().map(|name| json!({ "name": name })).collect();
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": models })))
        .mount(server)
        .await;
}

async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EchoEmbeddings)
        .mount(server)
        .await;
}

async fn mount_generate(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(template)
        .mount(server)
        .await;
}

fn people() -> Dataset {
    Dataset::from_csv_reader(PEOPLE_CSV.as_bytes()).expect("dataset should parse")
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_with_summary_then_search() {
    init_test_tracing();
    let server = MockServer::start().await;
    mount_tags(&server, &["embed-model:latest", "chat-model:latest"]).await;
    mount_embeddings(&server).await;
    mount_generate(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({ "response": "Three people and the cities they lived in." })),
    )
    .await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&server, temp_dir.path());
    let runner = build_runner(&config).expect("runner should build");
    let dataset = people();

    let results = runner
        .run(
            &[Action::Embed],
            Some(&dataset),
            &ActionRequest::new("index the people"),
        )
        .await;

    let report = results.embedding_report.expect("embed should report");
    assert!(report.is_success(), "{report}");
    assert_eq!(report.model, EMBED_MODEL);
    assert_eq!(report.records, 3);
    assert_eq!(
        report.embedding.as_ref().map(|summary| summary.dimension),
        Some(4)
    );
    assert_eq!(
        report.annotation,
        Annotation::Provided("Three people and the cities they lived in.".to_string())
    );
    assert!(
        results
            .vectorized_data
            .expect("vectorized text")
            .contains("Vectorization summary:\nThree people and the cities they lived in.")
    );

    let encoder = build_encoder(&config).expect("encoder should build");
    let store = ArtifactStore::new(config.artifacts_dir());
    let hits = search_artifacts(encoder.as_ref(), &store, "Grace Hopper New York", 2)
        .await
        .expect("search should succeed");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].text, "Grace Hopper New York");
    assert_eq!(hits[0].distance, 0.0);
    assert_eq!(hits[0].slot, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_summary_still_commits_index() {
    let server = MockServer::start().await;
    mount_tags(&server, &["embed-model:latest"]).await;
    mount_embeddings(&server).await;
    mount_generate(&server, ResponseTemplate::new(404)).await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&server, temp_dir.path());
    let runner = build_runner(&config).expect("runner should build");
    let dataset = people();

    let results = runner
        .run(
            &[Action::Embed],
            Some(&dataset),
            &ActionRequest::new("index the people"),
        )
        .await;

    let report = results.embedding_report.expect("embed should report");
    assert!(report.is_success(), "{report}");
    assert!(matches!(report.annotation, Annotation::Unavailable(_)));
    assert!(
        results
            .vectorized_data
            .expect("vectorized text")
            .contains("Note: summary unavailable")
    );

    let loaded = ArtifactStore::new(config.artifacts_dir())
        .load()
        .expect("artifacts should load");
    assert_eq!(loaded.index.len(), 3);
    assert_eq!(loaded.index.dimension(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_embedding_model_writes_nothing() {
    let server = MockServer::start().await;
    mount_tags(&server, &["some-other-model:latest"]).await;
    mount_embeddings(&server).await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = config_for(&server, temp_dir.path());
    config.generation.enabled = false;
    let runner = build_runner(&config).expect("runner should build");
    let dataset = people();

    let results = runner
        .run(
            &[Action::Embed],
            Some(&dataset),
            &ActionRequest::new("index the people"),
        )
        .await;

    let report = results.embedding_report.expect("embed should report");
    assert!(!report.is_success());
    assert_eq!(report.failure_kind(), Some(FailureKind::EncoderUnavailable));
    assert_eq!(report.failed_stage(), Some(Stage::Encoding));

    let current = ArtifactStore::new(config.artifacts_dir())
        .current()
        .expect("pointer should be readable");
    assert!(current.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_action_uses_fenced_reply() {
    let server = MockServer::start().await;
    mount_generate(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "response": "Here you go:\n```csv\nName,Age\nMarie Curie,66\n```\nEnjoy."
        })),
    )
    .await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = config_for(&server, temp_dir.path());
    config.encoder.backend = EncoderBackend::Hashing;
    let runner = build_runner(&config).expect("runner should build");

    let results = runner
        .run(
            &[Action::Generate],
            None,
            &ActionRequest::new("scientists").with_count(1),
        )
        .await;

    let generated = results.generated_data.expect("generate should report");
    assert!(generated.starts_with("Data generation completed:\n"));
    assert!(generated.contains("- Requested examples: 1"));
    assert!(generated.ends_with("Generated data:\nName,Age\nMarie Curie,66"));
}
