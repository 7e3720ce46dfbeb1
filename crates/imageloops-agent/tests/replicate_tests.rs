use std::sync::Arc;
use std::time::Duration;

use imageloops_agent::{
    CritiqueError, GenerationError, ImageArtifact, ImageCritic, ImageProducer, ModelRef,
    ReplicateClient, ReplicateConfig, ReplicateCritic, ReplicateError, ReplicateProducer,
};
use imageloops_critic::{CritiqueParser, ScoreRange};
use imageloops_storage::{ArtifactStore, FsArtifactStore};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

fn client(server: &MockServer) -> Arc<ReplicateClient> {
    let config = ReplicateConfig::default()
        .with_base_url(server.uri())
        .with_poll_interval(Duration::from_millis(10))
        .with_max_wait(Duration::from_secs(5));
    Arc::new(ReplicateClient::new(TOKEN, config).unwrap())
}

fn producer(server: &MockServer, dir: &TempDir) -> ReplicateProducer {
    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir.path().to_path_buf()));
    ReplicateProducer::new(
        client(server),
        "stability-ai/sdxl:abc123".parse().unwrap(),
        store,
    )
}

fn critic(server: &MockServer) -> ReplicateCritic {
    ReplicateCritic::new(
        client(server),
        "yorickvp/llava-13b".parse::<ModelRef>().unwrap(),
        CritiqueParser::new(ScoreRange::default()),
    )
}

// ============================================================
// Producer
// ============================================================

#[tokio::test]
async fn test_producer_downloads_and_persists() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/predictions"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p1",
            "status": "succeeded",
            "output": [format!("{}/files/out-0.png", server.uri())]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/out-0.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fake-png".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let artifact = producer(&server, &dir)
        .generate("Heavy rain, low visibility, 40s")
        .await
        .unwrap();

    assert!(artifact.path.starts_with(dir.path()));
    assert!(artifact
        .path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("Heavy_rain_low_visibility_40s_"));
    assert_eq!(std::fs::read(&artifact.path).unwrap(), b"fake-png");
    assert_eq!(artifact.prompt, "Heavy rain, low visibility, 40s");
    assert_eq!(
        artifact.source_url,
        Some(format!("{}/files/out-0.png", server.uri()))
    );
}

#[tokio::test]
async fn test_producer_polls_until_succeeded() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p2",
            "status": "starting",
            "urls": { "get": format!("{}/predictions/p2", server.uri()) }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/predictions/p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "p2",
            "status": "succeeded",
            "output": [format!("{}/files/out.png", server.uri())]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/out.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"img".to_vec()))
        .mount(&server)
        .await;

    let artifact = producer(&server, &dir).generate("fog").await.unwrap();
    assert_eq!(std::fs::read(&artifact.path).unwrap(), b"img");
}

#[tokio::test]
async fn test_producer_empty_output_is_generation_failure() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p3",
            "status": "succeeded",
            "output": []
        })))
        .mount(&server)
        .await;

    let result = producer(&server, &dir).generate("fog").await;
    assert!(matches!(result, Err(GenerationError::EmptyOutput)));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_producer_failed_prediction() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p4",
            "status": "failed",
            "error": "NSFW content detected"
        })))
        .mount(&server)
        .await;

    let result = producer(&server, &dir).generate("fog").await;
    match result {
        Err(GenerationError::Service(ReplicateError::PredictionFailed { id, error, .. })) => {
            assert_eq!(id, "p4");
            assert_eq!(error, "NSFW content detected");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_producer_download_failure() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "p5",
            "status": "succeeded",
            "output": format!("{}/files/missing.png", server.uri())
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = producer(&server, &dir).generate("fog").await;
    assert!(matches!(
        result,
        Err(GenerationError::Service(ReplicateError::Status { status: 404, .. }))
    ));
}

#[tokio::test]
async fn test_unauthorized_is_reported() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/predictions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthenticated"))
        .mount(&server)
        .await;

    let result = producer(&server, &dir).generate("fog").await;
    match result {
        Err(GenerationError::Service(ReplicateError::Status { status, body })) => {
            assert_eq!(status, 401);
            assert_eq!(body, "Unauthenticated");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

// ============================================================
// Critic
// ============================================================

fn write_artifact(dir: &TempDir) -> ImageArtifact {
    let path = dir.path().join("rain_20240218200000.png");
    std::fs::write(&path, b"fake-png").unwrap();
    ImageArtifact::new(path, "Heavy rain")
}

#[tokio::test]
async fn test_critic_parses_streamed_output() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/models/yorickvp/llava-13b/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "c1",
            "status": "succeeded",
            "output": [
                "The image shows a dark street in heavy rain. ",
                "{content: 8, clarity: 7, ",
                "proportion: 6, color: 9}\n",
                "- Add a temperature readout\n",
                "- Reduce visibility with fog\n"
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let artifact = write_artifact(&dir);
    let critique = critic(&server).critique(&artifact, "Heavy rain").await.unwrap();

    assert!(critique.parsed);
    assert_eq!(critique.score("content"), Some(8.0));
    assert_eq!(critique.score("color"), Some(9.0));
    assert_eq!(critique.dimensions.len(), 4);
    assert_eq!(
        critique.suggestions,
        vec!["Add a temperature readout", "Reduce visibility with fog"]
    );
}

#[tokio::test]
async fn test_critic_unreadable_artifact_skips_service() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let artifact = ImageArtifact::new(dir.path().join("missing.png"), "Heavy rain");
    let result = critic(&server).critique(&artifact, "Heavy rain").await;

    assert!(matches!(
        result,
        Err(CritiqueError::UnreadableArtifact { .. })
    ));
}

#[tokio::test]
async fn test_critic_unparseable_output() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/models/yorickvp/llava-13b/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "c2",
            "status": "succeeded",
            "output": ["A picture of a street."]
        })))
        .mount(&server)
        .await;

    let artifact = write_artifact(&dir);
    let result = critic(&server).critique(&artifact, "Heavy rain").await;
    assert!(matches!(result, Err(CritiqueError::Parse(_))));
}

#[tokio::test]
async fn test_critic_empty_output() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/models/yorickvp/llava-13b/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "c3",
            "status": "succeeded",
            "output": null
        })))
        .mount(&server)
        .await;

    let artifact = write_artifact(&dir);
    let result = critic(&server).critique(&artifact, "Heavy rain").await;
    assert!(matches!(result, Err(CritiqueError::EmptyOutput)));
}
