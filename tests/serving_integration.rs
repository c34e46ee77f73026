//! Integration tests for the HTTP scoring endpoint, exercised through
//! `ScoringClient` against a real server on an ephemeral port.

#[allow(dead_code)]
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::test_artifact;
use conforma::client::ScoringClient;
use conforma::error::ConformaError;
use conforma::inference::{InferenceConfig, InferenceEngine};
use conforma::registry::{ModelRegistry, RegistryConfig};
use conforma::serving::{HealthStatus, ModelServer, ServingConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Brings up a server with one deployed model on an ephemeral port.
async fn launch(config: ServingConfig) -> (std::net::SocketAddr, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(
        ModelRegistry::open(RegistryConfig {
            root: dir.path().join("registry"),
            ..RegistryConfig::default()
        })
        .unwrap(),
    );

    let artifact = test_artifact("component-clf", 10, 21);
    registry.register(&artifact).await.unwrap();
    registry.deploy("component-clf", 1).await.unwrap();

    let engine = Arc::new(InferenceEngine::new(InferenceConfig::default()));
    let server = Arc::new(ModelServer::new(config, registry, engine));
    assert_eq!(server.load_deployed().await.unwrap(), 1);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    (addr, dir)
}

/// Launches with defaults and returns a client for the endpoint.
async fn start_server() -> (ScoringClient, tempfile::TempDir) {
    let (addr, dir) = launch(ServingConfig::default()).await;
    let client = ScoringClient::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();
    (client, dir)
}

#[tokio::test]
async fn test_health_reports_loaded_model() {
    let (client, _dir) = start_server().await;
    let health = client.health().await.unwrap();
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.models_loaded, 1);
}

#[tokio::test]
async fn test_score_wire_contract() {
    let (client, _dir) = start_server().await;

    // Token ids carried as floats, exactly seq_len of them.
    let data = vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
    let reply = client.score("component-clf", &data).await.unwrap();
    assert_eq!(reply.model, "component-clf");
    assert_eq!(reply.version, 1);
    assert!((0.0..=1.0).contains(&reply.probability));

    // Same padded sequence scores identically.
    let again = client.score("component-clf", &data).await.unwrap();
    assert_eq!(again.probability, reply.probability);
}

#[tokio::test]
async fn test_score_text_route() {
    let (client, _dir) = start_server().await;
    let reply = client
        .score_text("component-clf", "brake hose weld untested")
        .await
        .unwrap();
    assert_eq!(reply.model, "component-clf");
    assert!((0.0..=1.0).contains(&reply.probability));
}

#[tokio::test]
async fn test_unknown_model_maps_to_not_found() {
    let (client, _dir) = start_server().await;
    let err = client.score("ghost", &[0.0; 10]).await.unwrap_err();
    assert!(matches!(err, ConformaError::NotFound(_)));
}

#[tokio::test]
async fn test_wrong_input_length_maps_to_invalid_input() {
    let (client, _dir) = start_server().await;
    let err = client
        .score("component-clf", &[1.0, 2.0])
        .await
        .unwrap_err();
    match err {
        ConformaError::InvalidInput(detail) => {
            assert!(detail.contains("expected 10"), "detail: {detail}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_stalled_request_body_gets_gateway_timeout() {
    let (addr, _dir) = launch(ServingConfig {
        request_timeout_ms: 200,
        ..ServingConfig::default()
    })
    .await;

    // Send the head of a scoring request and then stall: the promised body
    // never arrives, so the server has to cut the request off on its own.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let head = format!(
        "POST /v1/models/component-clf/score HTTP/1.1\r\n\
         host: {addr}\r\n\
         content-type: application/json\r\n\
         content-length: 64\r\n\r\n"
    );
    stream.write_all(head.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let response = String::from_utf8_lossy(&raw);
    assert!(
        response.starts_with("HTTP/1.1 504"),
        "response: {response}"
    );
}

#[tokio::test]
async fn test_models_listing_and_stats() {
    let (client, _dir) = start_server().await;

    let models = client.models().await.unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].key, "component-clf:v1");
    assert_eq!(models[0].seq_len, 10);

    client
        .score_text("component-clf", "seat anchor certified supplier batch")
        .await
        .unwrap();
    let stats = client.stats().await.unwrap();
    assert!(stats.server.requests >= 1);
    assert!(stats.engine.successful_requests >= 1);
    assert_eq!(stats.registry.models_deployed, 1);
}
