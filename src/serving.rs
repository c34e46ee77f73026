// HTTP scoring endpoint

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{DefaultBodyLimit, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::dataset::Label;
use crate::error::{ConformaError, Result};
use crate::inference::{
    EngineStatsSnapshot, InferenceConfig, InferenceEngine, LoadedSessionInfo, ScoreRequest,
    ScoreResponse,
};
use crate::registry::{ModelRegistry, RegistryConfig, RegistryStatsSnapshot};
use crate::session::InferenceSession;

/// Serving configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Maximum request body bytes
    pub max_body_bytes: usize,
    /// Whole-request deadline in milliseconds, including body transfer
    pub request_timeout_ms: u64,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_body_bytes: 1024 * 1024,
            request_timeout_ms: 10_000,
        }
    }
}

impl ServingConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerHealth {
    pub status: HealthStatus,
    pub models_loaded: usize,
    pub uptime_seconds: u64,
}

/// Server request counters
#[derive(Debug, Default)]
pub struct ServerStats {
    pub requests: AtomicU64,
    pub success: AtomicU64,
    pub failed: AtomicU64,
}

/// Server counters snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatsSnapshot {
    pub requests: u64,
    pub success: u64,
    pub failed: u64,
    pub uptime_seconds: u64,
}

/// Combined statistics surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReply {
    pub server: ServerStatsSnapshot,
    pub engine: EngineStatsSnapshot,
    pub registry: RegistryStatsSnapshot,
}

/// Score request body: the padded token sequence, ids as floats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBody {
    pub data: Vec<f32>,
}

/// Text score request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreTextBody {
    pub text: String,
}

/// Score reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreReply {
    pub request_id: String,
    pub model: String,
    pub version: u32,
    pub probability: f32,
    pub label: Label,
    pub inference_time_us: u64,
}

impl From<ScoreResponse> for ScoreReply {
    fn from(r: ScoreResponse) -> Self {
        Self {
            request_id: r.request_id,
            model: r.model,
            version: r.version,
            probability: r.probability,
            label: r.label,
            inference_time_us: r.inference_time_us,
        }
    }
}

/// JSON error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub retryable: bool,
}

// Wraps ConformaError for axum's response conversion.
struct ApiError(ConformaError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.to_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

/// Scoring server exposing deployed registry models.
pub struct ModelServer {
    config: ServingConfig,
    registry: Arc<ModelRegistry>,
    engine: Arc<InferenceEngine>,
    stats: Arc<ServerStats>,
    started_at: Instant,
}

impl ModelServer {
    pub fn new(
        config: ServingConfig,
        registry: Arc<ModelRegistry>,
        engine: Arc<InferenceEngine>,
    ) -> Self {
        Self {
            config,
            registry,
            engine,
            stats: Arc::new(ServerStats::default()),
            started_at: Instant::now(),
        }
    }

    pub fn engine(&self) -> &Arc<InferenceEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Loads every deployed registry version into the engine. Returns the
    /// number of sessions brought up.
    pub async fn load_deployed(&self) -> Result<usize> {
        let deployed = self.registry.list_deployed().await;
        let mut loaded = 0usize;
        for (name, mv) in deployed {
            let artifact = self.registry.load_artifact(&name, Some(mv.version)).await?;
            let session = InferenceSession::from_artifact(&artifact)?;
            self.engine.load(session, mv.version).await?;
            loaded += 1;
        }
        info!(loaded, "loaded deployed models");
        Ok(loaded)
    }

    pub async fn health(&self) -> ServerHealth {
        let models_loaded = self.engine.list_loaded().await.len();
        let status = if models_loaded > 0 {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        ServerHealth {
            status,
            models_loaded,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/healthz", get(health))
            .route("/v1/models", get(list_models))
            .route("/v1/stats", get(stats))
            .route("/v1/models/:name/score", post(score))
            .route("/v1/models/:name/score/text", post(score_text))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(middleware::from_fn_with_state(
                Arc::clone(self),
                request_timeout,
            ))
            .with_state(Arc::clone(self))
    }

    /// Serves on an already-bound listener until ctrl-c.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "scoring endpoint listening");
        }
        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ConformaError::Network(e.to_string()))
    }

    /// Binds the configured address and serves.
    pub async fn bind_and_serve(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.config.addr())
            .await
            .map_err(|e| ConformaError::Network(format!("bind {}: {}", self.config.addr(), e)))?;
        self.serve(listener).await
    }
}

/// Opens the registry, loads deployed models, and serves until shutdown.
pub async fn run_server(
    serving: ServingConfig,
    registry_config: RegistryConfig,
    inference_config: InferenceConfig,
) -> Result<()> {
    let registry = Arc::new(ModelRegistry::open(registry_config)?);
    let engine = Arc::new(InferenceEngine::new(inference_config));
    let server = Arc::new(ModelServer::new(serving, registry, engine));
    let loaded = server.load_deployed().await?;
    if loaded == 0 {
        warn!("no deployed models; scoring routes will return 404");
    }
    server.bind_and_serve().await
}

/// Bounds the whole request, body transfer included, so a stalled client
/// cannot hold a connection past the configured deadline.
async fn request_timeout(
    State(server): State<Arc<ModelServer>>,
    request: Request,
    next: Next,
) -> Response {
    let limit_ms = server.config.request_timeout_ms;
    match tokio::time::timeout(Duration::from_millis(limit_ms), next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            server.stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(limit_ms, "request exceeded deadline");
            ApiError(ConformaError::Timeout(limit_ms)).into_response()
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to install shutdown handler"),
    }
}

async fn health(State(server): State<Arc<ModelServer>>) -> Response {
    let health = server.health().await;
    (health.status.to_status_code(), Json(health)).into_response()
}

async fn list_models(State(server): State<Arc<ModelServer>>) -> Json<Vec<LoadedSessionInfo>> {
    Json(server.engine.list_loaded().await)
}

async fn stats(State(server): State<Arc<ModelServer>>) -> Json<StatsReply> {
    Json(StatsReply {
        server: ServerStatsSnapshot {
            requests: server.stats.requests.load(Ordering::Relaxed),
            success: server.stats.success.load(Ordering::Relaxed),
            failed: server.stats.failed.load(Ordering::Relaxed),
            uptime_seconds: server.started_at.elapsed().as_secs(),
        },
        engine: server.engine.stats(),
        registry: server.registry.stats(),
    })
}

async fn score(
    State(server): State<Arc<ModelServer>>,
    Path(name): Path<String>,
    Json(body): Json<ScoreBody>,
) -> std::result::Result<Json<ScoreReply>, ApiError> {
    server.stats.requests.fetch_add(1, Ordering::Relaxed);
    let request = ScoreRequest::new(&name).with_data(body.data);
    match server.engine.score(request).await {
        Ok(response) => {
            server.stats.success.fetch_add(1, Ordering::Relaxed);
            Ok(Json(response.into()))
        }
        Err(e) => {
            server.stats.failed.fetch_add(1, Ordering::Relaxed);
            Err(ApiError(e))
        }
    }
}

async fn score_text(
    State(server): State<Arc<ModelServer>>,
    Path(name): Path<String>,
    Json(body): Json<ScoreTextBody>,
) -> std::result::Result<Json<ScoreReply>, ApiError> {
    server.stats.requests.fetch_add(1, Ordering::Relaxed);
    match server.engine.score_text(&name, None, &body.text).await {
        Ok(response) => {
            server.stats.success.fetch_add(1, Ordering::Relaxed);
            Ok(Json(response.into()))
        }
        Err(e) => {
            server.stats.failed.fetch_add(1, Ordering::Relaxed);
            Err(ApiError(e))
        }
    }
}
