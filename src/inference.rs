// Concurrent scoring engine

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info};

use crate::dataset::Label;
use crate::error::{ConformaError, Result};
use crate::session::InferenceSession;

/// Scoring request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    /// Request ID
    pub id: String,
    /// Model name
    pub model: String,
    /// Model version (None for highest loaded)
    pub version: Option<u32>,
    /// Padded token sequence, ids carried as floats
    pub data: Vec<f32>,
    /// Timestamp ms
    pub timestamp: u64,
}

impl ScoreRequest {
    /// Creates a new request
    pub fn new(model: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.to_string(),
            version: None,
            data: Vec::new(),
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    /// Sets version
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets input data
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data = data;
        self
    }
}

/// Scoring response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    /// Request ID
    pub request_id: String,
    /// Model name
    pub model: String,
    /// Model version that served the request
    pub version: u32,
    /// Probability of non-compliance
    pub probability: f32,
    /// Thresholded label
    pub label: Label,
    /// Forward-pass time in microseconds
    pub inference_time_us: u64,
    /// Total time including admission
    pub total_time_us: u64,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Maximum concurrent requests
    pub max_concurrent: usize,
    /// Request timeout ms (covers admission wait)
    pub timeout_ms: u64,
    /// Probability threshold for the non-compliant label
    pub decision_threshold: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 64,
            timeout_ms: 5_000,
            decision_threshold: 0.5,
        }
    }
}

/// A session held by the engine
struct LoadedSession {
    session: InferenceSession,
    version: u32,
    loaded_at: u64,
    inference_count: AtomicU64,
}

/// Engine statistics
#[derive(Debug, Default)]
pub struct EngineStats {
    pub total_requests: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub timeout_requests: AtomicU64,
    pub total_inference_time_us: AtomicU64,
}

/// Statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub timeout_requests: u64,
    pub avg_inference_time_us: u64,
}

/// Loaded session info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedSessionInfo {
    pub key: String,
    pub name: String,
    pub version: u32,
    pub seq_len: usize,
    pub loaded_at: u64,
    pub inference_count: u64,
}

/// Concurrent scoring engine over prepared sessions.
///
/// Sessions are keyed `name:vN`. Admission is bounded by a semaphore and
/// the configured timeout covers the wait for a permit.
pub struct InferenceEngine {
    config: InferenceConfig,
    sessions: Arc<RwLock<HashMap<String, LoadedSession>>>,
    semaphore: Arc<Semaphore>,
    stats: Arc<EngineStats>,
}

impl InferenceEngine {
    pub fn new(config: InferenceConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            semaphore,
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Loads a session under `name:vN`. An existing entry for the same
    /// version is replaced.
    pub async fn load(&self, session: InferenceSession, version: u32) -> Result<String> {
        let key = format!("{}:v{}", session.name(), version);
        let loaded = LoadedSession {
            session,
            version,
            loaded_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            inference_count: AtomicU64::new(0),
        };
        let mut sessions = self.sessions.write().await;
        let replaced = sessions.insert(key.clone(), loaded).is_some();
        info!(key = %key, replaced, "loaded session");
        Ok(key)
    }

    /// Unloads a session. Returns whether it was present.
    pub async fn unload(&self, name: &str, version: u32) -> Result<bool> {
        let key = format!("{}:v{}", name, version);
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&key).is_some();
        if removed {
            info!(key = %key, "unloaded session");
        }
        Ok(removed)
    }

    /// Scores a padded wire-format input.
    pub async fn score(&self, request: ScoreRequest) -> Result<ScoreResponse> {
        let start = Instant::now();
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        let _permit = match tokio::time::timeout(
            Duration::from_millis(self.config.timeout_ms),
            self.semaphore.acquire(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                return Err(ConformaError::Unavailable("engine shutting down".into()));
            }
            Err(_) => {
                self.stats.timeout_requests.fetch_add(1, Ordering::Relaxed);
                return Err(ConformaError::Timeout(self.config.timeout_ms));
            }
        };

        match self.score_inner(&request).await {
            Ok((probability, version, inference_time_us)) => {
                self.stats
                    .successful_requests
                    .fetch_add(1, Ordering::Relaxed);
                self.stats
                    .total_inference_time_us
                    .fetch_add(inference_time_us, Ordering::Relaxed);
                debug!(
                    model = %request.model,
                    version,
                    probability,
                    inference_time_us,
                    "scored request"
                );
                Ok(ScoreResponse {
                    request_id: request.id,
                    model: request.model,
                    version,
                    probability,
                    label: Label::from_probability(probability, self.config.decision_threshold),
                    inference_time_us,
                    total_time_us: start.elapsed().as_micros() as u64,
                })
            }
            Err(e) => {
                self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Tokenizes raw text through the session's bundled vocabulary, then
    /// scores the padded sequence.
    pub async fn score_text(
        &self,
        model: &str,
        version: Option<u32>,
        text: &str,
    ) -> Result<ScoreResponse> {
        let data: Vec<f32> = {
            let sessions = self.sessions.read().await;
            let (loaded, _) = Self::lookup(&sessions, model, version)?;
            loaded
                .session
                .vocab()
                .encode_padded(text, loaded.session.seq_len())
                .into_iter()
                .map(|id| id as f32)
                .collect()
        };

        let mut request = ScoreRequest::new(model).with_data(data);
        if let Some(v) = version {
            request = request.with_version(v);
        }
        self.score(request).await
    }

    /// Lists loaded sessions with usage counters.
    pub async fn list_loaded(&self) -> Vec<LoadedSessionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<LoadedSessionInfo> = sessions
            .iter()
            .map(|(key, loaded)| LoadedSessionInfo {
                key: key.clone(),
                name: loaded.session.name().to_string(),
                version: loaded.version,
                seq_len: loaded.session.seq_len(),
                loaded_at: loaded.loaded_at,
                inference_count: loaded.inference_count.load(Ordering::Relaxed),
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Gets a statistics snapshot
    pub fn stats(&self) -> EngineStatsSnapshot {
        let successful = self.stats.successful_requests.load(Ordering::Relaxed);
        let total_inference = self.stats.total_inference_time_us.load(Ordering::Relaxed);
        EngineStatsSnapshot {
            total_requests: self.stats.total_requests.load(Ordering::Relaxed),
            successful_requests: successful,
            failed_requests: self.stats.failed_requests.load(Ordering::Relaxed),
            timeout_requests: self.stats.timeout_requests.load(Ordering::Relaxed),
            avg_inference_time_us: if successful > 0 {
                total_inference / successful
            } else {
                0
            },
        }
    }

    async fn score_inner(&self, request: &ScoreRequest) -> Result<(f32, u32, u64)> {
        let sessions = self.sessions.read().await;
        let (loaded, version) = Self::lookup(&sessions, &request.model, request.version)?;

        let inference_start = Instant::now();
        let probability = loaded.session.run(&request.data)?;
        let inference_time_us = inference_start.elapsed().as_micros() as u64;
        loaded.inference_count.fetch_add(1, Ordering::Relaxed);
        Ok((probability, version, inference_time_us))
    }

    fn lookup<'a>(
        sessions: &'a HashMap<String, LoadedSession>,
        model: &str,
        version: Option<u32>,
    ) -> Result<(&'a LoadedSession, u32)> {
        match version {
            Some(v) => {
                let key = format!("{}:v{}", model, v);
                sessions
                    .get(&key)
                    .map(|loaded| (loaded, v))
                    .ok_or_else(|| ConformaError::NotFound(key))
            }
            None => sessions
                .values()
                .filter(|loaded| loaded.session.name() == model)
                .max_by_key(|loaded| loaded.version)
                .map(|loaded| (loaded, loaded.version))
                .ok_or_else(|| ConformaError::NotFound(model.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use crate::model::ModelWeights;
    use crate::vocab::{VocabConfig, Vocabulary};

    fn test_session(name: &str, seq_len: usize) -> InferenceSession {
        let vocab = Vocabulary::fit(
            ["brake hose clamp weld seam"],
            VocabConfig::default(),
        )
        .unwrap();
        let rows = vocab.rows();
        let weights = ModelWeights {
            embedding: (0..rows).map(|i| vec![0.1 * i as f32, -0.05 * i as f32]).collect(),
            dense1_w: vec![vec![0.3, -0.2, 0.1], vec![0.4, 0.2, -0.1]],
            dense1_b: vec![0.0, 0.1, -0.1],
            dense2_w: vec![0.5, -0.4, 0.3],
            dense2_b: 0.05,
        };
        let artifact = Artifact::package(name, weights, vocab, seq_len).unwrap();
        InferenceSession::from_artifact(&artifact).unwrap()
    }

    #[tokio::test]
    async fn test_load_score_and_stats() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        engine.load(test_session("clf", 4), 1).await.unwrap();

        let request = ScoreRequest::new("clf").with_data(vec![1.0, 2.0, 0.0, 3.0]);
        let response = engine.score(request).await.unwrap();
        assert_eq!(response.model, "clf");
        assert_eq!(response.version, 1);
        assert!((0.0..=1.0).contains(&response.probability));
        assert!(response.total_time_us >= response.inference_time_us);

        let stats = engine.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.failed_requests, 0);
    }

    #[tokio::test]
    async fn test_unknown_model_is_not_found() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        let err = engine
            .score(ScoreRequest::new("missing").with_data(vec![0.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConformaError::NotFound(_)));
        assert_eq!(engine.stats().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_version_resolution_prefers_highest() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        engine.load(test_session("clf", 4), 1).await.unwrap();
        engine.load(test_session("clf", 4), 3).await.unwrap();

        let latest = engine
            .score(ScoreRequest::new("clf").with_data(vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(latest.version, 3);

        let pinned = engine
            .score(
                ScoreRequest::new("clf")
                    .with_version(1)
                    .with_data(vec![1.0, 0.0, 0.0, 0.0]),
            )
            .await
            .unwrap();
        assert_eq!(pinned.version, 1);
    }

    #[tokio::test]
    async fn test_wrong_length_fails_request() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        engine.load(test_session("clf", 4), 1).await.unwrap();

        let err = engine
            .score(ScoreRequest::new("clf").with_data(vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConformaError::InputLength {
                expected: 4,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_score_text_matches_manual_encoding() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        let session = test_session("clf", 4);
        let data: Vec<f32> = session
            .vocab()
            .encode_padded("brake weld", 4)
            .into_iter()
            .map(|id| id as f32)
            .collect();
        engine.load(session, 1).await.unwrap();

        let by_text = engine.score_text("clf", None, "brake weld").await.unwrap();
        let by_data = engine
            .score(ScoreRequest::new("clf").with_data(data))
            .await
            .unwrap();
        assert_eq!(by_text.probability, by_data.probability);
    }

    #[tokio::test]
    async fn test_saturated_engine_times_out() {
        let engine = InferenceEngine::new(InferenceConfig {
            max_concurrent: 1,
            timeout_ms: 20,
            decision_threshold: 0.5,
        });
        engine.load(test_session("clf", 4), 1).await.unwrap();

        // Hold the only permit so the request waits out its admission budget.
        let held = engine.semaphore.clone().try_acquire_owned().unwrap();
        let err = engine
            .score(ScoreRequest::new("clf").with_data(vec![1.0, 2.0, 3.0, 4.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConformaError::Timeout(20)));

        let stats = engine.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.timeout_requests, 1);
        assert_eq!(stats.successful_requests, 0);

        // Releasing the permit lets the next request through.
        drop(held);
        engine
            .score(ScoreRequest::new("clf").with_data(vec![1.0, 2.0, 3.0, 4.0]))
            .await
            .unwrap();
        assert_eq!(engine.stats().successful_requests, 1);
    }

    #[tokio::test]
    async fn test_unload_removes_session() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        engine.load(test_session("clf", 4), 1).await.unwrap();
        assert!(engine.unload("clf", 1).await.unwrap());
        assert!(!engine.unload("clf", 1).await.unwrap());
        assert!(engine.list_loaded().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_loaded_counts_inferences() {
        let engine = InferenceEngine::new(InferenceConfig::default());
        engine.load(test_session("clf", 4), 1).await.unwrap();
        for _ in 0..3 {
            engine
                .score(ScoreRequest::new("clf").with_data(vec![1.0, 2.0, 3.0, 4.0]))
                .await
                .unwrap();
        }
        let infos = engine.list_loaded().await;
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].key, "clf:v1");
        assert_eq!(infos[0].inference_count, 3);
    }
}
