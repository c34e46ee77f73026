//! HTTP client for the scoring endpoint.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{ConformaError, Result};
use crate::inference::LoadedSessionInfo;
use crate::serving::{ErrorBody, ScoreBody, ScoreReply, ScoreTextBody, ServerHealth, StatsReply};

/// Client for a running Conforma scoring server.
pub struct ScoringClient {
    client: Client,
    endpoint: String,
}

impl ScoringClient {
    /// Create a client for `endpoint` (e.g. `http://127.0.0.1:8080`).
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("conforma/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConformaError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Score a padded wire-format sequence (token ids as floats).
    pub async fn score(&self, model: &str, data: &[f32]) -> Result<ScoreReply> {
        let body = ScoreBody {
            data: data.to_vec(),
        };
        let resp = self
            .client
            .post(self.url(&format!("/v1/models/{}/score", model)))
            .json(&body)
            .send()
            .await
            .map_err(|e| ConformaError::Network(e.to_string()))?;
        handle_response(resp).await
    }

    /// Score raw text; tokenization happens server-side.
    pub async fn score_text(&self, model: &str, text: &str) -> Result<ScoreReply> {
        let body = ScoreTextBody {
            text: text.to_string(),
        };
        let resp = self
            .client
            .post(self.url(&format!("/v1/models/{}/score/text", model)))
            .json(&body)
            .send()
            .await
            .map_err(|e| ConformaError::Network(e.to_string()))?;
        handle_response(resp).await
    }

    /// List models loaded on the server.
    pub async fn models(&self) -> Result<Vec<LoadedSessionInfo>> {
        let resp = self
            .client
            .get(self.url("/v1/models"))
            .send()
            .await
            .map_err(|e| ConformaError::Network(e.to_string()))?;
        handle_response(resp).await
    }

    /// Fetch server, engine, and registry statistics.
    pub async fn stats(&self) -> Result<StatsReply> {
        let resp = self
            .client
            .get(self.url("/v1/stats"))
            .send()
            .await
            .map_err(|e| ConformaError::Network(e.to_string()))?;
        handle_response(resp).await
    }

    /// Fetch the health report. A degraded-but-up server still answers.
    pub async fn health(&self) -> Result<ServerHealth> {
        let resp = self
            .client
            .get(self.url("/healthz"))
            .send()
            .await
            .map_err(|e| ConformaError::Network(e.to_string()))?;
        // /healthz carries a body on 503 too, so decode before mapping.
        let status = resp.status();
        if status.is_success() || status == StatusCode::SERVICE_UNAVAILABLE {
            resp.json()
                .await
                .map_err(|e| ConformaError::Network(format!("bad health body: {}", e)))
        } else {
            Err(error_from_status(status, None))
        }
    }
}

async fn handle_response<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        resp.json()
            .await
            .map_err(|e| ConformaError::Network(format!("bad response body: {}", e)))
    } else {
        let body: Option<ErrorBody> = resp.json().await.ok();
        Err(error_from_status(status, body))
    }
}

fn error_from_status(status: StatusCode, body: Option<ErrorBody>) -> ConformaError {
    let detail = body
        .map(|b| b.error)
        .unwrap_or_else(|| format!("status {}", status));
    match status {
        StatusCode::NOT_FOUND => ConformaError::NotFound(detail),
        StatusCode::CONFLICT => ConformaError::AlreadyExists(detail),
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
            ConformaError::InvalidInput(detail)
        }
        StatusCode::PAYLOAD_TOO_LARGE => ConformaError::InvalidInput(detail),
        StatusCode::SERVICE_UNAVAILABLE => ConformaError::Unavailable(detail),
        StatusCode::GATEWAY_TIMEOUT => ConformaError::Timeout(0),
        _ => ConformaError::Network(detail),
    }
}
