//! Worker invocation: the boundary between the pipeline and the document
//! workers behind capability endpoints.

pub mod payload;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use payload::build_payload;

/// Pipeline stage a worker request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStage {
    Validate,
    Generate,
    Merge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub task_id: String,
    pub stage: WorkerStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    pub payload: serde_json::Value,
    /// Artifact refs to combine; only populated for merge requests.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub status: WorkerStatus,
    #[serde(default)]
    pub artifact_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WorkerResponse {
    pub fn success(artifact_refs: Vec<String>) -> Self {
        Self {
            status: WorkerStatus::Success,
            artifact_refs,
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: WorkerStatus::Failure,
            artifact_refs: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == WorkerStatus::Success
    }

    /// Interpret a worker's JSON reply. Accepts `status` strings such as
    /// `success`/`SUCCESS`/`failed`, or a boolean `success` field, and
    /// artifact refs under `artifact_refs` or `artifactRefs`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, WorkerError> {
        let status = match (value.get("status"), value.get("success")) {
            (Some(serde_json::Value::String(s)), _) => match s.to_lowercase().as_str() {
                "success" | "succeeded" | "ok" | "completed" => WorkerStatus::Success,
                "failure" | "failed" | "error" => WorkerStatus::Failure,
                other => {
                    return Err(WorkerError::Malformed(format!(
                        "unknown worker status '{}'",
                        other
                    )))
                }
            },
            (_, Some(serde_json::Value::Bool(true))) => WorkerStatus::Success,
            (_, Some(serde_json::Value::Bool(false))) => WorkerStatus::Failure,
            _ => return Err(WorkerError::Malformed("response has no status".into())),
        };

        let refs = value
            .get("artifact_refs")
            .or_else(|| value.get("artifactRefs"))
            .cloned()
            .unwrap_or(serde_json::Value::Array(vec![]));
        let artifact_refs: Vec<String> = serde_json::from_value(refs)
            .map_err(|e| WorkerError::Malformed(format!("bad artifact refs: {}", e)))?;
        let message = value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(|m| m.as_str())
            .map(str::to_string);

        Ok(Self {
            status,
            artifact_refs,
            message,
        })
    }
}

/// Transport-level failure of a worker call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Worker unavailable: {0}")]
    Unavailable(String),

    #[error("Worker rejected the request: {0}")]
    Rejected(String),

    #[error("Malformed worker response: {0}")]
    Malformed(String),
}

impl WorkerError {
    /// Timeouts and 5xx-equivalent failures may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, WorkerError::Timeout(_) | WorkerError::Unavailable(_))
    }
}

#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn invoke(
        &self,
        endpoint: &str,
        request: &WorkerRequest,
        timeout: Duration,
    ) -> Result<WorkerResponse, WorkerError>;
}

/// JSON-over-HTTP worker client.
#[derive(Clone)]
pub struct HttpWorkerClient {
    client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpWorkerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn invoke(
        &self,
        endpoint: &str,
        request: &WorkerRequest,
        timeout: Duration,
    ) -> Result<WorkerResponse, WorkerError> {
        tracing::debug!(
            endpoint = %endpoint,
            task_id = %request.task_id,
            stage = ?request.stage,
            "[Worker] POST"
        );

        let response = self
            .client
            .post(endpoint)
            .header("content-type", "application/json")
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| send_error(e, timeout))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                WorkerError::Timeout(timeout)
            } else {
                WorkerError::Unavailable(format!("Failed to read response body: {}", e))
            }
        })?;

        if status.is_server_error() {
            return Err(WorkerError::Unavailable(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            return Err(WorkerError::Rejected(format!("{}: {}", status, body)));
        }

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| WorkerError::Malformed(format!("{}: {}", e, body)))?;
        WorkerResponse::from_json(&json)
    }
}

/// Timeouts and connection failures are transient. A request that cannot
/// be built or sent (for instance an invalid endpoint URI) is not.
fn send_error(e: reqwest::Error, timeout: Duration) -> WorkerError {
    if e.is_timeout() {
        WorkerError::Timeout(timeout)
    } else if e.is_builder() || (e.is_request() && !e.is_connect()) {
        WorkerError::Rejected(e.to_string())
    } else {
        WorkerError::Unavailable(e.to_string())
    }
}
