//! RPC methods for pipeline tasks.
//!
//! Methods:
//! - `tasks.submit`: admit a task from free text or an explicit capability
//! - `tasks.get`: task snapshot plus its aggregated outcome
//! - `tasks.list`: persisted tasks, newest first
//! - `tasks.cancel`: cancel a non-terminal task
//! - `tasks.wait`: block until terminal or the timeout elapses

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregate::aggregate;
use crate::dispatch::SubmitReceipt;
use crate::models::outcome::Outcome;
use crate::models::routing::Parameters;
use crate::models::task::{Task, TaskStatus};
use crate::rpc::error::RpcError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// tasks.submit
// ---------------------------------------------------------------------------

/// Either `query` (routed) or `capability` (+ `parameters`) must be given.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitParams {
    pub query: Option<String>,
    pub capability: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
    pub payload_overrides: Option<serde_json::Map<String, serde_json::Value>>,
    pub session_id: Option<String>,
}

pub async fn submit(state: &AppState, params: SubmitParams) -> Result<SubmitReceipt, RpcError> {
    match (params.query, params.capability) {
        (Some(_), Some(_)) => Err(RpcError::InvalidParams(
            "Give either 'query' or 'capability', not both".into(),
        )),
        (Some(query), None) => Ok(state
            .dispatcher
            .submit_query(&query, params.session_id)
            .await?),
        (None, Some(capability)) => Ok(state
            .dispatcher
            .submit_explicit(
                &capability,
                params.parameters,
                params.payload_overrides,
                params.session_id,
            )
            .await?),
        (None, None) => Err(RpcError::InvalidParams(
            "One of 'query' or 'capability' is required".into(),
        )),
    }
}

// ---------------------------------------------------------------------------
// tasks.get
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetParams {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub task: Task,
    pub outcome: Outcome,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        let outcome = aggregate(&task);
        Self { task, outcome }
    }
}

pub async fn get(state: &AppState, params: GetParams) -> Result<TaskView, RpcError> {
    Ok(state.orchestrator.get(&params.id).await?.into())
}

// ---------------------------------------------------------------------------
// tasks.list
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub status: Option<String>,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct ListResult {
    pub tasks: Vec<Task>,
}

pub async fn list(state: &AppState, params: ListParams) -> Result<ListResult, RpcError> {
    let status = match &params.status {
        Some(s) => Some(
            TaskStatus::from_str(s)
                .ok_or_else(|| RpcError::BadRequest(format!("Invalid status: {}", s)))?,
        ),
        None => None,
    };
    Ok(ListResult {
        tasks: state.orchestrator.list(status, params.limit).await?,
    })
}

// ---------------------------------------------------------------------------
// tasks.cancel
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelParams {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResult {
    pub task: Task,
}

pub async fn cancel(state: &AppState, params: CancelParams) -> Result<CancelResult, RpcError> {
    Ok(CancelResult {
        task: state.orchestrator.cancel(&params.id).await?,
    })
}

// ---------------------------------------------------------------------------
// tasks.wait
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitParams {
    pub id: String,
    #[serde(default = "default_wait_ms")]
    pub timeout_ms: u64,
}

fn default_wait_ms() -> u64 {
    60_000
}

pub async fn wait(state: &AppState, params: WaitParams) -> Result<TaskView, RpcError> {
    let task = state
        .orchestrator
        .wait(&params.id, Duration::from_millis(params.timeout_ms))
        .await?;
    Ok(task.into())
}
