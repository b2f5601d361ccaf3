use std::convert::Infallible;
use std::pin::Pin;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use docflow_core::aggregate::aggregate;
use docflow_core::dispatch::SubmitReceipt;
use docflow_core::events::PipelineEvent;
use docflow_core::models::routing::Parameters;
use docflow_core::models::task::{Task, TaskStatus};
use docflow_core::{AppState, DocflowError};

type SseStream = Pin<Box<dyn tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks).post(submit_task))
        .route("/{id}", get(get_task))
        .route("/{id}/cancel", post(cancel_task))
        .route("/{id}/events", get(task_events))
}

/// Either `query` (routed) or `capability` + `parameters` (explicit).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitTaskRequest {
    query: Option<String>,
    session_id: Option<String>,
    capability: Option<String>,
    #[serde(default)]
    parameters: Parameters,
    payload_overrides: Option<serde_json::Map<String, serde_json::Value>>,
}

/// POST /api/tasks: admit a task and return its id without waiting.
async fn submit_task(
    State(state): State<AppState>,
    Json(body): Json<SubmitTaskRequest>,
) -> Result<(StatusCode, Json<SubmitReceipt>), DocflowError> {
    let receipt = match (body.query, body.capability) {
        (Some(query), None) => {
            state
                .dispatcher
                .submit_query(&query, body.session_id)
                .await?
        }
        (None, Some(capability)) => {
            state
                .dispatcher
                .submit_explicit(
                    &capability,
                    body.parameters,
                    body.payload_overrides,
                    body.session_id,
                )
                .await?
        }
        _ => {
            return Err(DocflowError::BadRequest(
                "Give exactly one of 'query' or 'capability'".into(),
            ))
        }
    };
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTasksQuery {
    status: Option<String>,
    limit: Option<usize>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<serde_json::Value>, DocflowError> {
    let status = match &query.status {
        Some(s) => Some(
            TaskStatus::from_str(s)
                .ok_or_else(|| DocflowError::BadRequest(format!("Invalid status: {}", s)))?,
        ),
        None => None,
    };
    let tasks = state
        .orchestrator
        .list(status, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(serde_json::json!({ "tasks": tasks })))
}

/// GET /api/tasks/{id}: snapshot plus aggregated outcome.
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, DocflowError> {
    let task = state.orchestrator.get(&id).await?;
    let outcome = aggregate(&task);
    Ok(Json(serde_json::json!({ "task": task, "outcome": outcome })))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, DocflowError> {
    let task = state.orchestrator.cancel(&id).await?;
    Ok(Json(serde_json::json!({ "task": task })))
}

/// GET /api/tasks/{id}/events: SSE stream of this task's pipeline events.
///
/// Starts with a `snapshot` event and ends after `taskFinished`. For a task
/// that is already terminal only the snapshot is sent. A subscriber that
/// lags re-reads the task and gets a fresh snapshot, which ends the stream
/// if the task finished in the meantime.
async fn task_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<KeepAliveStream<SseStream>>, DocflowError> {
    // Subscribe before reading the snapshot so nothing falls in between.
    let mut rx = state.event_bus.subscribe();
    let task = state.orchestrator.get(&id).await?;

    if task.status.is_terminal() {
        let stream: SseStream = Box::pin(tokio_stream::once(Ok::<_, Infallible>(snapshot_event(&task))));
        return Ok(Sse::new(stream).keep_alive(KeepAlive::default()));
    }

    let events = async_stream::stream! {
        yield Ok::<_, Infallible>(snapshot_event(&task));
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.task_id() != Some(id.as_str()) {
                        continue;
                    }
                    let finished = matches!(event, PipelineEvent::TaskFinished { .. });
                    yield Ok(Event::default()
                        .event(event.name())
                        .data(serde_json::to_string(&event).unwrap_or_default()));
                    if finished {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(task_id = %id, skipped, "[SSE] Subscriber lagged");
                    match state.orchestrator.get(&id).await {
                        Ok(current) => {
                            yield Ok(snapshot_event(&current));
                            if current.status.is_terminal() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(task_id = %id, "[SSE] Failed to re-read task: {}", e);
                            break;
                        }
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    };
    let stream: SseStream = Box::pin(events);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn snapshot_event(task: &Task) -> Event {
    Event::default().event("snapshot").data(
        serde_json::json!({
            "taskId": task.id,
            "status": task.status,
            "failureReason": task.failure_reason,
        })
        .to_string(),
    )
}
