use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use docflow_core::models::capability::CapabilityDescriptor;
use docflow_core::{AppState, DocflowError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_capabilities).post(register_capability))
        .route("/search", get(search_capabilities))
        .route("/{name}", get(get_capability).delete(remove_capability))
}

async fn list_capabilities(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, DocflowError> {
    let capabilities = state.registry.all().await?;
    Ok(Json(serde_json::json!({ "capabilities": capabilities })))
}

/// POST /api/capabilities: idempotent upsert by name.
async fn register_capability(
    State(state): State<AppState>,
    Json(body): Json<CapabilityDescriptor>,
) -> Result<Json<serde_json::Value>, DocflowError> {
    let capability = state.registry.register(body).await?;
    Ok(Json(serde_json::json!({ "capability": capability })))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

async fn search_capabilities(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, DocflowError> {
    let matches = state
        .registry
        .search(&query.q, query.limit.unwrap_or(10))
        .await?;
    Ok(Json(serde_json::json!({ "matches": matches })))
}

async fn get_capability(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CapabilityDescriptor>, DocflowError> {
    state.registry.lookup(&name).await.map(Json)
}

async fn remove_capability(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, DocflowError> {
    state.registry.remove(&name).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
