//! `POST /api/resolve`: dry-run of input resolution for a capability.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use docflow_core::dispatch::ResolutionReport;
use docflow_core::models::routing::Parameters;
use docflow_core::{AppState, DocflowError};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(resolve_inputs))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest {
    capability: String,
    #[serde(default)]
    parameters: Parameters,
}

async fn resolve_inputs(
    State(state): State<AppState>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<ResolutionReport>, DocflowError> {
    state
        .dispatcher
        .resolve_only(&body.capability, body.parameters)
        .await
        .map(Json)
}
