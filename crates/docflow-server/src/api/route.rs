//! `POST /api/route`: routing decision only, no task is admitted.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use docflow_core::models::routing::{Request, RoutingDecision};
use docflow_core::{AppState, DocflowError};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(decide_route))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteRequest {
    query: String,
    session_id: Option<String>,
}

async fn decide_route(
    State(state): State<AppState>,
    Json(body): Json<RouteRequest>,
) -> Result<Json<RoutingDecision>, DocflowError> {
    let request = Request::new(body.query, body.session_id);
    state.router.route(&request).await.map(Json)
}
