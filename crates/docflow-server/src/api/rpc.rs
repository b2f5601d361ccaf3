//! JSON-RPC 2.0 endpoint powered by `docflow_core::rpc`.
//!
//! `POST /api/rpc` takes a single request or a batch;
//! `GET /api/rpc/methods` lists the method names.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use docflow_core::rpc::RpcRouter;
use docflow_core::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(rpc_handler))
        .route("/methods", get(list_methods))
}

async fn rpc_handler(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let rpc = RpcRouter::new(state);
    Json(rpc.handle_value(body).await)
}

async fn list_methods(State(state): State<AppState>) -> Json<serde_json::Value> {
    let rpc = RpcRouter::new(state);
    Json(serde_json::json!({ "methods": rpc.method_list() }))
}
