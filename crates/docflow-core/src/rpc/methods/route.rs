//! `route.decide`: classify a request without admitting a task.

use serde::Deserialize;

use crate::models::routing::{Request, RoutingDecision};
use crate::rpc::error::RpcError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideParams {
    pub query: String,
    pub session_id: Option<String>,
}

pub async fn decide(state: &AppState, params: DecideParams) -> Result<RoutingDecision, RpcError> {
    let request = Request::new(params.query, params.session_id);
    Ok(state.router.route(&request).await?)
}
