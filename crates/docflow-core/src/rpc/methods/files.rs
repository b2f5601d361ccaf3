//! `files.resolve`: dry-run input resolution for a capability.

use serde::Deserialize;

use crate::dispatch::ResolutionReport;
use crate::models::routing::Parameters;
use crate::rpc::error::RpcError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveParams {
    pub capability: String,
    #[serde(default)]
    pub parameters: Parameters,
}

pub async fn resolve(state: &AppState, params: ResolveParams) -> Result<ResolutionReport, RpcError> {
    Ok(state
        .dispatcher
        .resolve_only(&params.capability, params.parameters)
        .await?)
}
