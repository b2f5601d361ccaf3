//! RPC methods for the capability registry.
//!
//! Methods:
//! - `capabilities.register`: idempotent upsert by name
//! - `capabilities.get`: fetch one descriptor
//! - `capabilities.list`: all descriptors, by name
//! - `capabilities.search`: free-text similarity search
//! - `capabilities.remove`: delete by name

use serde::{Deserialize, Serialize};

use crate::models::capability::CapabilityDescriptor;
use crate::registry::CapabilityMatch;
use crate::rpc::error::RpcError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// capabilities.register
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct RegisterResult {
    pub capability: CapabilityDescriptor,
}

/// Params are the descriptor itself.
pub async fn register(
    state: &AppState,
    params: CapabilityDescriptor,
) -> Result<RegisterResult, RpcError> {
    let capability = state.registry.register(params).await?;
    Ok(RegisterResult { capability })
}

// ---------------------------------------------------------------------------
// capabilities.get
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetParams {
    pub name: String,
}

pub async fn get(state: &AppState, params: GetParams) -> Result<CapabilityDescriptor, RpcError> {
    Ok(state.registry.lookup(&params.name).await?)
}

// ---------------------------------------------------------------------------
// capabilities.list
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ListResult {
    pub capabilities: Vec<CapabilityDescriptor>,
}

pub async fn list(state: &AppState) -> Result<ListResult, RpcError> {
    Ok(ListResult {
        capabilities: state.registry.all().await?,
    })
}

// ---------------------------------------------------------------------------
// capabilities.search
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub matches: Vec<CapabilityMatch>,
}

pub async fn search(state: &AppState, params: SearchParams) -> Result<SearchResult, RpcError> {
    Ok(SearchResult {
        matches: state.registry.search(&params.query, params.limit).await?,
    })
}

// ---------------------------------------------------------------------------
// capabilities.remove
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveParams {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct RemoveResult {
    pub removed: bool,
}

pub async fn remove(state: &AppState, params: RemoveParams) -> Result<RemoveResult, RpcError> {
    state.registry.remove(&params.name).await?;
    Ok(RemoveResult { removed: true })
}
