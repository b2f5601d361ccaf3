//! `docflow rpc`: Raw JSON-RPC invocation.

use docflow_core::AppState;

use super::{call as rpc_call, print_json};

pub async fn call(state: &AppState, method: &str, params_str: &str) -> Result<(), String> {
    let params: serde_json::Value =
        serde_json::from_str(params_str).map_err(|e| format!("Invalid JSON params: {}", e))?;
    print_json(&rpc_call(state, method, params).await);
    Ok(())
}
