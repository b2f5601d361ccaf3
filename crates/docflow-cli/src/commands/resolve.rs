//! `docflow resolve`: Dry-run input resolution.

use docflow_core::AppState;

use super::{call, parse_param_pairs, print_json};

pub async fn run(state: &AppState, capability: &str, params: &[String]) -> Result<(), String> {
    let parameters = parse_param_pairs(params)?;
    let response = call(
        state,
        "files.resolve",
        serde_json::json!({ "capability": capability, "parameters": parameters }),
    )
    .await;
    print_json(&response);
    Ok(())
}
