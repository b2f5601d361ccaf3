//! `docflow route`: Show the routing decision for a request.

use docflow_core::AppState;

use super::{call, print_json};

pub async fn run(state: &AppState, query: &str) -> Result<(), String> {
    print_json(&call(state, "route.decide", serde_json::json!({ "query": query })).await);
    Ok(())
}
