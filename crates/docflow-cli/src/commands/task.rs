//! `docflow submit` / `docflow task`: Task commands.

use docflow_core::AppState;

use super::{call, into_result, parse_param_pairs, print_json};

/// What to submit: free text to be routed, or a named capability.
pub enum SubmitTarget<'a> {
    Query(&'a str),
    Capability {
        name: &'a str,
        params: &'a [String],
    },
}

/// Submit a task. With `wait_secs`, block until it is terminal and print
/// the task with its outcome; otherwise print the receipt.
pub async fn submit(
    state: &AppState,
    target: SubmitTarget<'_>,
    wait_secs: Option<u64>,
) -> Result<(), String> {
    let params = match target {
        SubmitTarget::Query(query) => serde_json::json!({ "query": query }),
        SubmitTarget::Capability { name, params } => serde_json::json!({
            "capability": name,
            "parameters": parse_param_pairs(params)?,
        }),
    };
    let response = call(state, "tasks.submit", params).await;
    let Some(secs) = wait_secs else {
        print_json(&response);
        return Ok(());
    };

    let receipt = into_result(response)?;
    let task_id = receipt["taskId"]
        .as_str()
        .ok_or_else(|| "Submission returned no task id".to_string())?
        .to_string();
    let waited = call(
        state,
        "tasks.wait",
        serde_json::json!({ "id": task_id, "timeoutMs": secs.saturating_mul(1000) }),
    )
    .await;
    print_json(&waited);
    Ok(())
}

pub async fn list(state: &AppState, status: Option<&str>, limit: usize) -> Result<(), String> {
    let mut params = serde_json::json!({ "limit": limit });
    if let Some(s) = status {
        params["status"] = serde_json::json!(s.to_uppercase());
    }
    print_json(&call(state, "tasks.list", params).await);
    Ok(())
}

pub async fn get(state: &AppState, task_id: &str) -> Result<(), String> {
    print_json(&call(state, "tasks.get", serde_json::json!({ "id": task_id })).await);
    Ok(())
}

pub async fn cancel(state: &AppState, task_id: &str) -> Result<(), String> {
    print_json(&call(state, "tasks.cancel", serde_json::json!({ "id": task_id })).await);
    Ok(())
}
