//! `docflow capability`: Capability registry commands.

use std::path::Path;

use docflow_core::AppState;

use super::{call, print_json};

/// Register (upsert) a descriptor read from a YAML or JSON file.
pub async fn register(state: &AppState, file: &Path) -> Result<(), String> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| format!("Cannot read {}: {}", file.display(), e))?;
    let descriptor: serde_json::Value = serde_yaml::from_str(&text)
        .map_err(|e| format!("Invalid descriptor in {}: {}", file.display(), e))?;
    print_json(&call(state, "capabilities.register", descriptor).await);
    Ok(())
}

pub async fn list(state: &AppState) -> Result<(), String> {
    print_json(&call(state, "capabilities.list", serde_json::json!({})).await);
    Ok(())
}

pub async fn get(state: &AppState, name: &str) -> Result<(), String> {
    print_json(&call(state, "capabilities.get", serde_json::json!({ "name": name })).await);
    Ok(())
}

pub async fn remove(state: &AppState, name: &str) -> Result<(), String> {
    print_json(&call(state, "capabilities.remove", serde_json::json!({ "name": name })).await);
    Ok(())
}

pub async fn search(state: &AppState, query: &str, limit: usize) -> Result<(), String> {
    let params = serde_json::json!({ "query": query, "limit": limit });
    print_json(&call(state, "capabilities.search", params).await);
    Ok(())
}
