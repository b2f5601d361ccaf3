//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and drives the
//! core through the JSON-RPC router, so the CLI and the HTTP `/api/rpc`
//! endpoint share one code path.

pub mod capability;
pub mod resolve;
pub mod route;
pub mod rpc;
pub mod server;
pub mod task;

use std::path::PathBuf;
use std::sync::Arc;

use docflow_core::models::routing::{ParamValue, Parameters};
use docflow_core::rpc::RpcRouter;
use docflow_core::{AppState, AppStateInner, Database, DocflowConfig};

/// Flags shared by every subcommand; each overrides the config file.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub db: Option<String>,
    pub config: Option<PathBuf>,
    pub root: Option<String>,
}

/// Load the config file and apply command-line overrides.
pub fn load_config(opts: &GlobalOptions) -> Result<DocflowConfig, String> {
    let mut config = DocflowConfig::load(opts.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(db) = &opts.db {
        config.server.db_path = db.clone();
    }
    if let Some(root) = &opts.root {
        config.resolver.root = root.clone();
    }
    Ok(config)
}

/// Build an `AppState` from a config and register the configured
/// capabilities. Unfinished tasks are not resumed here; that is the
/// server's job.
pub async fn state_from_config(config: DocflowConfig) -> Result<AppState, String> {
    let db = Database::open(&config.server.db_path).map_err(|e| {
        format!(
            "Failed to open database '{}': {}",
            config.server.db_path, e
        )
    })?;
    let state: AppState = Arc::new(AppStateInner::new(db, config).map_err(|e| e.to_string())?);
    let registered = state
        .register_configured()
        .await
        .map_err(|e| format!("Failed to register configured capabilities: {}", e))?;
    tracing::debug!(registered, "[CLI] State ready");
    Ok(state)
}

/// Initialize a shared `AppState`, exiting the process on failure.
pub async fn init_state(opts: &GlobalOptions) -> AppState {
    let result = match load_config(opts) {
        Ok(config) => state_from_config(config).await,
        Err(e) => Err(e),
    };
    result.unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    })
}

/// Send one JSON-RPC call through the in-process router.
pub async fn call(state: &AppState, method: &str, params: serde_json::Value) -> serde_json::Value {
    RpcRouter::new(state.clone())
        .handle_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        }))
        .await
}

/// The `result` of a JSON-RPC response, or its error message.
pub fn into_result(response: serde_json::Value) -> Result<serde_json::Value, String> {
    if let Some(error) = response.get("error") {
        return Err(error["message"]
            .as_str()
            .unwrap_or("unknown error")
            .to_string());
    }
    Ok(response
        .get("result")
        .cloned()
        .unwrap_or(serde_json::Value::Null))
}

/// Parse repeated `key=value` flags into parameters.
pub fn parse_param_pairs(pairs: &[String]) -> Result<Parameters, String> {
    let mut params = Parameters::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Expected key=value, got '{}'", pair))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Empty parameter name in '{}'", pair));
        }
        params.insert(key.to_string(), ParamValue::parse(value.trim()));
    }
    Ok(params)
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_pairs() {
        let params =
            parse_param_pairs(&["client_name=CEP".into(), "wave_number=6".into()]).unwrap();
        assert_eq!(params["client_name"], ParamValue::Text("CEP".into()));
        assert_eq!(params["wave_number"], ParamValue::Number(6.0));
        assert!(parse_param_pairs(&["novalue".into()]).is_err());
        assert!(parse_param_pairs(&["=6".into()]).is_err());
    }

    #[test]
    fn test_into_result() {
        let ok = serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": { "x": 1 } });
        assert_eq!(into_result(ok).unwrap()["x"], 1);
        let err = serde_json::json!({
            "jsonrpc": "2.0", "id": 1,
            "error": { "code": -32001, "message": "Not found: x" }
        });
        assert_eq!(into_result(err).unwrap_err(), "Not found: x");
    }
}
