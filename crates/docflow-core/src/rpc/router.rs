//! Transport-agnostic JSON-RPC 2.0 dispatcher.
//!
//! `RpcRouter` takes an `AppState` and dispatches incoming requests to the
//! method handlers. It has no HTTP dependency, so the axum endpoint and the
//! CLI drive the exact same code.

use serde::Serialize;

use crate::state::AppState;

use super::error::RpcError;
use super::methods;
use super::types::*;

const SERIALIZE_FAILED: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Failed to serialize response"},"id":null}"#;

/// Transport-agnostic JSON-RPC router.
#[derive(Clone)]
pub struct RpcRouter {
    state: AppState,
}

impl RpcRouter {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Handle a raw JSON string (single request or batch) and return the
    /// serialized response.
    pub async fn handle_request(&self, raw: &str) -> String {
        if let Ok(batch) = serde_json::from_str::<Vec<JsonRpcRequest>>(raw) {
            let mut responses = Vec::with_capacity(batch.len());
            for req in batch {
                responses.push(self.dispatch(req).await);
            }
            return serde_json::to_string(&responses).unwrap_or_else(|_| SERIALIZE_FAILED.into());
        }

        let request: JsonRpcRequest = match serde_json::from_str(raw) {
            Ok(req) => req,
            Err(e) => {
                return serde_json::to_string(&JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
                .unwrap_or_else(|_| SERIALIZE_FAILED.into());
            }
        };

        let response = self.dispatch(request).await;
        serde_json::to_string(&response).unwrap_or_else(|_| SERIALIZE_FAILED.into())
    }

    /// Handle a pre-parsed value. Arrays are treated as batches.
    pub async fn handle_value(&self, value: serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Array(items) => {
                let mut responses = Vec::with_capacity(items.len());
                for item in items {
                    responses.push(self.handle_single(item).await);
                }
                serde_json::Value::Array(responses)
            }
            single => self.handle_single(single).await,
        }
    }

    async fn handle_single(&self, value: serde_json::Value) -> serde_json::Value {
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(req) => req,
            Err(e) => {
                return serde_json::to_value(JsonRpcResponse::error(
                    None,
                    INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ))
                .unwrap_or_default();
            }
        };

        let response = self.dispatch(request).await;
        serde_json::to_value(response).unwrap_or_default()
    }

    pub async fn dispatch(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        if req.jsonrpc != "2.0" {
            return JsonRpcResponse::error(
                req.id,
                INVALID_REQUEST,
                "Invalid JSON-RPC version, expected \"2.0\"",
            );
        }

        let id = req.id.clone();
        let params = req
            .params
            .unwrap_or(serde_json::Value::Object(Default::default()));

        match self.route(&req.method, params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => {
                tracing::debug!(method = %req.method, code = err.code(), "[RPC] {}", err);
                err.to_response(id)
            }
        }
    }

    async fn route(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, RpcError> {
        match method {
            // ----- Capabilities -----
            "capabilities.register" => {
                let p = parse_params(params)?;
                to_json(methods::capabilities::register(&self.state, p).await?)
            }
            "capabilities.get" => {
                let p = parse_params(params)?;
                to_json(methods::capabilities::get(&self.state, p).await?)
            }
            "capabilities.list" => to_json(methods::capabilities::list(&self.state).await?),
            "capabilities.search" => {
                let p = parse_params(params)?;
                to_json(methods::capabilities::search(&self.state, p).await?)
            }
            "capabilities.remove" => {
                let p = parse_params(params)?;
                to_json(methods::capabilities::remove(&self.state, p).await?)
            }

            // ----- Routing / resolution -----
            "route.decide" => {
                let p = parse_params(params)?;
                to_json(methods::route::decide(&self.state, p).await?)
            }
            "files.resolve" => {
                let p = parse_params(params)?;
                to_json(methods::files::resolve(&self.state, p).await?)
            }

            // ----- Tasks -----
            "tasks.submit" => {
                let p = parse_params(params)?;
                to_json(methods::tasks::submit(&self.state, p).await?)
            }
            "tasks.get" => {
                let p = parse_params(params)?;
                to_json(methods::tasks::get(&self.state, p).await?)
            }
            "tasks.list" => {
                let p = parse_params(params)?;
                to_json(methods::tasks::list(&self.state, p).await?)
            }
            "tasks.cancel" => {
                let p = parse_params(params)?;
                to_json(methods::tasks::cancel(&self.state, p).await?)
            }
            "tasks.wait" => {
                let p = parse_params(params)?;
                to_json(methods::tasks::wait(&self.state, p).await?)
            }

            _ => Err(RpcError::MethodNotFound(method.to_string())),
        }
    }

    /// All supported method names.
    pub fn method_list(&self) -> Vec<&'static str> {
        vec![
            "capabilities.register",
            "capabilities.get",
            "capabilities.list",
            "capabilities.search",
            "capabilities.remove",
            "route.decide",
            "files.resolve",
            "tasks.submit",
            "tasks.get",
            "tasks.list",
            "tasks.cancel",
            "tasks.wait",
        ]
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, RpcError> {
    serde_json::from_value(value)
        .map_err(|e| RpcError::InvalidParams(format!("Invalid params: {}", e)))
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(value)
        .map_err(|e| RpcError::Internal(format!("Failed to serialize result: {}", e)))
}
