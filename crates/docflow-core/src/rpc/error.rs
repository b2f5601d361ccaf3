//! RPC error type that bridges `DocflowError` to JSON-RPC errors.

use super::types;
use crate::error::DocflowError;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("No route: {0}")]
    NoRoute(String),

    /// Several routes or several input files; `candidates` lists them.
    #[error("{message}")]
    Ambiguous {
        kind: &'static str,
        message: String,
        candidates: Vec<String>,
    },

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl RpcError {
    pub fn code(&self) -> i64 {
        match self {
            RpcError::NotFound(_) => types::NOT_FOUND,
            RpcError::BadRequest(_) => types::BAD_REQUEST,
            RpcError::Conflict(_) => types::CONFLICT,
            RpcError::Internal(_) => types::INTERNAL_ERROR,
            RpcError::InvalidParams(_) => types::INVALID_PARAMS,
            RpcError::MethodNotFound(_) => types::METHOD_NOT_FOUND,
            RpcError::NoRoute(_) => types::NO_ROUTE,
            RpcError::Ambiguous { .. } => types::AMBIGUOUS,
            RpcError::MissingInput(_) => types::MISSING_INPUT,
            RpcError::Unavailable(_) => types::UNAVAILABLE,
        }
    }

    pub fn to_response(&self, id: Option<serde_json::Value>) -> types::JsonRpcResponse {
        match self {
            RpcError::Ambiguous {
                kind, candidates, ..
            } => types::JsonRpcResponse::error_with_data(
                id,
                self.code(),
                self.to_string(),
                serde_json::json!({ "kind": kind, "candidates": candidates }),
            ),
            _ => types::JsonRpcResponse::error(id, self.code(), self.to_string()),
        }
    }
}

impl From<DocflowError> for RpcError {
    fn from(err: DocflowError) -> Self {
        let message = err.to_string();
        match err {
            DocflowError::NotFound(msg) => RpcError::NotFound(msg),
            DocflowError::BadRequest(msg) => RpcError::BadRequest(msg),
            DocflowError::InvalidDescriptor(_) => RpcError::BadRequest(message),
            DocflowError::InvalidParameters(msg) => RpcError::InvalidParams(msg),
            DocflowError::Conflict(msg) => RpcError::Conflict(msg),
            DocflowError::Database(msg) | DocflowError::Internal(msg) => RpcError::Internal(msg),
            DocflowError::NoRoute(msg) => RpcError::NoRoute(msg),
            DocflowError::AmbiguousRoute(candidates) => RpcError::Ambiguous {
                kind: "AmbiguousRoute",
                message,
                candidates,
            },
            DocflowError::AmbiguousInput { candidates, .. } => RpcError::Ambiguous {
                kind: "AmbiguousInput",
                message,
                candidates,
            },
            DocflowError::MissingInput(pattern) => RpcError::MissingInput(pattern),
            DocflowError::ClassificationUnavailable(msg) => RpcError::Unavailable(msg),
        }
    }
}
