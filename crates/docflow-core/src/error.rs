//! Core error type for docflow.
//!
//! `DocflowError` is used throughout the core domain (stores, registry,
//! resolver, router, RPC). Routing and resolution failures are returned
//! synchronously to callers before any task exists; failures that happen
//! inside a running pipeline are recorded on the task instead (see
//! [`crate::models::FailureReason`]).
//!
//! When the `axum` feature is enabled, it also implements `IntoResponse`
//! so it can be used directly as an axum handler error type.

#[derive(Debug, thiserror::Error)]
pub enum DocflowError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid capability descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("No capability matched the request: {0}")]
    NoRoute(String),

    #[error("Ambiguous route between: {}", .0.join(", "))]
    AmbiguousRoute(Vec<String>),

    #[error("No input file matches pattern '{0}'")]
    MissingInput(String),

    #[error("Pattern '{pattern}' matches several files: {}", candidates.join(", "))]
    AmbiguousInput {
        pattern: String,
        candidates: Vec<String>,
    },

    #[error("Classification unavailable: {0}")]
    ClassificationUnavailable(String),
}

impl DocflowError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DocflowError::Database(_) => "Database",
            DocflowError::NotFound(_) => "NotFound",
            DocflowError::BadRequest(_) => "BadRequest",
            DocflowError::Conflict(_) => "Conflict",
            DocflowError::Internal(_) => "Internal",
            DocflowError::InvalidDescriptor(_) => "InvalidDescriptor",
            DocflowError::InvalidParameters(_) => "InvalidParameters",
            DocflowError::NoRoute(_) => "NoRoute",
            DocflowError::AmbiguousRoute(_) => "AmbiguousRoute",
            DocflowError::MissingInput(_) => "MissingInput",
            DocflowError::AmbiguousInput { .. } => "AmbiguousInput",
            DocflowError::ClassificationUnavailable(_) => "ClassificationUnavailable",
        }
    }
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for DocflowError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            DocflowError::NotFound(_) => StatusCode::NOT_FOUND,
            DocflowError::BadRequest(_)
            | DocflowError::InvalidDescriptor(_)
            | DocflowError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
            DocflowError::Conflict(_)
            | DocflowError::AmbiguousRoute(_)
            | DocflowError::AmbiguousInput { .. } => StatusCode::CONFLICT,
            DocflowError::NoRoute(_) | DocflowError::MissingInput(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            DocflowError::ClassificationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DocflowError::Database(_) | DocflowError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        match &self {
            DocflowError::AmbiguousRoute(candidates) => {
                body["candidates"] = serde_json::json!(candidates);
            }
            DocflowError::AmbiguousInput { pattern, candidates } => {
                body["pattern"] = serde_json::json!(pattern);
                body["candidates"] = serde_json::json!(candidates);
            }
            _ => {}
        }
        (status, axum::Json(body)).into_response()
    }
}
