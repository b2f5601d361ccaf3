//! docflow core: transport-agnostic domain logic.
//!
//! Routes free-form document requests to registered capabilities, binds
//! their input files, and drives each admitted task through
//! validate → generate (fan-out) → merge against worker endpoints.
//! It has **no HTTP framework dependency** by default, so it backs:
//!
//! - the HTTP server (via `docflow-server`)
//! - the `docflow` CLI (via the JSON-RPC router)
//!
//! # Feature Flags
//!
//! - `axum`: Enables `IntoResponse` impl on `DocflowError` for use in axum handlers.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod rpc;
pub mod state;
pub mod store;
pub mod template;
pub mod worker;

// Convenience re-exports
pub use config::DocflowConfig;
pub use db::Database;
pub use error::DocflowError;
pub use state::{AppState, AppStateInner};
