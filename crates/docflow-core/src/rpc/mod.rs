//! Transport-agnostic JSON-RPC 2.0 layer.
//!
//! One interface over capabilities, routing, file resolution and tasks,
//! shared by the HTTP endpoint at `/api/rpc` and the `docflow` CLI.
//!
//! ```ignore
//! use docflow_core::rpc::RpcRouter;
//!
//! let router = RpcRouter::new(app_state);
//! let response = router.handle_request(r#"{
//!     "jsonrpc": "2.0",
//!     "id": 1,
//!     "method": "tasks.submit",
//!     "params": { "query": "Create notices for CEP Wave 6" }
//! }"#).await;
//! ```

pub mod error;
pub mod methods;
pub mod router;
pub mod types;

pub use error::RpcError;
pub use router::RpcRouter;
pub use types::{JsonRpcRequest, JsonRpcResponse};
