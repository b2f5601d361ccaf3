pub mod capabilities;
pub mod resolve;
pub mod route;
pub mod rpc;
pub mod tasks;

use axum::Router;

use docflow_core::AppState;

/// Build the complete API router with all sub-routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/api/capabilities", capabilities::router())
        .nest("/api/route", route::router())
        .nest("/api/resolve", resolve::router())
        .nest("/api/tasks", tasks::router())
        .nest("/api/rpc", rpc::router())
}
