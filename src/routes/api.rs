use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::api;
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tools", get(api::list_tools))
        .route("/tools/{name}", get(api::get_tool))
        .layer(TraceLayer::new_for_http())
}
