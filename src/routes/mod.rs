pub mod api;
pub mod realtime;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// Assemble the application routes with their state.
///
/// The realtime route counts connections, so the app must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_app(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route(
        "/",
        axum::routing::get(crate::handlers::api::health_check),
    );

    let realtime_routes =
        realtime::create_realtime_router().layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            connection_limit_middleware,
        ));

    public_routes
        .merge(api::create_api_router())
        .merge(realtime_routes)
        .with_state(state)
}
