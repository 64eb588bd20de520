//! Connection limit middleware for WebSocket connections
//!
//! This module provides middleware to enforce connection limits:
//! - Global maximum WebSocket connections
//! - Per-IP connection limits
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use middletier_gateway::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/realtime", get(realtime_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::state::{AppState, ConnectionGuard, ConnectionLimitError};

/// Slot held by an accepted websocket request.
///
/// Injected as a request extension; the slot is released when the last clone is
/// dropped, so the handler keeps it alive for the lifetime of the session.
#[derive(Clone)]
pub struct ConnectionSlot(pub Arc<ConnectionGuard>);

/// Middleware that enforces connection limits for WebSocket connections.
///
/// This middleware:
/// 1. Returns 503 Service Unavailable if the global limit is reached
/// 2. Returns 429 Too Many Requests if the per-IP limit is reached
/// 3. Injects a [`ConnectionSlot`] so the handler can hold the slot
///
/// Only WebSocket upgrade requests (detected by the Upgrade header) are counted.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    let client_ip = addr.ip();

    match state.try_acquire_connection(client_ip) {
        Ok(()) => {
            let guard = ConnectionGuard::new(Arc::clone(&state), client_ip);
            request
                .extensions_mut()
                .insert(ConnectionSlot(Arc::new(guard)));
            next.run(request).await
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(
                ip = %client_ip,
                "Rejecting connection: global limit reached"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
        Err(ConnectionLimitError::PerIpLimitReached) => {
            tracing::warn!(
                ip = %client_ip,
                "Rejecting connection: per-IP limit reached"
            );
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many connections from your IP address.",
            )
                .into_response()
        }
    }
}
