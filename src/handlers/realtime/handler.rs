use std::sync::Arc;

use axum::{
    Extension,
    extract::{State, ws::WebSocketUpgrade},
    response::Response,
};
use tracing::{info, warn};

use crate::core::relay::{Connection, RelaySession};
use crate::errors::{AppError, AppResult};
use crate::middleware::ConnectionSlot;
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Upgrades the request and runs one relay session on the socket.
///
/// Refused with 503 before the upgrade when no upstream is configured. The
/// connection slot reserved by the limit middleware is held until the session ends.
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    slot: Option<Extension<ConnectionSlot>>,
) -> AppResult<Response> {
    let connector = state
        .connector
        .clone()
        .ok_or(AppError::UpstreamNotConfigured)?;

    info!("Realtime WebSocket connection upgrade requested");

    Ok(ws
        .max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            let session = RelaySession::new(
                Arc::clone(&state.relay_config),
                Arc::clone(&state.tools),
            );
            let session_id = session.id().to_string();
            info!(session_id = %session_id, "Realtime WebSocket connection established");

            let report = session.run(Connection::from_axum(socket), connector).await;
            if report.failed() {
                warn!(
                    session_id = %session_id,
                    failure = ?report.failure,
                    "Relay session failed"
                );
            }
            info!(
                session_id = %session_id,
                tools_dispatched = report.tools_dispatched,
                tool_errors = report.tool_errors,
                discarded_results = report.discarded_results,
                "Realtime WebSocket connection terminated"
            );
        }))
}
