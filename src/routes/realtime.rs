//! Realtime WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::realtime::realtime_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the Realtime WebSocket router
///
/// # Endpoint
///
/// `GET /realtime` - WebSocket upgrade, one relay session per connection
///
/// # Protocol
///
/// After the upgrade the gateway configures the upstream session with the
/// server's instructions and tools, then relays frames in both directions.
/// Tool calls issued by the model are executed by the gateway; results meant
/// for the client arrive as:
///
/// ```json
/// {"type": "extension.middle_tier_tool_response", "previous_item_id": "item_1", "tool_name": "show_model_information", "tool_result": "{\"title\":\"SUV\"}"}
/// ```
pub fn create_realtime_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/realtime", get(realtime_handler))
        .layer(TraceLayer::new_for_http())
}
