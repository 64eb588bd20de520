//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and tool listing endpoints
//! - `realtime` - Realtime relay WebSocket

pub mod api;
pub mod realtime;

pub use realtime::realtime_handler;
