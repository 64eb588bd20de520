//! Realtime relay WebSocket handler
//!
//! Each client connection on `/realtime` gets its own relay session. The client
//! speaks the realtime service's protocol unchanged; the gateway intercepts the
//! service's tool calls and adds two relay events of its own.
//!
//! ## Server → Client (relay events)
//!
//! - **extension.middle_tier_tool_response**: result of a tool meant for display
//! - **extension.middle_tier_error**: upstream unreachable or session failure
//!
//! Everything else is forwarded as-is in both directions, except tool-call
//! events, which never reach the client.

mod handler;

pub use handler::realtime_handler;
