//! Tool registry and tool result types.
//!
//! A [`ToolRegistry`] is built once per session configuration and handed to every
//! relay session behind an `Arc`. Handlers are async closures taking the call's
//! JSON arguments and a [`ToolContext`], returning a [`ToolResult`] whose
//! [`ToolResultDirection`] decides whether the model or the client receives it.
//!
//! ```rust
//! use middletier_gateway::core::tools::{ToolRegistry, ToolResult};
//! use serde_json::json;
//!
//! let mut registry = ToolRegistry::new();
//! registry
//!     .register(
//!         "get_weather",
//!         json!({
//!             "type": "function",
//!             "name": "get_weather",
//!             "parameters": { "type": "object", "properties": {}, "required": [] }
//!         }),
//!         |_args, _ctx| async { Ok(ToolResult::to_upstream(json!({ "sky": "clear" }))) },
//!     )
//!     .unwrap();
//! assert_eq!(registry.schemas().len(), 1);
//! ```

mod isolation;
mod registry;
mod types;

pub use isolation::invoke_isolated;
pub use registry::{Tool, ToolRegistry, ToolSchema};
pub use types::{
    ToolContext, ToolError, ToolFuture, ToolHandler, ToolResult, ToolResultDirection,
};
