use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::core::relay::ToolCallRecord;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the tool registry and by tool handlers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid tool name '{0}': expected 1-64 characters of [a-zA-Z0-9_-]")]
    InvalidName(String),

    #[error("Invalid schema for tool '{name}': {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool failed: {0}")]
    Failed(String),
}

// =============================================================================
// Tool Results
// =============================================================================

/// Where a tool result is delivered once its handler finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultDirection {
    /// Back to the realtime service as a function output, so the model can continue.
    ToUpstream,
    /// Straight to the client, bypassing the model.
    ToDownstream,
}

impl fmt::Display for ToolResultDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolResultDirection::ToUpstream => write!(f, "to_upstream"),
            ToolResultDirection::ToDownstream => write!(f, "to_downstream"),
        }
    }
}

/// Output of a single handler invocation.
///
/// The direction is a required field; routing matches on it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub payload: Value,
    pub direction: ToolResultDirection,
    /// Set only by [`ToolResult::error`]
    failed: bool,
}

impl ToolResult {
    pub fn new(payload: impl Into<Value>, direction: ToolResultDirection) -> Self {
        Self {
            payload: payload.into(),
            direction,
            failed: false,
        }
    }

    pub fn to_upstream(payload: impl Into<Value>) -> Self {
        Self::new(payload, ToolResultDirection::ToUpstream)
    }

    pub fn to_downstream(payload: impl Into<Value>) -> Self {
        Self::new(payload, ToolResultDirection::ToDownstream)
    }

    /// Error result the model can read and recover from.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            failed: true,
            ..Self::to_upstream(json!({ "error": message.into() }))
        }
    }

    /// Whether the result was built with [`ToolResult::error`].
    pub fn is_error(&self) -> bool {
        self.failed
    }

    /// Payload rendered as the text carried on the wire.
    ///
    /// Strings are sent as-is, `null` as an empty string, anything else as compact JSON.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

// =============================================================================
// Handler Types
// =============================================================================

/// Per-call context handed to a handler alongside its arguments.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: String,
    pub call_id: String,
    pub turn_id: String,
    /// Calls this one chains from, nearest first.
    pub chain: Vec<ToolCallRecord>,
}

impl ToolContext {
    /// The call this one directly follows up on.
    pub fn previous(&self) -> Option<&ToolCallRecord> {
        self.chain.first()
    }

    /// The first call of the chain.
    pub fn origin(&self) -> Option<&ToolCallRecord> {
        self.chain.last()
    }
}

pub type ToolFuture = Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send>>;

/// Type-erased tool handler.
pub type ToolHandler = Arc<dyn Fn(Value, ToolContext) -> ToolFuture + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_text_string_passthrough() {
        let result = ToolResult::to_upstream("plain text");
        assert_eq!(result.payload_text(), "plain text");
    }

    #[test]
    fn test_payload_text_json_value() {
        let result = ToolResult::to_upstream(json!([{ "id": "1" }]));
        assert_eq!(result.payload_text(), r#"[{"id":"1"}]"#);
    }

    #[test]
    fn test_payload_text_null_is_empty() {
        let result = ToolResult::to_downstream(Value::Null);
        assert_eq!(result.payload_text(), "");
    }

    #[test]
    fn test_error_result_goes_upstream() {
        let result = ToolResult::error("boom");
        assert_eq!(result.direction, ToolResultDirection::ToUpstream);
        assert_eq!(result.payload, json!({ "error": "boom" }));
        assert!(result.is_error());
        assert!(!ToolResult::to_upstream(json!({ "ok": true })).is_error());
    }

    #[test]
    fn test_error_shaped_payload_is_not_an_error() {
        // A handler may legitimately answer with an `error` field
        let result = ToolResult::to_upstream(json!({ "error": "no cars left at this location" }));
        assert!(!result.is_error());
        assert_eq!(
            result.payload_text(),
            ToolResult::error("no cars left at this location").payload_text()
        );
    }

    #[test]
    fn test_direction_serialization() {
        assert_eq!(
            serde_json::to_string(&ToolResultDirection::ToDownstream).unwrap(),
            "\"to_downstream\""
        );
        assert_eq!(ToolResultDirection::ToUpstream.to_string(), "to_upstream");
    }

    #[test]
    fn test_context_chain_accessors() {
        let first = ToolCallRecord::new("c1", "t1", None);
        let second = ToolCallRecord::new("c2", "t1", Some("c1".to_string()));
        let context = ToolContext {
            call_id: "c3".to_string(),
            turn_id: "t1".to_string(),
            chain: vec![second.clone(), first.clone()],
            ..Default::default()
        };

        assert_eq!(context.previous().map(|r| r.call_id.as_str()), Some("c2"));
        assert_eq!(context.origin().map(|r| r.call_id.as_str()), Some("c1"));
        assert!(ToolContext::default().previous().is_none());
    }
}
