use std::time::Duration;

use thiserror::Error;

use super::transport::TransportError;
use crate::core::tools::ToolError;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised inside a relay session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Frame could not be parsed at all. The frame is dropped.
    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// Handler rejected its arguments or failed.
    #[error("Tool failed: {0}")]
    ToolFailed(String),

    #[error("Call id already in flight: {0}")]
    DuplicateCallId(String),

    #[error("Unknown call id: {0}")]
    UnknownCallId(String),

    #[error("Call {call_id} chaining from {previous_call_id} would form a cycle")]
    CyclicChain {
        call_id: String,
        previous_call_id: String,
    },

    #[error("Result already routed for call {0}")]
    AlreadyRouted(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Upstream rejected the session configuration: {0}")]
    HandshakeRejected(String),

    #[error("Upstream did not acknowledge the session within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RelayError {
    /// Whether the error only affects a single tool call.
    ///
    /// Call-scoped errors are answered with an error result and the session keeps
    /// running; everything else ends the session.
    pub fn is_call_scoped(&self) -> bool {
        matches!(
            self,
            RelayError::UnknownTool(_)
                | RelayError::DuplicateTool(_)
                | RelayError::ToolFailed(_)
                | RelayError::DuplicateCallId(_)
                | RelayError::UnknownCallId(_)
                | RelayError::CyclicChain { .. }
                | RelayError::AlreadyRouted(_)
        )
    }

    /// Whether the error can be logged and skipped without touching the session.
    pub fn is_recoverable(&self) -> bool {
        self.is_call_scoped() || matches!(self, RelayError::ProtocolDecode(_))
    }
}

impl From<ToolError> for RelayError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::UnknownTool(name) => RelayError::UnknownTool(name),
            ToolError::DuplicateTool(name) => RelayError::DuplicateTool(name),
            other => RelayError::ToolFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_scoped_errors() {
        assert!(RelayError::UnknownTool("x".into()).is_call_scoped());
        assert!(RelayError::DuplicateCallId("c1".into()).is_call_scoped());
        assert!(
            RelayError::CyclicChain {
                call_id: "a".into(),
                previous_call_id: "b".into(),
            }
            .is_call_scoped()
        );
        assert!(!RelayError::Transport(TransportError::Closed).is_call_scoped());
        assert!(!RelayError::HandshakeTimeout(Duration::from_secs(1)).is_call_scoped());
    }

    #[test]
    fn test_decode_errors_are_recoverable() {
        assert!(RelayError::ProtocolDecode("bad".into()).is_recoverable());
        assert!(!RelayError::ProtocolDecode("bad".into()).is_call_scoped());
        assert!(!RelayError::HandshakeRejected("no".into()).is_recoverable());
    }

    #[test]
    fn test_tool_error_conversion() {
        let err: RelayError = ToolError::UnknownTool("ghost".into()).into();
        assert_eq!(err, RelayError::UnknownTool("ghost".into()));

        let err: RelayError = ToolError::InvalidArguments("missing x".into()).into();
        match err {
            RelayError::ToolFailed(msg) => assert!(msg.contains("missing x")),
            other => panic!("Expected ToolFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::CyclicChain {
            call_id: "c2".into(),
            previous_call_id: "c1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Call c2 chaining from c1 would form a cycle"
        );
    }
}
