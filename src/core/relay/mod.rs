//! The relay core.
//!
//! A [`RelaySession`] sits between a client connection and the realtime
//! service. It forwards traffic in both directions, intercepts the tool calls the
//! service issues, runs them against a shared [`ToolRegistry`](crate::core::tools::ToolRegistry)
//! and routes each result to the model or straight to the client.
//!
//! # Components
//!
//! - [`CorrelationTracker`]: in-flight calls, their turns and call chains
//! - [`MessageTranslator`]: classification of service frames and encoding of relay frames
//! - [`TurnSequencer`]: per-turn FIFO release of results headed to the model
//! - [`ResultRouter`]: exactly-once delivery of each result
//! - [`Connection`]: frame-level view of either side's transport

mod config;
mod error;
mod messages;
mod router;
mod sequencer;
mod session;
mod tracker;
mod translator;
mod transport;

pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DRAIN_TIMEOUT, DEFAULT_TOOL_TIMEOUT, RelayConfig,
};
pub use error::{RelayError, RelayResult};
pub use messages::{
    ApiError, ClientEvent, ConversationItem, ExtensionEvent, FUNCTION_CALL, FUNCTION_CALL_OUTPUT,
    ServerEvent, SessionConfig,
};
pub use router::{ResultRouter, RouteReport};
pub use sequencer::{Released, TurnCompletion, TurnSequencer};
pub use session::{RelaySession, SessionReport, SessionState, Side};
pub use tracker::{CorrelationTracker, ToolCallRecord};
pub use translator::{
    MessageTranslator, SessionControlKind, SuppressedKind, ToolCallRequest,
    UpstreamEvent, extension_error_frame, rejected_call_output, response_create_frame,
    serialize_downstream_response, serialize_upstream_output, session_update_frame,
};
pub use transport::{Connection, Frame, FrameSink, FrameStream, TransportError};
