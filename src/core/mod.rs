pub mod relay;
pub mod tools;
pub mod upstream;

// Re-export commonly used types for convenience
pub use relay::{
    Connection, Frame, RelayConfig, RelayError, RelayResult, RelaySession, SessionReport,
    SessionState, TransportError,
};

pub use tools::{
    Tool, ToolContext, ToolError, ToolRegistry, ToolResult, ToolResultDirection, ToolSchema,
};

pub use upstream::{
    ChannelConnector, RealtimeConnector, UpstreamConfig, UpstreamConnector, UpstreamProvider,
};
