//! Connections to the realtime service.
//!
//! The relay core only needs something that yields a fresh [`Connection`] per
//! session. [`RealtimeConnector`] dials the hosted service over websocket;
//! [`ChannelConnector`] hands out in-memory connections for embedding and tests.

mod realtime;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::relay::{Connection, TransportError};

pub use realtime::{
    DEFAULT_AZURE_API_VERSION, DEFAULT_OPENAI_MODEL, OPENAI_REALTIME_URL, RealtimeConnector,
    UpstreamConfig,
};

/// Hosting flavour of the realtime service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamProvider {
    /// Azure OpenAI deployment, authenticated with an `api-key` header
    #[default]
    Azure,
    /// OpenAI platform, authenticated with a bearer token
    #[serde(rename = "openai")]
    OpenAI,
}

impl UpstreamProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamProvider::Azure => "azure",
            UpstreamProvider::OpenAI => "openai",
        }
    }
}

impl fmt::Display for UpstreamProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpstreamProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "azure" | "azure_openai" | "azure-openai" => Ok(UpstreamProvider::Azure),
            "openai" | "open_ai" => Ok(UpstreamProvider::OpenAI),
            other => Err(format!(
                "Unsupported upstream provider: {other}. Supported providers: azure, openai"
            )),
        }
    }
}

/// Opens one upstream connection per relay session.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self) -> Result<Connection, TransportError>;

    /// Short description used in logs; must not contain credentials.
    fn describe(&self) -> String {
        "upstream".to_string()
    }
}

/// Hands out pre-built connections in order, then refuses.
#[derive(Default)]
pub struct ChannelConnector {
    pending: Mutex<Vec<Connection>>,
}

impl ChannelConnector {
    pub fn new(connections: impl IntoIterator<Item = Connection>) -> Self {
        let mut pending: Vec<Connection> = connections.into_iter().collect();
        pending.reverse();
        Self {
            pending: Mutex::new(pending),
        }
    }

    /// Connector for a single session.
    pub fn single(connection: Connection) -> Self {
        Self::new([connection])
    }

    pub fn remaining(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl UpstreamConnector for ChannelConnector {
    async fn connect(&self) -> Result<Connection, TransportError> {
        self.pending
            .lock()
            .pop()
            .ok_or_else(|| TransportError::Connect("no upstream connection available".to_string()))
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
