use async_trait::async_trait;
use tokio_tungstenite::tungstenite;
use url::Url;

use super::{UpstreamConnector, UpstreamProvider};
use crate::core::relay::{Connection, TransportError};

/// OpenAI Realtime API host
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com";
/// Azure API version used when none is configured
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-01-preview";
/// Model used on the OpenAI platform when none is configured
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-realtime-preview";

/// Where and how to reach the realtime service.
#[derive(Clone, Default)]
pub struct UpstreamConfig {
    pub provider: UpstreamProvider,
    /// Resource endpoint. Required for Azure; overrides the public host for OpenAI.
    pub endpoint: Option<String>,
    /// Azure deployment name
    pub deployment: Option<String>,
    pub api_key: Option<String>,
    /// Azure API version
    pub api_version: Option<String>,
    /// OpenAI model
    pub model: Option<String>,
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .finish()
    }
}

impl UpstreamConfig {
    /// Websocket URL of the realtime endpoint.
    ///
    /// `http`/`https` endpoints are rewritten to `ws`/`wss`.
    pub fn websocket_url(&self) -> Result<Url, TransportError> {
        let base = match (self.provider, self.endpoint.as_deref()) {
            (_, Some(endpoint)) => endpoint,
            (UpstreamProvider::OpenAI, None) => OPENAI_REALTIME_URL,
            (UpstreamProvider::Azure, None) => {
                return Err(TransportError::Connect(
                    "Azure upstream requires an endpoint".to_string(),
                ));
            }
        };

        let mut url = Url::parse(base)
            .map_err(|e| TransportError::Connect(format!("Invalid upstream endpoint: {e}")))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(TransportError::Connect(format!(
                    "Unsupported endpoint scheme: {other}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| TransportError::Connect("Cannot rewrite endpoint scheme".to_string()))?;

        match self.provider {
            UpstreamProvider::Azure => {
                let deployment = self.deployment.as_deref().ok_or_else(|| {
                    TransportError::Connect("Azure upstream requires a deployment".to_string())
                })?;
                url.set_path("/openai/realtime");
                url.query_pairs_mut()
                    .clear()
                    .append_pair(
                        "api-version",
                        self.api_version
                            .as_deref()
                            .unwrap_or(DEFAULT_AZURE_API_VERSION),
                    )
                    .append_pair("deployment", deployment);
            }
            UpstreamProvider::OpenAI => {
                url.set_path("/v1/realtime");
                url.query_pairs_mut()
                    .clear()
                    .append_pair("model", self.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL));
            }
        }

        Ok(url)
    }
}

/// Dials the realtime service over websocket.
#[derive(Debug, Clone)]
pub struct RealtimeConnector {
    config: UpstreamConfig,
}

impl RealtimeConnector {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn build_request(&self) -> Result<http::Request<()>, TransportError> {
        let url = self.config.websocket_url()?;
        let host = match url.port() {
            Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
            None => url.host_str().unwrap_or_default().to_string(),
        };

        let mut request = http::Request::builder()
            .uri(url.as_str())
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host);

        if let Some(api_key) = self.config.api_key.as_deref() {
            request = match self.config.provider {
                UpstreamProvider::Azure => request.header("api-key", api_key),
                UpstreamProvider::OpenAI => request
                    .header("Authorization", format!("Bearer {api_key}"))
                    .header("OpenAI-Beta", "realtime=v1"),
            };
        }

        request
            .body(())
            .map_err(|e| TransportError::Connect(e.to_string()))
    }
}

#[async_trait]
impl UpstreamConnector for RealtimeConnector {
    async fn connect(&self) -> Result<Connection, TransportError> {
        let request = self.build_request()?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::info!(upstream = %self.describe(), "Connected to realtime service");
        Ok(Connection::from_tungstenite(ws_stream))
    }

    fn describe(&self) -> String {
        match self.config.websocket_url() {
            Ok(url) => format!(
                "{}://{}{}",
                url.scheme(),
                url.host_str().unwrap_or_default(),
                url.path()
            ),
            Err(_) => self.config.provider.to_string(),
        }
    }
}
