//! Configuration module for the middle-tier gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use middletier_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::catalog::ToolCatalog;
use crate::core::relay::RelayConfig;
use crate::core::upstream::{UpstreamConfig, UpstreamProvider};

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the PEM certificate chain
    pub cert_path: PathBuf,
    /// Path to the PEM private key
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Groups the settings of the gateway:
/// - Server binding and TLS
/// - Upstream realtime service endpoint and credentials
/// - Session settings advertised to the model
/// - Relay timeouts and result handling
/// - Tool catalog selection
/// - Security settings (CORS, rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Upstream settings
    pub upstream_provider: UpstreamProvider,
    /// Azure OpenAI resource endpoint, e.g. `https://my-resource.openai.azure.com`
    pub upstream_endpoint: Option<String>,
    pub upstream_deployment: Option<String>,
    pub upstream_api_key: Option<String>,
    pub upstream_api_version: String,
    pub upstream_model: String,

    // Session settings
    /// Instructions for the model. Falls back to the catalog's default message.
    pub system_message: Option<String>,
    pub voice: Option<String>,
    pub temperature: Option<f32>,
    pub max_response_output_tokens: Option<u32>,
    pub disable_audio: bool,
    pub enforce_client_session: bool,

    // Relay settings
    pub connect_timeout_seconds: u64,
    pub drain_timeout_seconds: u64,
    pub tool_timeout_seconds: u64,
    pub acknowledge_downstream_results: bool,
    pub auto_continue: bool,
    pub redact_session_details: bool,

    // Tools
    pub tool_catalog: ToolCatalog,
    /// Product file read by the `products` catalog
    pub products_path: Option<PathBuf>,

    // Security settings
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (same-origin only)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

/// Zeroize the upstream credential when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.upstream_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Environment variables (with defaults) form the base configuration and the YAML
    /// file overrides specific values. Validation runs on the merged result.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // Note: .env file is loaded in main.rs at application startup
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Whether enough is configured to dial the realtime service.
    pub fn has_upstream(&self) -> bool {
        match self.upstream_provider {
            UpstreamProvider::Azure => self.upstream_endpoint.is_some(),
            UpstreamProvider::OpenAI => self.upstream_api_key.is_some(),
        }
    }

    /// Upstream connection settings, if an upstream is configured.
    pub fn upstream_config(&self) -> Option<UpstreamConfig> {
        if !self.has_upstream() {
            return None;
        }

        Some(UpstreamConfig {
            provider: self.upstream_provider,
            endpoint: self.upstream_endpoint.clone(),
            deployment: self.upstream_deployment.clone(),
            api_key: self.upstream_api_key.clone(),
            api_version: Some(self.upstream_api_version.clone()),
            model: Some(self.upstream_model.clone()),
        })
    }

    /// Session and relay settings handed to every relay session.
    pub fn relay_config(&self) -> RelayConfig {
        let system_message = self.system_message.clone().or_else(|| {
            self.tool_catalog
                .default_system_message()
                .map(str::to_string)
        });

        RelayConfig {
            system_message,
            voice: self.voice.clone(),
            temperature: self.temperature,
            max_response_output_tokens: self.max_response_output_tokens,
            disable_audio: self.disable_audio,
            enforce_client_session: self.enforce_client_session,
            connect_timeout: Duration::from_secs(self.connect_timeout_seconds),
            drain_timeout: Duration::from_secs(self.drain_timeout_seconds),
            tool_timeout: Duration::from_secs(self.tool_timeout_seconds),
            acknowledge_downstream_results: self.acknowledge_downstream_results,
            auto_continue: self.auto_continue,
            redact_session_details: self.redact_session_details,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: merge::DEFAULT_HOST.to_string(),
            port: merge::DEFAULT_PORT,
            tls: None,
            upstream_provider: UpstreamProvider::default(),
            upstream_endpoint: None,
            upstream_deployment: None,
            upstream_api_key: None,
            upstream_api_version: crate::core::upstream::DEFAULT_AZURE_API_VERSION.to_string(),
            upstream_model: crate::core::upstream::DEFAULT_OPENAI_MODEL.to_string(),
            system_message: None,
            voice: None,
            temperature: None,
            max_response_output_tokens: None,
            disable_audio: false,
            enforce_client_session: false,
            connect_timeout_seconds: crate::core::relay::DEFAULT_CONNECT_TIMEOUT.as_secs(),
            drain_timeout_seconds: crate::core::relay::DEFAULT_DRAIN_TIMEOUT.as_secs(),
            tool_timeout_seconds: crate::core::relay::DEFAULT_TOOL_TIMEOUT.as_secs(),
            acknowledge_downstream_results: true,
            auto_continue: true,
            redact_session_details: true,
            tool_catalog: ToolCatalog::default(),
            products_path: None,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: merge::DEFAULT_RATE_LIMIT_RPS,
            rate_limit_burst_size: merge::DEFAULT_RATE_LIMIT_BURST,
            max_websocket_connections: None,
            max_connections_per_ip: merge::DEFAULT_MAX_CONNECTIONS_PER_IP,
        }
    }
}
