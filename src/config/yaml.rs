use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values set here override
/// environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8765
///   tls:
///     enabled: true
///     cert_path: "/etc/gateway/cert.pem"
///     key_path: "/etc/gateway/key.pem"
///
/// upstream:
///   provider: "azure"
///   endpoint: "https://my-resource.openai.azure.com"
///   deployment: "gpt-4o-realtime-preview"
///   api_key: "your-api-key"
///   api_version: "2024-10-01-preview"
///
/// session:
///   system_message_path: "/etc/gateway/system.txt"
///   voice: "alloy"
///   temperature: 0.8
///   max_response_output_tokens: 1024
///   disable_audio: false
///   enforce_client_session: false
///
/// relay:
///   connect_timeout_seconds: 10
///   drain_timeout_seconds: 5
///   tool_timeout_seconds: 30
///   acknowledge_downstream_results: true
///   auto_continue: true
///   redact_session_details: true
///
/// tools:
///   catalog: "products"
///   products_path: "/etc/gateway/products.json"
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 1000
///   max_connections_per_ip: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub upstream: Option<UpstreamYaml>,
    pub session: Option<SessionYaml>,
    pub relay: Option<RelayYaml>,
    pub tools: Option<ToolsYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Realtime service configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UpstreamYaml {
    /// "azure" or "openai"
    pub provider: Option<String>,
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    /// Model name on the OpenAI platform
    pub model: Option<String>,
}

/// Session settings advertised to the model
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub system_message: Option<String>,
    /// File holding the system message; exclusive with `system_message`
    pub system_message_path: Option<String>,
    pub voice: Option<String>,
    pub temperature: Option<f32>,
    pub max_response_output_tokens: Option<u32>,
    pub disable_audio: Option<bool>,
    pub enforce_client_session: Option<bool>,
}

/// Relay timeouts and result handling
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub connect_timeout_seconds: Option<u64>,
    pub drain_timeout_seconds: Option<u64>,
    pub tool_timeout_seconds: Option<u64>,
    pub acknowledge_downstream_results: Option<bool>,
    pub auto_continue: Option<bool>,
    pub redact_session_details: Option<bool>,
}

/// Tool catalog selection
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolsYaml {
    /// "rental", "products" or "none"
    pub catalog: Option<String>,
    pub products_path: Option<String>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
    /// Maximum concurrent WebSocket connections
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "0.0.0.0"
  port: 9000
  tls:
    enabled: true
    cert_path: "/certs/cert.pem"
    key_path: "/certs/key.pem"

upstream:
  provider: "openai"
  api_key: "sk-yaml"
  model: "gpt-4o-mini-realtime-preview"

session:
  voice: "alloy"
  temperature: 0.7
  disable_audio: true

relay:
  drain_timeout_seconds: 2
  auto_continue: false

tools:
  catalog: "products"
  products_path: "/data/products.json"

security:
  rate_limit_requests_per_second: 100
  max_websocket_connections: 50
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.port, Some(9000));
        assert_eq!(server.tls.unwrap().enabled, Some(true));

        let upstream = config.upstream.unwrap();
        assert_eq!(upstream.provider.as_deref(), Some("openai"));
        assert_eq!(upstream.model.as_deref(), Some("gpt-4o-mini-realtime-preview"));

        let session = config.session.unwrap();
        assert_eq!(session.temperature, Some(0.7));
        assert_eq!(session.disable_audio, Some(true));
        assert!(session.system_message.is_none());

        let relay = config.relay.unwrap();
        assert_eq!(relay.drain_timeout_seconds, Some(2));
        assert_eq!(relay.auto_continue, Some(false));
        assert!(relay.tool_timeout_seconds.is_none());

        let tools = config.tools.unwrap();
        assert_eq!(tools.catalog.as_deref(), Some("products"));

        let security = config.security.unwrap();
        assert_eq!(security.max_websocket_connections, Some(50));
        assert!(security.cors_allowed_origins.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.upstream.is_none());
        assert!(config.tools.is_none());
    }

    #[test]
    fn test_from_file_not_found() {
        let path = PathBuf::from("/nonexistent/config.yaml");
        let result = YamlConfig::from_file(&path);

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
