use std::path::PathBuf;

use super::ServerConfig;
use super::env::EnvConfig;
use super::validation;
use super::yaml::{
    RelayYaml, SecurityYaml, ServerYaml, SessionYaml, TlsYaml, ToolsYaml, UpstreamYaml,
    YamlConfig,
};

pub(super) const DEFAULT_HOST: &str = "localhost";
pub(super) const DEFAULT_PORT: u16 = 8765;
pub(super) const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
pub(super) const DEFAULT_RATE_LIMIT_BURST: u32 = 10;
pub(super) const DEFAULT_MAX_CONNECTIONS_PER_IP: u32 = 100;

/// Merge environment configuration (base) with optional YAML overrides
///
/// For every setting the YAML value wins, then the environment, then the default.
/// The system message pair is taken as a unit from whichever source sets it, and a
/// configured message file is read here.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let env = EnvConfig::load()?;
    let yaml = yaml.unwrap_or_default();

    let server = yaml.server.unwrap_or_default();
    let tls_yaml = server.tls.clone().unwrap_or_default();
    let upstream = yaml.upstream.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();
    let relay = yaml.relay.unwrap_or_default();
    let tools = yaml.tools.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();

    let mut config = ServerConfig::default();
    apply_server(&mut config, &server, &tls_yaml, &env)?;
    apply_upstream(&mut config, upstream, &env)?;
    apply_session(&mut config, session, &env)?;
    apply_relay(&mut config, &relay, &env);
    apply_tools(&mut config, tools, &env)?;
    apply_security(&mut config, security, &env);

    Ok(config)
}

fn apply_server(
    config: &mut ServerConfig,
    server: &ServerYaml,
    tls: &TlsYaml,
    env: &EnvConfig,
) -> Result<(), String> {
    if let Some(host) = server.host.clone().or_else(|| env.host.clone()) {
        config.host = host;
    }
    if let Some(port) = server.port.or(env.port) {
        config.port = port;
    }

    let enabled = tls.enabled.or(env.tls_enabled).unwrap_or(false);
    config.tls = validation::tls_config(
        enabled,
        tls.cert_path.clone().or_else(|| env.tls_cert_path.clone()),
        tls.key_path.clone().or_else(|| env.tls_key_path.clone()),
    )?;
    Ok(())
}

fn apply_upstream(
    config: &mut ServerConfig,
    upstream: UpstreamYaml,
    env: &EnvConfig,
) -> Result<(), String> {
    if let Some(provider) = upstream.provider.or_else(|| env.upstream_provider.clone()) {
        config.upstream_provider = provider.parse()?;
    }
    config.upstream_endpoint = upstream.endpoint.or_else(|| env.upstream_endpoint.clone());
    config.upstream_deployment = upstream
        .deployment
        .or_else(|| env.upstream_deployment.clone());
    config.upstream_api_key = upstream.api_key.or_else(|| env.upstream_api_key.clone());
    if let Some(version) = upstream
        .api_version
        .or_else(|| env.upstream_api_version.clone())
    {
        config.upstream_api_version = version;
    }
    if let Some(model) = upstream.model.or_else(|| env.upstream_model.clone()) {
        config.upstream_model = model;
    }
    Ok(())
}

fn apply_session(
    config: &mut ServerConfig,
    session: SessionYaml,
    env: &EnvConfig,
) -> Result<(), String> {
    let (message, path) = if session.system_message.is_some() || session.system_message_path.is_some()
    {
        (session.system_message, session.system_message_path)
    } else {
        (env.system_message.clone(), env.system_message_path.clone())
    };
    validation::validate_system_message_sources(&message, &path)?;
    config.system_message = match path {
        Some(path) => Some(read_system_message(&path)?),
        None => message,
    };

    config.voice = session.voice.or_else(|| env.voice.clone());
    config.temperature = session.temperature.or(env.temperature);
    config.max_response_output_tokens = session
        .max_response_output_tokens
        .or(env.max_response_output_tokens);
    if let Some(disable_audio) = session.disable_audio.or(env.disable_audio) {
        config.disable_audio = disable_audio;
    }
    if let Some(enforce) = session
        .enforce_client_session
        .or(env.enforce_client_session)
    {
        config.enforce_client_session = enforce;
    }
    Ok(())
}

fn apply_relay(config: &mut ServerConfig, relay: &RelayYaml, env: &EnvConfig) {
    if let Some(secs) = relay.connect_timeout_seconds.or(env.connect_timeout_seconds) {
        config.connect_timeout_seconds = secs;
    }
    if let Some(secs) = relay.drain_timeout_seconds.or(env.drain_timeout_seconds) {
        config.drain_timeout_seconds = secs;
    }
    if let Some(secs) = relay.tool_timeout_seconds.or(env.tool_timeout_seconds) {
        config.tool_timeout_seconds = secs;
    }
    if let Some(ack) = relay
        .acknowledge_downstream_results
        .or(env.acknowledge_downstream_results)
    {
        config.acknowledge_downstream_results = ack;
    }
    if let Some(auto_continue) = relay.auto_continue.or(env.auto_continue) {
        config.auto_continue = auto_continue;
    }
    if let Some(redact) = relay.redact_session_details.or(env.redact_session_details) {
        config.redact_session_details = redact;
    }
}

fn apply_tools(config: &mut ServerConfig, tools: ToolsYaml, env: &EnvConfig) -> Result<(), String> {
    if let Some(catalog) = tools.catalog.or_else(|| env.tool_catalog.clone()) {
        config.tool_catalog = catalog.parse()?;
    }
    config.products_path = tools
        .products_path
        .or_else(|| env.products_path.clone())
        .map(PathBuf::from);
    Ok(())
}

fn apply_security(config: &mut ServerConfig, security: SecurityYaml, env: &EnvConfig) {
    config.cors_allowed_origins = security
        .cors_allowed_origins
        .or_else(|| env.cors_allowed_origins.clone());
    if let Some(rps) = security
        .rate_limit_requests_per_second
        .or(env.rate_limit_requests_per_second)
    {
        config.rate_limit_requests_per_second = rps;
    }
    if let Some(burst) = security.rate_limit_burst_size.or(env.rate_limit_burst_size) {
        config.rate_limit_burst_size = burst;
    }
    config.max_websocket_connections = security
        .max_websocket_connections
        .or(env.max_websocket_connections);
    if let Some(per_ip) = security
        .max_connections_per_ip
        .or(env.max_connections_per_ip)
    {
        config.max_connections_per_ip = per_ip;
    }
}

fn read_system_message(path: &str) -> Result<String, String> {
    std::fs::read_to_string(path)
        .map(|contents| contents.trim().to_string())
        .map_err(|e| format!("Failed to read system message file {path}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ToolCatalog;
    use crate::core::upstream::UpstreamProvider;

    fn merged(yaml: &str) -> ServerConfig {
        let mut config = ServerConfig::default();
        let env = EnvConfig::default();
        let yaml: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = yaml.server.unwrap_or_default();
        let tls = server.tls.clone().unwrap_or_default();
        apply_server(&mut config, &server, &tls, &env).unwrap();
        apply_upstream(&mut config, yaml.upstream.unwrap_or_default(), &env).unwrap();
        apply_session(&mut config, yaml.session.unwrap_or_default(), &env).unwrap();
        apply_relay(&mut config, &yaml.relay.unwrap_or_default(), &env);
        apply_tools(&mut config, yaml.tools.unwrap_or_default(), &env).unwrap();
        apply_security(&mut config, yaml.security.unwrap_or_default(), &env);
        config
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = merged("{}");
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.connect_timeout_seconds, 10);
        assert!(config.acknowledge_downstream_results);
        assert!(config.auto_continue);
        assert!(config.redact_session_details);
        assert_eq!(config.max_connections_per_ip, DEFAULT_MAX_CONNECTIONS_PER_IP);
        assert!(config.max_websocket_connections.is_none());
    }

    #[test]
    fn test_yaml_values_applied() {
        let config = merged(
            r#"
upstream:
  provider: openai
  api_key: sk-test
relay:
  acknowledge_downstream_results: false
tools:
  catalog: products
  products_path: /data/products.json
"#,
        );
        assert_eq!(config.upstream_provider, UpstreamProvider::OpenAI);
        assert!(!config.acknowledge_downstream_results);
        assert_eq!(config.tool_catalog, ToolCatalog::Products);
        assert_eq!(
            config.products_path,
            Some(PathBuf::from("/data/products.json"))
        );
    }

    #[test]
    fn test_env_fills_gaps() {
        let mut config = ServerConfig::default();
        let env = EnvConfig {
            voice: Some("verse".to_string()),
            temperature: Some(0.9),
            ..Default::default()
        };
        let session = SessionYaml {
            voice: Some("alloy".to_string()),
            ..Default::default()
        };
        apply_session(&mut config, session, &env).unwrap();
        assert_eq!(config.voice.as_deref(), Some("alloy"));
        assert_eq!(config.temperature, Some(0.9));
    }

    #[test]
    fn test_unknown_catalog_rejected() {
        let mut config = ServerConfig::default();
        let tools = ToolsYaml {
            catalog: Some("weather".to_string()),
            ..Default::default()
        };
        let err = apply_tools(&mut config, tools, &EnvConfig::default()).unwrap_err();
        assert!(err.contains("Unknown tool catalog"));
    }
}
