use std::path::PathBuf;

use super::{ServerConfig, TlsConfig};
use crate::core::upstream::UpstreamProvider;

/// Accepted range for the sampling temperature of realtime sessions.
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.6..=1.2;

/// Validate a merged configuration
///
/// # Errors
/// Returns an error if:
/// - The port is zero
/// - Any relay timeout is zero
/// - The `openai` provider has no API key
/// - The temperature is outside `[0.6, 1.2]`
/// - Rate or connection limits are zero
pub fn validate(config: &ServerConfig) -> Result<(), String> {
    if config.port == 0 {
        return Err("Server port must be non-zero".to_string());
    }

    validate_timeouts(config)?;

    if config.upstream_provider == UpstreamProvider::OpenAI && config.upstream_api_key.is_none()
    {
        return Err(
            "The openai upstream provider requires an API key (OPENAI_API_KEY or upstream.api_key)"
                .to_string(),
        );
    }

    if let Some(temperature) = config.temperature
        && !TEMPERATURE_RANGE.contains(&temperature)
    {
        return Err(format!(
            "Temperature {temperature} is outside the supported range [{}, {}]",
            TEMPERATURE_RANGE.start(),
            TEMPERATURE_RANGE.end()
        ));
    }

    if config.rate_limit_requests_per_second == 0 || config.rate_limit_burst_size == 0 {
        return Err("Rate limit settings must be greater than zero".to_string());
    }
    if config.max_connections_per_ip == 0 || config.max_websocket_connections == Some(0) {
        return Err("Connection limits must be greater than zero".to_string());
    }

    Ok(())
}

fn validate_timeouts(config: &ServerConfig) -> Result<(), String> {
    for (name, value) in [
        ("connect_timeout_seconds", config.connect_timeout_seconds),
        ("drain_timeout_seconds", config.drain_timeout_seconds),
        ("tool_timeout_seconds", config.tool_timeout_seconds),
    ] {
        if value == 0 {
            return Err(format!("Relay {name} must be greater than zero"));
        }
    }
    Ok(())
}

/// Only one of the inline message and the message file may be set.
pub fn validate_system_message_sources(
    message: &Option<String>,
    path: &Option<String>,
) -> Result<(), String> {
    if message.is_some() && path.is_some() {
        return Err(
            "system_message and system_message_path are mutually exclusive; set only one"
                .to_string(),
        );
    }
    Ok(())
}

/// Build the TLS settings, requiring both files when TLS is enabled.
pub fn tls_config(
    enabled: bool,
    cert_path: Option<String>,
    key_path: Option<String>,
) -> Result<Option<TlsConfig>, String> {
    if !enabled {
        return Ok(None);
    }

    let (Some(cert_path), Some(key_path)) = (cert_path, key_path) else {
        return Err("TLS is enabled but cert_path and key_path are not both set".to_string());
    };

    let cert_path = PathBuf::from(cert_path);
    let key_path = PathBuf::from(key_path);
    for path in [&cert_path, &key_path] {
        if !path.exists() {
            return Err(format!("TLS file not found: {}", path.display()));
        }
    }

    Ok(Some(TlsConfig {
        cert_path,
        key_path,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = ServerConfig::default();
        config.drain_timeout_seconds = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.contains("drain_timeout_seconds"));
    }

    #[test]
    fn test_openai_requires_key() {
        let mut config = ServerConfig::default();
        config.upstream_provider = UpstreamProvider::OpenAI;
        assert!(validate(&config).is_err());

        config.upstream_api_key = Some("sk-test".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_temperature_range() {
        let mut config = ServerConfig::default();
        config.temperature = Some(0.6);
        assert!(validate(&config).is_ok());
        config.temperature = Some(1.2);
        assert!(validate(&config).is_ok());
        config.temperature = Some(0.2);
        assert!(validate(&config).unwrap_err().contains("Temperature"));
    }

    #[test]
    fn test_zero_connection_limit_rejected() {
        let mut config = ServerConfig::default();
        config.max_websocket_connections = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_system_message_sources() {
        assert!(validate_system_message_sources(&Some("a".into()), &None).is_ok());
        assert!(validate_system_message_sources(&None, &Some("p".into())).is_ok());
        assert!(
            validate_system_message_sources(&Some("a".into()), &Some("p".into()))
                .unwrap_err()
                .contains("mutually exclusive")
        );
    }

    #[test]
    fn test_tls_config() {
        assert!(tls_config(false, None, None).unwrap().is_none());
        assert!(tls_config(true, Some("cert.pem".into()), None).is_err());
        assert!(
            tls_config(true, Some("/nonexistent/cert.pem".into()), Some("/nonexistent/key.pem".into()))
                .unwrap_err()
                .contains("not found")
        );

        let temp_dir = TempDir::new().unwrap();
        let cert = temp_dir.path().join("cert.pem");
        let key = temp_dir.path().join("key.pem");
        fs::write(&cert, "cert").unwrap();
        fs::write(&key, "key").unwrap();

        let tls = tls_config(
            true,
            Some(cert.display().to_string()),
            Some(key.display().to_string()),
        )
        .unwrap()
        .unwrap();
        assert_eq!(tls.cert_path, cert);
    }
}
