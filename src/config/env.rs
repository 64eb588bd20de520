use std::fmt::Display;
use std::str::FromStr;

/// Configuration read from environment variables
///
/// Every field is optional; defaults are applied when merging.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls_enabled: Option<bool>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,

    pub upstream_provider: Option<String>,
    pub upstream_endpoint: Option<String>,
    pub upstream_deployment: Option<String>,
    pub upstream_api_key: Option<String>,
    pub upstream_api_version: Option<String>,
    pub upstream_model: Option<String>,

    pub system_message: Option<String>,
    pub system_message_path: Option<String>,
    pub voice: Option<String>,
    pub temperature: Option<f32>,
    pub max_response_output_tokens: Option<u32>,
    pub disable_audio: Option<bool>,
    pub enforce_client_session: Option<bool>,

    pub connect_timeout_seconds: Option<u64>,
    pub drain_timeout_seconds: Option<u64>,
    pub tool_timeout_seconds: Option<u64>,
    pub acknowledge_downstream_results: Option<bool>,
    pub auto_continue: Option<bool>,
    pub redact_session_details: Option<bool>,

    pub tool_catalog: Option<String>,
    pub products_path: Option<String>,

    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl EnvConfig {
    /// Read all supported variables from the process environment.
    ///
    /// Empty values count as unset. The Azure key falls back to `OPENAI_API_KEY`.
    pub fn load() -> Result<Self, String> {
        Ok(Self {
            host: var("HOST"),
            port: parse("PORT")?,
            tls_enabled: parse_bool("TLS_ENABLED")?,
            tls_cert_path: var("TLS_CERT_PATH"),
            tls_key_path: var("TLS_KEY_PATH"),

            upstream_provider: var("UPSTREAM_PROVIDER"),
            upstream_endpoint: var("AZURE_OPENAI_ENDPOINT"),
            upstream_deployment: var("AZURE_OPENAI_COMPLETION_DEPLOYMENT_NAME"),
            upstream_api_key: var("AZURE_OPENAI_API_KEY").or_else(|| var("OPENAI_API_KEY")),
            upstream_api_version: var("AZURE_OPENAI_API_VERSION"),
            upstream_model: var("OPENAI_REALTIME_MODEL"),

            system_message: var("SYSTEM_MESSAGE"),
            system_message_path: var("SYSTEM_MESSAGE_PATH"),
            voice: var("REALTIME_VOICE"),
            temperature: parse("REALTIME_TEMPERATURE")?,
            max_response_output_tokens: parse("REALTIME_MAX_RESPONSE_OUTPUT_TOKENS")?,
            disable_audio: parse_bool("REALTIME_DISABLE_AUDIO")?,
            enforce_client_session: parse_bool("RELAY_ENFORCE_CLIENT_SESSION")?,

            connect_timeout_seconds: parse("RELAY_CONNECT_TIMEOUT_SECONDS")?,
            drain_timeout_seconds: parse("RELAY_DRAIN_TIMEOUT_SECONDS")?,
            tool_timeout_seconds: parse("RELAY_TOOL_TIMEOUT_SECONDS")?,
            acknowledge_downstream_results: parse_bool("RELAY_ACKNOWLEDGE_DOWNSTREAM")?,
            auto_continue: parse_bool("RELAY_AUTO_CONTINUE")?,
            redact_session_details: parse_bool("RELAY_REDACT_SESSION")?,

            tool_catalog: var("TOOL_CATALOG"),
            products_path: var("PRODUCT_CATALOG_PATH"),

            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
            rate_limit_requests_per_second: parse("RATE_LIMIT_REQUESTS_PER_SECOND")?,
            rate_limit_burst_size: parse("RATE_LIMIT_BURST_SIZE")?,
            max_websocket_connections: parse("MAX_WEBSOCKET_CONNECTIONS")?,
            max_connections_per_ip: parse("MAX_CONNECTIONS_PER_IP")?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse<T>(key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    var(key)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|e| format!("Invalid value for {key}: '{value}' ({e})"))
        })
        .transpose()
}

fn parse_bool(key: &str) -> Result<Option<bool>, String> {
    var(key)
        .map(|value| match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(format!("Invalid boolean for {key}: '{value}'")),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_empty_values_are_unset() {
        unsafe {
            env::set_var("REALTIME_VOICE", "   ");
        }
        assert!(var("REALTIME_VOICE").is_none());
        unsafe {
            env::remove_var("REALTIME_VOICE");
        }
    }

    #[test]
    #[serial]
    fn test_parse_bool_variants() {
        unsafe {
            env::set_var("RELAY_AUTO_CONTINUE", "Off");
        }
        assert_eq!(parse_bool("RELAY_AUTO_CONTINUE").unwrap(), Some(false));

        unsafe {
            env::set_var("RELAY_AUTO_CONTINUE", "maybe");
        }
        assert!(parse_bool("RELAY_AUTO_CONTINUE").is_err());

        unsafe {
            env::remove_var("RELAY_AUTO_CONTINUE");
        }
        assert_eq!(parse_bool("RELAY_AUTO_CONTINUE").unwrap(), None);
    }

    #[test]
    #[serial]
    fn test_api_key_falls_back_to_openai_key() {
        unsafe {
            env::remove_var("AZURE_OPENAI_API_KEY");
            env::set_var("OPENAI_API_KEY", "sk-fallback");
        }
        let config = EnvConfig::load().unwrap();
        assert_eq!(config.upstream_api_key.as_deref(), Some("sk-fallback"));

        unsafe {
            env::set_var("AZURE_OPENAI_API_KEY", "azure-key");
        }
        let config = EnvConfig::load().unwrap();
        assert_eq!(config.upstream_api_key.as_deref(), Some("azure-key"));

        unsafe {
            env::remove_var("AZURE_OPENAI_API_KEY");
            env::remove_var("OPENAI_API_KEY");
        }
    }

    #[test]
    #[serial]
    fn test_invalid_number_names_variable() {
        unsafe {
            env::set_var("RELAY_DRAIN_TIMEOUT_SECONDS", "soon");
        }
        let err = EnvConfig::load().unwrap_err();
        assert!(err.contains("RELAY_DRAIN_TIMEOUT_SECONDS"));
        unsafe {
            env::remove_var("RELAY_DRAIN_TIMEOUT_SECONDS");
        }
    }
}
