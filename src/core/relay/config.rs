use std::time::Duration;

use crate::core::tools::ToolRegistry;

use super::messages::SessionConfig;

/// Default wait for the upstream session acknowledgment.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default grace period for in-flight tool calls once a side closes.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Default cap on a single tool handler invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-session relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Instructions sent to the model during the handshake
    pub system_message: Option<String>,
    /// Voice for audio output
    pub voice: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Output token cap per response
    pub max_response_output_tokens: Option<u32>,
    /// Restrict responses to text
    pub disable_audio: bool,
    /// Reapply instructions and tools to client `session.update` frames
    pub enforce_client_session: bool,

    pub connect_timeout: Duration,
    pub drain_timeout: Duration,
    pub tool_timeout: Duration,

    /// Send an empty function output upstream for results delivered to the client
    pub acknowledge_downstream_results: bool,
    /// Send `response.create` once a turn's tool outputs are all routed
    pub auto_continue: bool,
    /// Hide instructions and tools in session events forwarded to the client
    pub redact_session_details: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            system_message: None,
            voice: None,
            temperature: None,
            max_response_output_tokens: None,
            disable_audio: false,
            enforce_client_session: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            acknowledge_downstream_results: true,
            auto_continue: true,
            redact_session_details: true,
        }
    }
}

impl RelayConfig {
    /// Session configuration advertised upstream during the handshake.
    pub fn session_config(&self, registry: &ToolRegistry) -> SessionConfig {
        let tools: Vec<_> = registry
            .schemas()
            .into_iter()
            .map(|tool| tool.schema)
            .collect();
        let tool_choice = if tools.is_empty() { "none" } else { "auto" };

        SessionConfig {
            modalities: self.disable_audio.then(|| vec!["text".to_string()]),
            instructions: self.system_message.clone(),
            voice: self.voice.clone(),
            tools,
            tool_choice: tool_choice.to_string(),
            temperature: self.temperature,
            max_response_output_tokens: self.max_response_output_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tools::ToolResult;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.drain_timeout, Duration::from_secs(5));
        assert_eq!(config.tool_timeout, Duration::from_secs(30));
        assert!(config.acknowledge_downstream_results);
        assert!(config.auto_continue);
        assert!(config.redact_session_details);
        assert!(!config.enforce_client_session);
    }

    #[test]
    fn test_session_config_advertises_tools_in_order() {
        let mut registry = ToolRegistry::new();
        for name in ["second", "first"] {
            registry
                .register(name, json!({ "description": name }), |_, _| async {
                    Ok(ToolResult::to_upstream("x"))
                })
                .unwrap();
        }
        let config = RelayConfig {
            system_message: Some("You rent cars.".to_string()),
            disable_audio: true,
            ..Default::default()
        };

        let session = config.session_config(&registry);
        assert_eq!(session.instructions.as_deref(), Some("You rent cars."));
        assert_eq!(session.tool_choice, "auto");
        assert_eq!(session.modalities, Some(vec!["text".to_string()]));
        let names: Vec<_> = session.tools.iter().map(|t| t["name"].clone()).collect();
        assert_eq!(names, vec![json!("second"), json!("first")]);
    }

    #[test]
    fn test_session_config_without_tools() {
        let session = RelayConfig::default().session_config(&ToolRegistry::new());
        assert_eq!(session.tool_choice, "none");
        assert!(session.tools.is_empty());
        assert!(session.modalities.is_none());
    }
}
