//! Realtime service wire types handled by the relay.
//!
//! Only the events the relay needs to inspect are typed. Every other server event
//! lands in [`ServerEvent::Other`] and is forwarded untouched, so new event types
//! on the service side never break a session.
//!
//! Server events inspected:
//! - session.created / session.updated - session lifecycle and handshake ack
//! - error - service-side error
//! - response.output_item.added / response.output_item.done - function call items
//! - conversation.item.created - item ordering (`previous_item_id`)
//! - response.function_call_arguments.delta / .done - streamed call arguments
//! - response.done - end of a turn
//!
//! Client events produced:
//! - session.update - handshake
//! - conversation.item.create - function call output
//! - response.create - continue after tool results
//!
//! Extension events sent to the client:
//! - extension.middle_tier_tool_response - direct tool result delivery
//! - extension.middle_tier_error - relay-side failure

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FUNCTION_CALL: &str = "function_call";
pub const FUNCTION_CALL_OUTPUT: &str = "function_call_output";

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration sent during the handshake.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Response modalities (text, audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    /// System instructions for the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Voice for audio output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Tool schemas, advertised verbatim
    #[serde(default)]
    pub tools: Vec<Value>,

    /// "auto" when tools are present, "none" otherwise
    pub tool_choice: String,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Output token cap per response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_output_tokens: Option<u32>,
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item, as far as the relay cares about it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationItem {
    /// Item ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Item type
    #[serde(rename = "type")]
    pub item_type: String,
    /// Call ID for function call items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Function name for function call items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Function arguments; a JSON-encoded string on the wire, objects are tolerated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    /// Function output for function call results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ConversationItem {
    pub fn is_function_call(&self) -> bool {
        self.item_type == FUNCTION_CALL
    }

    pub fn is_function_call_output(&self) -> bool {
        self.item_type == FUNCTION_CALL_OUTPUT
    }

    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            item_type: FUNCTION_CALL_OUTPUT.to_string(),
            call_id: Some(call_id.into()),
            output: Some(output.into()),
            ..Default::default()
        }
    }
}

// =============================================================================
// Client Events (sent upstream)
// =============================================================================

/// Events the relay itself sends to the realtime service.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Configure the session
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Add an item (function call output) to the conversation
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    /// Ask the model to continue
    #[serde(rename = "response.create")]
    ResponseCreate,
}

// =============================================================================
// Server Events (received from upstream)
// =============================================================================

/// Server events the relay inspects.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error { error: ApiError },

    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: Value,
    },

    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        session: Value,
    },

    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        #[serde(default)]
        previous_item_id: Option<String>,
        item: ConversationItem,
    },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        #[serde(default)]
        response_id: Option<String>,
        item: ConversationItem,
    },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        #[serde(default)]
        response_id: Option<String>,
        item: ConversationItem,
    },

    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        #[serde(default)]
        call_id: Option<String>,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        #[serde(default)]
        call_id: Option<String>,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseSummary,
    },

    /// Any event the relay forwards without inspecting
    #[serde(other)]
    Other,
}

/// Service error details.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// The parts of a finished response the relay needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

// =============================================================================
// Extension Events (sent downstream)
// =============================================================================

/// Frames the relay originates towards the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ExtensionEvent {
    /// A tool result delivered straight to the client
    #[serde(rename = "extension.middle_tier_tool_response")]
    ToolResponse {
        previous_item_id: Option<String>,
        tool_name: String,
        tool_result: String,
    },

    /// The relay could not serve the session
    #[serde(rename = "extension.middle_tier_error")]
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_function_call_output_serialization() {
        let event = ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output("c1", "[1,2]"),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "conversation.item.create",
                "item": { "type": "function_call_output", "call_id": "c1", "output": "[1,2]" }
            })
        );
    }

    #[test]
    fn test_response_create_serialization() {
        let json = serde_json::to_string(&ClientEvent::ResponseCreate).unwrap();
        assert_eq!(json, r#"{"type":"response.create"}"#);
    }

    #[test]
    fn test_session_update_omits_unset_fields() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                instructions: Some("Be brief.".to_string()),
                tool_choice: "none".to_string(),
                ..Default::default()
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["instructions"], "Be brief.");
        assert_eq!(value["session"]["tools"], json!([]));
        assert!(value["session"].get("voice").is_none());
        assert!(value["session"].get("temperature").is_none());
    }

    #[test]
    fn test_output_item_done_deserialization() {
        let json = r#"{
            "type": "response.output_item.done",
            "event_id": "ev_1",
            "response_id": "resp_1",
            "output_index": 0,
            "item": {
                "id": "item_1",
                "object": "realtime.item",
                "type": "function_call",
                "status": "completed",
                "name": "get_available_locations",
                "call_id": "c1",
                "arguments": "{\"prefered_location\":\"Cologne\"}"
            }
        }"#;
        match serde_json::from_str::<ServerEvent>(json).unwrap() {
            ServerEvent::OutputItemDone { response_id, item } => {
                assert_eq!(response_id.as_deref(), Some("resp_1"));
                assert!(item.is_function_call());
                assert_eq!(item.call_id.as_deref(), Some("c1"));
                assert_eq!(
                    item.arguments,
                    Some(json!("{\"prefered_location\":\"Cologne\"}"))
                );
            }
            other => panic!("Expected OutputItemDone, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_server_event_is_other() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"response.audio.delta","delta":"AAAA"}"#).unwrap();
        assert!(matches!(event, ServerEvent::Other));
    }

    #[test]
    fn test_error_event_deserialization() {
        let json = r#"{"type":"error","error":{"type":"invalid_request_error","code":"bad","message":"nope"}}"#;
        match serde_json::from_str::<ServerEvent>(json).unwrap() {
            ServerEvent::Error { error } => {
                assert_eq!(error.message, "nope");
                assert_eq!(error.code.as_deref(), Some("bad"));
            }
            other => panic!("Expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_response_extension_serialization() {
        let event = ExtensionEvent::ToolResponse {
            previous_item_id: Some("item_0".to_string()),
            tool_name: "show_model_information".to_string(),
            tool_result: "{}".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "extension.middle_tier_tool_response");
        assert_eq!(value["previous_item_id"], "item_0");
        assert_eq!(value["tool_name"], "show_model_information");
    }
}
