//! Classification of upstream frames and serialization of relay-originated frames.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::core::tools::{ToolResult, ToolResultDirection};

use super::error::{RelayError, RelayResult};
use super::messages::{
    ClientEvent, ConversationItem, ExtensionEvent, FUNCTION_CALL, ServerEvent, SessionConfig,
};
use super::tracker::ToolCallRecord;

/// A tool call extracted from an upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Value,
    pub call_id: String,
    pub turn_id: String,
    pub item_id: Option<String>,
    pub previous_item_id: Option<String>,
    pub previous_call_id: Option<String>,
}

impl ToolCallRequest {
    /// Tracker record describing this call.
    pub fn record(&self) -> ToolCallRecord {
        ToolCallRecord::new(&self.call_id, &self.turn_id, self.previous_call_id.clone())
            .with_tool_name(&self.name)
            .with_previous_item_id(self.previous_item_id.clone())
    }
}

/// Upstream frames that are swallowed by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressedKind {
    FunctionCallItem,
    FunctionCallOutputItem,
    ArgumentsDelta,
    ArgumentsDone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionControlKind {
    SessionCreated,
    SessionUpdated,
    ResponseDone { turn_id: Option<String> },
    Error { code: Option<String>, message: String },
}

/// Classified upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// Forward downstream byte-for-byte.
    Passthrough(String),
    ToolCallRequested(ToolCallRequest),
    /// A call whose arguments could not be decoded. Answered with an error result.
    MalformedToolCall {
        request: ToolCallRequest,
        reason: String,
    },
    Suppressed(SuppressedKind),
    /// Lifecycle event, with the text to forward downstream (if any).
    SessionControl {
        kind: SessionControlKind,
        forward: Option<String>,
    },
}

/// Stateful per-session translator.
///
/// Remembers which conversation items belong to which calls, so a call item
/// that directly follows an earlier call (or its output) can be linked to it.
#[derive(Debug, Default)]
pub struct MessageTranslator {
    redact_session_details: bool,
    /// item id -> call id, for function call and function call output items
    call_items: HashMap<String, String>,
    /// item id -> previous item id, for function call items
    item_parents: HashMap<String, Option<String>>,
}

impl MessageTranslator {
    pub fn new(redact_session_details: bool) -> Self {
        Self {
            redact_session_details,
            ..Default::default()
        }
    }

    /// Classifies one upstream text frame.
    ///
    /// Fails only when the frame is not a JSON object with a string `type`.
    /// Unknown or unexpectedly shaped events come back as
    /// [`UpstreamEvent::Passthrough`].
    pub fn parse_upstream_frame(&mut self, raw: &str) -> RelayResult<UpstreamEvent> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| RelayError::ProtocolDecode(format!("invalid JSON: {e}")))?;

        let Some(event_type) = value.get("type").and_then(Value::as_str) else {
            return Err(RelayError::ProtocolDecode(
                "frame has no string `type` field".to_string(),
            ));
        };

        let event = match ServerEvent::deserialize(&value) {
            Ok(event) => event,
            Err(e) => {
                debug!(event_type, error = %e, "Unexpected event shape, forwarding unchanged");
                return Ok(UpstreamEvent::Passthrough(raw.to_owned()));
            }
        };

        let classified = match event {
            ServerEvent::Other => UpstreamEvent::Passthrough(raw.to_owned()),

            ServerEvent::SessionCreated { .. } => UpstreamEvent::SessionControl {
                kind: SessionControlKind::SessionCreated,
                forward: Some(self.redact_session(value, raw)),
            },

            ServerEvent::SessionUpdated { .. } => UpstreamEvent::SessionControl {
                kind: SessionControlKind::SessionUpdated,
                forward: Some(self.redact_session(value, raw)),
            },

            ServerEvent::Error { error } => UpstreamEvent::SessionControl {
                kind: SessionControlKind::Error {
                    code: error.code,
                    message: error.message,
                },
                forward: Some(raw.to_owned()),
            },

            ServerEvent::OutputItemAdded { item, .. } if item.is_function_call() => {
                self.remember_call_item(&item);
                UpstreamEvent::Suppressed(SuppressedKind::FunctionCallItem)
            }

            ServerEvent::ConversationItemCreated {
                previous_item_id,
                item,
            } => {
                if item.is_function_call() {
                    if let Some(id) = &item.id {
                        self.item_parents.insert(id.clone(), previous_item_id);
                    }
                    self.remember_call_item(&item);
                    UpstreamEvent::Suppressed(SuppressedKind::FunctionCallItem)
                } else if item.is_function_call_output() {
                    self.remember_call_item(&item);
                    UpstreamEvent::Suppressed(SuppressedKind::FunctionCallOutputItem)
                } else {
                    UpstreamEvent::Passthrough(raw.to_owned())
                }
            }

            ServerEvent::FunctionCallArgumentsDelta { .. } => {
                UpstreamEvent::Suppressed(SuppressedKind::ArgumentsDelta)
            }

            ServerEvent::FunctionCallArgumentsDone { .. } => {
                UpstreamEvent::Suppressed(SuppressedKind::ArgumentsDone)
            }

            ServerEvent::OutputItemDone { response_id, item } if item.is_function_call() => {
                self.tool_call(response_id, item)?
            }

            ServerEvent::ResponseDone { response } => UpstreamEvent::SessionControl {
                kind: SessionControlKind::ResponseDone {
                    turn_id: response.id,
                },
                forward: Some(strip_function_calls(value, raw)),
            },

            ServerEvent::OutputItemAdded { .. } | ServerEvent::OutputItemDone { .. } => {
                UpstreamEvent::Passthrough(raw.to_owned())
            }
        };

        Ok(classified)
    }

    /// Applies the server-controlled session fields to a client `session.update`.
    ///
    /// Returns `None` for every other frame, which is then forwarded unchanged.
    pub fn rewrite_client_frame(&self, raw: &str, session: &SessionConfig) -> Option<String> {
        let mut value: Value = serde_json::from_str(raw).ok()?;
        if value.get("type").and_then(Value::as_str) != Some("session.update") {
            return None;
        }

        let fields = value
            .as_object_mut()?
            .entry("session")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()?;

        match &session.instructions {
            Some(instructions) => {
                fields.insert("instructions".to_string(), json!(instructions));
            }
            None => {
                fields.remove("instructions");
            }
        }
        fields.insert("tools".to_string(), json!(session.tools));
        fields.insert("tool_choice".to_string(), json!(session.tool_choice));

        Some(value.to_string())
    }

    fn remember_call_item(&mut self, item: &ConversationItem) {
        if let (Some(id), Some(call_id)) = (&item.id, &item.call_id) {
            self.call_items.insert(id.clone(), call_id.clone());
        }
    }

    fn tool_call(
        &mut self,
        response_id: Option<String>,
        item: ConversationItem,
    ) -> RelayResult<UpstreamEvent> {
        let call_id = item.call_id.clone().ok_or_else(|| {
            RelayError::ProtocolDecode("function_call item without call_id".to_string())
        })?;
        let name = item.name.clone().ok_or_else(|| {
            RelayError::ProtocolDecode(format!("function_call item {call_id} without name"))
        })?;

        self.remember_call_item(&item);

        let previous_item_id = item
            .id
            .as_ref()
            .and_then(|id| self.item_parents.get(id).cloned().flatten());
        let previous_call_id = previous_item_id
            .as_ref()
            .and_then(|previous| self.call_items.get(previous).cloned());

        let mut request = ToolCallRequest {
            name,
            arguments: Value::Object(Map::new()),
            turn_id: response_id.unwrap_or_else(|| call_id.clone()),
            call_id,
            item_id: item.id,
            previous_item_id,
            previous_call_id,
        };

        match decode_arguments(item.arguments) {
            Ok(arguments) => {
                request.arguments = arguments;
                Ok(UpstreamEvent::ToolCallRequested(request))
            }
            Err(reason) => Ok(UpstreamEvent::MalformedToolCall { request, reason }),
        }
    }

    fn redact_session(&self, mut value: Value, raw: &str) -> String {
        if !self.redact_session_details {
            return raw.to_owned();
        }
        let Some(session) = value.get_mut("session").and_then(Value::as_object_mut) else {
            return raw.to_owned();
        };
        session.insert("instructions".to_string(), json!(""));
        session.insert("tools".to_string(), json!([]));
        session.insert("tool_choice".to_string(), json!("none"));
        value.to_string()
    }
}

/// Arguments arrive as a JSON-encoded string; an empty string means no arguments.
fn decode_arguments(arguments: Option<Value>) -> Result<Value, String> {
    match arguments {
        None => Ok(Value::Object(Map::new())),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(Value::Object(Map::new())),
        Some(Value::String(text)) => {
            serde_json::from_str(&text).map_err(|e| format!("arguments are not valid JSON: {e}"))
        }
        Some(other) => Ok(other),
    }
}

/// Removes function call entries from a `response.done` frame's output list.
fn strip_function_calls(mut value: Value, raw: &str) -> String {
    let Some(output) = value
        .pointer_mut("/response/output")
        .and_then(Value::as_array_mut)
    else {
        return raw.to_owned();
    };

    let before = output.len();
    output.retain(|item| item.get("type").and_then(Value::as_str) != Some(FUNCTION_CALL));
    if output.len() == before {
        raw.to_owned()
    } else {
        value.to_string()
    }
}

// =============================================================================
// Outbound Frames
// =============================================================================

/// Upstream frame for a routed result.
///
/// Upstream results become a `function_call_output` item carrying the payload.
/// Downstream results become an empty `function_call_output` when
/// `acknowledge_downstream` is set, and nothing otherwise.
pub fn serialize_upstream_output(
    result: &ToolResult,
    record: &ToolCallRecord,
    acknowledge_downstream: bool,
) -> RelayResult<Option<String>> {
    match result.direction {
        ToolResultDirection::ToUpstream => {
            function_output(&record.call_id, result.payload_text()).map(Some)
        }
        ToolResultDirection::ToDownstream if acknowledge_downstream => {
            function_output(&record.call_id, String::new()).map(Some)
        }
        ToolResultDirection::ToDownstream => Ok(None),
    }
}

/// Client frame for a downstream result, `None` for upstream results.
pub fn serialize_downstream_response(
    result: &ToolResult,
    record: &ToolCallRecord,
) -> RelayResult<Option<String>> {
    match result.direction {
        ToolResultDirection::ToUpstream => Ok(None),
        ToolResultDirection::ToDownstream => {
            Ok(Some(serde_json::to_string(&ExtensionEvent::ToolResponse {
                previous_item_id: record.previous_item_id.clone(),
                tool_name: record.tool_name.clone().unwrap_or_default(),
                tool_result: result.payload_text(),
            })?))
        }
    }
}

/// Error result for a call that never got a tracker record.
pub fn rejected_call_output(call_id: &str, message: &str) -> RelayResult<String> {
    function_output(call_id, ToolResult::error(message).payload_text())
}

pub fn session_update_frame(session: &SessionConfig) -> RelayResult<String> {
    Ok(serde_json::to_string(&ClientEvent::SessionUpdate {
        session: session.clone(),
    })?)
}

pub fn response_create_frame() -> RelayResult<String> {
    Ok(serde_json::to_string(&ClientEvent::ResponseCreate)?)
}

pub fn extension_error_frame(code: &str, message: &str) -> RelayResult<String> {
    Ok(serde_json::to_string(&ExtensionEvent::Error {
        code: code.to_string(),
        message: message.to_string(),
    })?)
}

fn function_output(call_id: &str, output: String) -> RelayResult<String> {
    Ok(serde_json::to_string(&ClientEvent::ConversationItemCreate {
        item: ConversationItem::function_call_output(call_id, output),
    })?)
}
