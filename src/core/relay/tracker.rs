//! Correlation tracking for in-flight tool calls.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::error::{RelayError, RelayResult};

/// Bookkeeping for one intercepted tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    /// Response that issued the call.
    pub turn_id: String,
    /// Earlier call this one follows up on.
    pub previous_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Conversation item preceding the call item, echoed to the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_item_id: Option<String>,
}

impl ToolCallRecord {
    pub fn new(
        call_id: impl Into<String>,
        turn_id: impl Into<String>,
        previous_call_id: Option<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            turn_id: turn_id.into(),
            previous_call_id,
            tool_name: None,
            previous_item_id: None,
        }
    }

    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    pub fn with_previous_item_id(mut self, item_id: Option<String>) -> Self {
        self.previous_item_id = item_id;
        self
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    live: HashSet<String>,
    /// Every record opened in the session, live or completed, by call id.
    history: HashMap<String, ToolCallRecord>,
}

impl TrackerState {
    /// Predecessors of `start`, nearest first. Bounded by the number of records seen.
    fn walk_from(&self, start: Option<&str>) -> Vec<&ToolCallRecord> {
        let mut chain = Vec::new();
        let mut cursor = start;
        while let Some(call_id) = cursor {
            if chain.len() >= self.history.len() {
                break;
            }
            let Some(record) = self.history.get(call_id) else {
                break;
            };
            chain.push(record);
            cursor = record.previous_call_id.as_deref();
        }
        chain
    }
}

/// Tracks the tool calls of one session.
///
/// Safe to share between the session loop and anything it spawns; every method
/// takes `&self`.
#[derive(Debug, Default)]
pub struct CorrelationTracker {
    state: Mutex<TrackerState>,
}

impl CorrelationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a record for `call_id`.
    ///
    /// Fails when the id is already live, when the predecessor was never seen in
    /// this session, or when the predecessor chain leads back to `call_id`.
    pub fn begin(
        &self,
        call_id: &str,
        turn_id: &str,
        previous_call_id: Option<&str>,
    ) -> RelayResult<ToolCallRecord> {
        self.begin_record(ToolCallRecord::new(
            call_id,
            turn_id,
            previous_call_id.map(str::to_string),
        ))
    }

    /// Same as [`begin`](Self::begin) for a fully populated record.
    pub fn begin_record(&self, record: ToolCallRecord) -> RelayResult<ToolCallRecord> {
        let mut state = self.state.lock();
        let call_id = record.call_id.as_str();

        if state.live.contains(call_id) {
            return Err(RelayError::DuplicateCallId(call_id.to_string()));
        }

        if let Some(previous) = record.previous_call_id.as_deref() {
            let cyclic = || RelayError::CyclicChain {
                call_id: call_id.to_string(),
                previous_call_id: previous.to_string(),
            };

            if previous == call_id {
                return Err(cyclic());
            }
            if !state.history.contains_key(previous) {
                return Err(RelayError::UnknownCallId(previous.to_string()));
            }
            if state
                .walk_from(Some(previous))
                .iter()
                .any(|ancestor| ancestor.call_id == call_id)
            {
                return Err(cyclic());
            }
        }

        debug!(
            call_id = %record.call_id,
            turn_id = %record.turn_id,
            previous_call_id = ?record.previous_call_id,
            "Tool call opened"
        );
        state.live.insert(record.call_id.clone());
        state
            .history
            .insert(record.call_id.clone(), record.clone());
        Ok(record)
    }

    /// Closes a live record. Completing the same call twice fails.
    pub fn complete(&self, call_id: &str) -> RelayResult<ToolCallRecord> {
        let mut state = self.state.lock();
        if !state.live.remove(call_id) {
            return Err(RelayError::UnknownCallId(call_id.to_string()));
        }
        debug!(call_id = %call_id, "Tool call completed");
        state
            .history
            .get(call_id)
            .cloned()
            .ok_or_else(|| RelayError::UnknownCallId(call_id.to_string()))
    }

    /// Root of the chain `call_id` belongs to, or `None` when it chains from nothing.
    pub fn chain_of(&self, call_id: &str) -> Option<ToolCallRecord> {
        self.chain(call_id).pop()
    }

    /// Every predecessor of `call_id`, nearest first.
    pub fn chain(&self, call_id: &str) -> Vec<ToolCallRecord> {
        let state = self.state.lock();
        let start = state
            .history
            .get(call_id)
            .and_then(|record| record.previous_call_id.as_deref());
        state.walk_from(start).into_iter().cloned().collect()
    }

    pub fn get(&self, call_id: &str) -> Option<ToolCallRecord> {
        self.state.lock().history.get(call_id).cloned()
    }

    pub fn is_live(&self, call_id: &str) -> bool {
        self.state.lock().live.contains(call_id)
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Live call ids, sorted.
    pub fn live_calls(&self) -> Vec<String> {
        let mut calls: Vec<String> = self.state.lock().live.iter().cloned().collect();
        calls.sort();
        calls
    }

    /// Drops every live record, returning the ids that were still open.
    pub fn clear_live(&self) -> Vec<String> {
        let mut state = self.state.lock();
        let mut drained: Vec<String> = state.live.drain().collect();
        drained.sort();
        drained
    }
}
