//! Per-turn ordering of tool results.
//!
//! Everything sent upstream for a turn leaves in the order its calls were
//! opened. A result headed downstream reaches the client as soon as it exists,
//! while its upstream acknowledgment keeps its place in the queue.

use std::collections::{HashMap, VecDeque};

use crate::core::tools::{ToolResult, ToolResultDirection};

use super::error::{RelayError, RelayResult};
use super::tracker::ToolCallRecord;

#[derive(Debug)]
enum SlotState {
    Pending,
    Ready(ToolResult),
}

#[derive(Debug)]
struct Slot {
    record: ToolCallRecord,
    state: SlotState,
}

#[derive(Debug, Default)]
struct TurnQueue {
    slots: VecDeque<Slot>,
    response_done: bool,
    upstream_frames: usize,
}

/// Decision taken when a turn has nothing left to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnCompletion {
    /// Calls are still open, or the service has not finished the response yet.
    Waiting,
    /// Everything is routed and the model received at least one output.
    Resume,
    /// Everything is routed but the model received nothing to continue from.
    Idle,
}

/// Results handed back by [`TurnSequencer::complete`].
#[derive(Debug, Default)]
pub struct Released {
    /// Downstream results to deliver to the client now
    pub immediate: Vec<(ToolCallRecord, ToolResult)>,
    /// Results whose upstream side may now be routed, in call-open order
    pub ordered: Vec<(ToolCallRecord, ToolResult)>,
}

/// Orders tool results within each turn.
#[derive(Debug, Default)]
pub struct TurnSequencer {
    turns: HashMap<String, TurnQueue>,
}

impl TurnSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a call to its turn's queue.
    pub fn open(&mut self, record: ToolCallRecord) {
        self.turns
            .entry(record.turn_id.clone())
            .or_default()
            .slots
            .push_back(Slot {
                record,
                state: SlotState::Pending,
            });
    }

    /// Stores the result of a call and returns everything now ready to route.
    pub fn complete(
        &mut self,
        turn_id: &str,
        call_id: &str,
        result: ToolResult,
    ) -> RelayResult<Released> {
        let queue = self
            .turns
            .get_mut(turn_id)
            .ok_or_else(|| RelayError::UnknownCallId(call_id.to_string()))?;

        let slot = queue
            .slots
            .iter_mut()
            .find(|slot| slot.record.call_id == call_id && matches!(slot.state, SlotState::Pending))
            .ok_or_else(|| RelayError::UnknownCallId(call_id.to_string()))?;

        let mut released = Released::default();
        if result.direction == ToolResultDirection::ToDownstream {
            released.immediate.push((slot.record.clone(), result.clone()));
        }
        slot.state = SlotState::Ready(result);

        while queue
            .slots
            .front()
            .is_some_and(|slot| matches!(slot.state, SlotState::Ready(_)))
        {
            if let Some(Slot {
                record,
                state: SlotState::Ready(result),
            }) = queue.slots.pop_front()
            {
                released.ordered.push((record, result));
            }
        }

        Ok(released)
    }

    /// Counts a frame sent upstream on behalf of `turn_id`.
    pub fn note_upstream_frame(&mut self, turn_id: &str) {
        if let Some(queue) = self.turns.get_mut(turn_id) {
            queue.upstream_frames += 1;
        }
    }

    /// Records that the service finished the response for `turn_id`.
    pub fn mark_response_done(&mut self, turn_id: &str) -> TurnCompletion {
        match self.turns.get_mut(turn_id) {
            Some(queue) => {
                queue.response_done = true;
                self.settle(turn_id)
            }
            None => TurnCompletion::Idle,
        }
    }

    /// Checks whether `turn_id` is finished, forgetting it if so.
    pub fn settle(&mut self, turn_id: &str) -> TurnCompletion {
        let Some(queue) = self.turns.get(turn_id) else {
            return TurnCompletion::Idle;
        };
        if !queue.response_done || !queue.slots.is_empty() {
            return TurnCompletion::Waiting;
        }
        let resume = queue.upstream_frames > 0;
        self.turns.remove(turn_id);
        if resume {
            TurnCompletion::Resume
        } else {
            TurnCompletion::Idle
        }
    }

    /// Calls opened but not yet released in order, across all turns.
    pub fn pending_calls(&self) -> usize {
        self.turns.values().map(|queue| queue.slots.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
