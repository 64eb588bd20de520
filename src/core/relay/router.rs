//! Delivery of tool results to the side that asked for them.

use std::collections::HashSet;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::tools::ToolResult;

use super::error::{RelayError, RelayResult};
use super::transport::{Frame, TransportError};
use super::translator::{
    rejected_call_output, serialize_downstream_response, serialize_upstream_output,
};
use super::tracker::ToolCallRecord;

/// Frames emitted for one routed result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteReport {
    pub upstream_frames: usize,
    pub downstream_frames: usize,
}

/// Routes each tool result exactly once per live call.
///
/// Holds the same outbound queues the session forwards through, so routed
/// frames interleave with relayed traffic in the order they were produced.
/// A call id becomes routable again after [`ResultRouter::release`], matching
/// the tracker, which accepts a call id again once its record completes.
pub struct ResultRouter {
    upstream: mpsc::Sender<Frame>,
    downstream: mpsc::Sender<Frame>,
    acknowledge_downstream: bool,
    routed: Mutex<HashSet<String>>,
    delivered: Mutex<HashSet<String>>,
}

impl ResultRouter {
    pub fn new(
        upstream: mpsc::Sender<Frame>,
        downstream: mpsc::Sender<Frame>,
        acknowledge_downstream: bool,
    ) -> Self {
        Self {
            upstream,
            downstream,
            acknowledge_downstream,
            routed: Mutex::new(HashSet::new()),
            delivered: Mutex::new(HashSet::new()),
        }
    }

    /// Sends the client side of a downstream result.
    ///
    /// Upstream results produce nothing here. A second delivery for the same
    /// call fails with [`RelayError::AlreadyRouted`].
    pub async fn deliver(
        &self,
        result: &ToolResult,
        record: &ToolCallRecord,
    ) -> RelayResult<RouteReport> {
        let Some(text) = serialize_downstream_response(result, record)? else {
            return Ok(RouteReport::default());
        };
        if !self.delivered.lock().insert(record.call_id.clone()) {
            return Err(RelayError::AlreadyRouted(record.call_id.clone()));
        }

        send(&self.downstream, text).await?;
        info!(
            call_id = %record.call_id,
            turn_id = %record.turn_id,
            tool = record.tool_name.as_deref().unwrap_or_default(),
            "Tool result delivered to client"
        );
        Ok(RouteReport {
            upstream_frames: 0,
            downstream_frames: 1,
        })
    }

    /// Sends the upstream side of `result`: the output itself, or the empty
    /// acknowledgment for a downstream result when acknowledgments are on.
    ///
    /// A second route for the same call fails with
    /// [`RelayError::AlreadyRouted`] and sends nothing.
    pub async fn route(
        &self,
        result: &ToolResult,
        record: &ToolCallRecord,
    ) -> RelayResult<RouteReport> {
        if !self.routed.lock().insert(record.call_id.clone()) {
            return Err(RelayError::AlreadyRouted(record.call_id.clone()));
        }

        let mut report = RouteReport::default();
        if let Some(text) = serialize_upstream_output(result, record, self.acknowledge_downstream)? {
            send(&self.upstream, text).await?;
            report.upstream_frames += 1;
        }

        info!(
            call_id = %record.call_id,
            turn_id = %record.turn_id,
            tool = record.tool_name.as_deref().unwrap_or_default(),
            direction = %result.direction,
            is_error = result.is_error(),
            "Tool result routed"
        );
        Ok(report)
    }

    /// Answers a call that cannot be served normally with an error output.
    ///
    /// The call id is not marked as routed.
    pub async fn reject(&self, call_id: &str, message: &str) -> RelayResult<()> {
        debug!(call_id = %call_id, reason = %message, "Rejecting tool call");
        send(&self.upstream, rejected_call_output(call_id, message)?).await
    }

    /// Forgets a call once its record has completed.
    pub fn release(&self, call_id: &str) {
        self.routed.lock().remove(call_id);
        self.delivered.lock().remove(call_id);
    }

    pub fn is_routed(&self, call_id: &str) -> bool {
        self.routed.lock().contains(call_id)
    }
}

async fn send(queue: &mpsc::Sender<Frame>, text: String) -> RelayResult<()> {
    queue
        .send(Frame::Text(text))
        .await
        .map_err(|_| RelayError::Transport(TransportError::Closed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn router(acknowledge: bool) -> (ResultRouter, mpsc::Receiver<Frame>, mpsc::Receiver<Frame>) {
        let (up_tx, up_rx) = mpsc::channel(16);
        let (down_tx, down_rx) = mpsc::channel(16);
        (ResultRouter::new(up_tx, down_tx, acknowledge), up_rx, down_rx)
    }

    fn parse(frame: Frame) -> Value {
        serde_json::from_str(frame.as_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_upstream_result_goes_upstream_only() {
        let (router, mut up, mut down) = router(true);
        let record = ToolCallRecord::new("c1", "t1", None).with_tool_name("get_available_cars");
        let result = ToolResult::to_upstream(json!([1, 2]));

        assert_eq!(
            router.deliver(&result, &record).await.unwrap(),
            RouteReport::default()
        );
        let report = router.route(&result, &record).await.unwrap();
        assert_eq!(
            report,
            RouteReport {
                upstream_frames: 1,
                downstream_frames: 0
            }
        );

        let frame = parse(up.try_recv().unwrap());
        assert_eq!(frame["item"]["call_id"], "c1");
        assert_eq!(frame["item"]["output"], "[1,2]");
        assert!(down.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_downstream_result_with_ack() {
        let (router, mut up, mut down) = router(true);
        let record = ToolCallRecord::new("c1", "t1", None).with_tool_name("show_final_details");
        let result = ToolResult::to_downstream(json!({ "car_model": "Compact" }));

        let report = router.deliver(&result, &record).await.unwrap();
        assert_eq!(report.downstream_frames, 1);
        assert!(up.try_recv().is_err());

        let frame = parse(down.try_recv().unwrap());
        assert_eq!(frame["type"], "extension.middle_tier_tool_response");
        assert_eq!(frame["tool_name"], "show_final_details");

        // The acknowledgment goes out separately, when the turn reaches it
        let report = router.route(&result, &record).await.unwrap();
        assert_eq!(report.upstream_frames, 1);
        assert_eq!(parse(up.try_recv().unwrap())["item"]["output"], "");
        assert!(down.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_downstream_result_without_ack() {
        let (router, mut up, mut down) = router(false);
        let record = ToolCallRecord::new("c1", "t1", None);
        let result = ToolResult::to_downstream(json!("hi"));

        router.deliver(&result, &record).await.unwrap();
        let report = router.route(&result, &record).await.unwrap();
        assert_eq!(report.upstream_frames, 0);
        assert!(down.try_recv().is_ok());
        assert!(up.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_route_fails() {
        let (router, mut up, mut down) = router(true);
        let record = ToolCallRecord::new("c1", "t1", None);

        router
            .route(&ToolResult::to_upstream(json!(1)), &record)
            .await
            .unwrap();
        assert!(router.is_routed("c1"));
        assert_eq!(
            router
                .route(&ToolResult::to_upstream(json!(2)), &record)
                .await,
            Err(RelayError::AlreadyRouted("c1".to_string()))
        );
        assert!(up.try_recv().is_ok());
        assert!(up.try_recv().is_err());

        let shown = ToolResult::to_downstream(json!("card"));
        router.deliver(&shown, &record).await.unwrap();
        assert_eq!(
            router.deliver(&shown, &record).await,
            Err(RelayError::AlreadyRouted("c1".to_string()))
        );
        assert!(down.try_recv().is_ok());
        assert!(down.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_released_call_id_routes_again() {
        let (router, mut up, _down) = router(true);
        let first = ToolCallRecord::new("call_1", "resp_1", None);
        router
            .route(&ToolResult::to_upstream(json!(1)), &first)
            .await
            .unwrap();
        router.release("call_1");
        assert!(!router.is_routed("call_1"));

        let second = ToolCallRecord::new("call_1", "resp_2", None);
        router
            .route(&ToolResult::to_upstream(json!(2)), &second)
            .await
            .unwrap();

        assert_eq!(parse(up.try_recv().unwrap())["item"]["output"], "1");
        assert_eq!(parse(up.try_recv().unwrap())["item"]["output"], "2");
    }

    #[tokio::test]
    async fn test_reject_sends_error_output() {
        let (router, mut up, _down) = router(true);
        router.reject("c7", "Call id already in flight: c7").await.unwrap();

        let frame = parse(up.try_recv().unwrap());
        assert_eq!(frame["item"]["call_id"], "c7");
        assert_eq!(
            frame["item"]["output"],
            r#"{"error":"Call id already in flight: c7"}"#
        );
        assert!(!router.is_routed("c7"));
    }

    #[tokio::test]
    async fn test_closed_queue_is_transport_error() {
        let (router, up, _down) = router(true);
        drop(up);
        let record = ToolCallRecord::new("c1", "t1", None);
        assert_eq!(
            router
                .route(&ToolResult::to_upstream(json!(1)), &record)
                .await,
            Err(RelayError::Transport(TransportError::Closed))
        );
    }
}
