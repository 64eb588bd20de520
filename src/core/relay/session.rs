//! Relay session state machine.
//!
//! ```text
//! CONNECTING ──ack──> ACTIVE ──close──> DRAINING ──> CLOSED
//!      │                 │                             ^
//!      └──error/timeout──┴──error──> FAILED ───────────┘
//! ```
//!
//! A session owns both connections. Frames from the client are forwarded
//! upstream untouched. Frames from the service are classified by the
//! [`MessageTranslator`]; tool calls are dispatched to the registry on a
//! [`JoinSet`] so the pump loop never waits on a handler, and their results are
//! released through the [`TurnSequencer`] to the [`ResultRouter`].

use std::fmt;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::tools::{ToolContext, ToolRegistry, ToolResult, invoke_isolated};
use crate::core::upstream::UpstreamConnector;

use super::config::RelayConfig;
use super::error::{RelayError, RelayResult};
use super::messages::SessionConfig;
use super::router::ResultRouter;
use super::sequencer::{TurnCompletion, TurnSequencer};
use super::tracker::{CorrelationTracker, ToolCallRecord};
use super::translator::{
    MessageTranslator, SessionControlKind, ToolCallRequest, UpstreamEvent, extension_error_frame,
    rejected_call_output, response_create_frame, session_update_frame,
};
use super::transport::{Connection, Frame, FrameSink, FrameStream, TransportError};

/// Frames buffered per direction between the session loop and a socket writer.
const OUTBOUND_CAPACITY: usize = 256;

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Draining,
    Failed,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Draining => "draining",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The side of the session a frame or close came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Upstream,
    Downstream,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Upstream => f.write_str("upstream"),
            Side::Downstream => f.write_str("downstream"),
        }
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub session_id: String,
    /// Every state the session went through, in order
    pub transitions: Vec<SessionState>,
    /// The side that closed a session ending gracefully
    pub closed_by: Option<Side>,
    /// What ended a failed session
    pub failure: Option<RelayError>,
    pub tools_dispatched: usize,
    pub tool_errors: usize,
    pub decode_errors: usize,
    /// Results that completed after a close and were dropped
    pub discarded_results: usize,
    /// Handlers aborted when the grace period ran out
    pub cancelled_calls: usize,
}

impl SessionReport {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            transitions: Vec::new(),
            closed_by: None,
            failure: None,
            tools_dispatched: 0,
            tool_errors: 0,
            decode_errors: 0,
            discarded_results: 0,
            cancelled_calls: 0,
        }
    }

    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

enum Exit {
    Closed(Side),
    Failed(RelayError),
}

// =============================================================================
// Session
// =============================================================================

/// One relay session between a client and the realtime service.
pub struct RelaySession {
    id: String,
    config: Arc<RelayConfig>,
    registry: Arc<ToolRegistry>,
    tracker: Arc<CorrelationTracker>,
    state: watch::Sender<SessionState>,
}

impl RelaySession {
    pub fn new(config: Arc<RelayConfig>, registry: Arc<ToolRegistry>) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            id: Uuid::new_v4().to_string(),
            config,
            registry,
            tracker: Arc::new(CorrelationTracker::new()),
            state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch the session's state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn tracker(&self) -> Arc<CorrelationTracker> {
        Arc::clone(&self.tracker)
    }

    /// Runs the session to completion.
    ///
    /// Never fails: every error ends in a deliberate transition to `CLOSED`,
    /// described by the returned report.
    pub async fn run(
        self,
        downstream: Connection,
        connector: Arc<dyn UpstreamConnector>,
    ) -> SessionReport {
        let mut report = SessionReport::new(self.id.clone());
        report.transitions.push(SessionState::Connecting);
        info!(
            session_id = %self.id,
            upstream = %connector.describe(),
            tools = self.registry.len(),
            "Relay session starting"
        );

        let (down_sink, down_stream) = downstream.split();
        let (down_tx, down_rx) = mpsc::channel::<Frame>(OUTBOUND_CAPACITY);
        let down_writer = tokio::spawn(write_frames(down_rx, down_sink, Side::Downstream));

        let session_config = self.config.session_config(&self.registry);
        let mut translator = MessageTranslator::new(self.config.redact_session_details);

        let handshake = self.handshake(
            connector.as_ref(),
            &session_config,
            &mut translator,
            &down_tx,
        );
        let upstream = match timeout(self.config.connect_timeout, handshake).await {
            Ok(Ok(upstream)) => upstream,
            Ok(Err(e)) => {
                self.fail_before_active(e, &down_tx, &mut report).await;
                self.finish(down_tx, down_writer, None, &mut report).await;
                return report;
            }
            Err(_) => {
                let e = RelayError::HandshakeTimeout(self.config.connect_timeout);
                self.fail_before_active(e, &down_tx, &mut report).await;
                self.finish(down_tx, down_writer, None, &mut report).await;
                return report;
            }
        };

        let (up_sink, up_stream) = upstream;
        let (up_tx, up_rx) = mpsc::channel::<Frame>(OUTBOUND_CAPACITY);
        let up_writer = tokio::spawn(write_frames(up_rx, up_sink, Side::Upstream));

        self.transition(SessionState::Active, &mut report);

        let mut pump = Pump {
            session_id: self.id.clone(),
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            tracker: Arc::clone(&self.tracker),
            session_config,
            translator,
            sequencer: TurnSequencer::new(),
            router: ResultRouter::new(
                up_tx.clone(),
                down_tx.clone(),
                self.config.acknowledge_downstream_results,
            ),
            upstream: up_tx.clone(),
            downstream: down_tx.clone(),
            handlers: JoinSet::new(),
            report: &mut report,
        };

        let exit = pump.run(up_stream, down_stream).await;
        let mut handlers = std::mem::take(&mut pump.handlers);
        drop(pump);

        match exit {
            Exit::Closed(side) => {
                report.closed_by = Some(side);
                self.transition(SessionState::Draining, &mut report);
                self.drain(&mut handlers, side, &mut report).await;
            }
            Exit::Failed(e) => {
                error!(session_id = %self.id, error = %e, "Relay session failed");
                self.transition(SessionState::Failed, &mut report);
                report.cancelled_calls += handlers.len();
                handlers.shutdown().await;
                let cancelled = self.tracker.clear_live();
                if !cancelled.is_empty() {
                    debug!(session_id = %self.id, calls = ?cancelled, "Cancelled in-flight tool calls");
                }
                send_error(&down_tx, "session_failed", &e.to_string()).await;
                report.failure = Some(e);
            }
        }

        let _ = up_tx.send(Frame::Close).await;
        drop(up_tx);
        self.finish(down_tx, down_writer, Some(up_writer), &mut report)
            .await;
        report
    }

    /// Connects upstream, sends the session configuration and waits for the
    /// acknowledgment. Frames arriving before the ack are relayed as usual;
    /// tool calls among them are answered with an error output.
    async fn handshake(
        &self,
        connector: &dyn UpstreamConnector,
        session_config: &SessionConfig,
        translator: &mut MessageTranslator,
        downstream: &mpsc::Sender<Frame>,
    ) -> RelayResult<(FrameSink, FrameStream)> {
        let (mut sink, mut stream) = connector.connect().await?.split();

        sink.send(Frame::Text(session_update_frame(session_config)?))
            .await?;
        debug!(
            session_id = %self.id,
            tools = session_config.tools.len(),
            "Session configuration sent upstream"
        );

        loop {
            let frame = match stream.next().await {
                Some(Ok(Frame::Close)) | None => {
                    return Err(RelayError::HandshakeRejected(
                        "upstream closed during handshake".to_string(),
                    ));
                }
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(e.into()),
            };

            let raw = match frame {
                Frame::Text(raw) => raw,
                other => {
                    forward(downstream, other).await?;
                    continue;
                }
            };

            match translator.parse_upstream_frame(&raw) {
                Ok(UpstreamEvent::SessionControl { kind, forward: text }) => {
                    if let SessionControlKind::Error { code, message } = kind {
                        warn!(session_id = %self.id, code = ?code, message = %message, "Upstream rejected session");
                        return Err(RelayError::HandshakeRejected(message));
                    }
                    if let Some(text) = text {
                        forward(downstream, Frame::Text(text)).await?;
                    }
                    if kind == SessionControlKind::SessionUpdated {
                        info!(session_id = %self.id, "Upstream acknowledged session");
                        return Ok((sink, stream));
                    }
                }
                Ok(UpstreamEvent::Passthrough(raw)) => {
                    forward(downstream, Frame::Text(raw)).await?;
                }
                Ok(
                    UpstreamEvent::ToolCallRequested(request)
                    | UpstreamEvent::MalformedToolCall { request, .. },
                ) => {
                    warn!(
                        session_id = %self.id,
                        call_id = %request.call_id,
                        tool = %request.name,
                        "Tool call before session acknowledgment"
                    );
                    let output =
                        rejected_call_output(&request.call_id, "Session is not configured yet")?;
                    sink.send(Frame::Text(output)).await?;
                }
                Ok(other) => {
                    debug!(session_id = %self.id, event = ?other, "Ignoring event before session acknowledgment");
                }
                Err(e) => {
                    warn!(session_id = %self.id, error = %e, "Dropping undecodable frame");
                }
            }
        }
    }

    async fn fail_before_active(
        &self,
        e: RelayError,
        downstream: &mpsc::Sender<Frame>,
        report: &mut SessionReport,
    ) {
        error!(session_id = %self.id, error = %e, "Upstream handshake failed");
        self.transition(SessionState::Failed, report);
        send_error(downstream, "upstream_unavailable", &e.to_string()).await;
        report.failure = Some(e);
    }

    /// Lets in-flight handlers finish within the grace period, dropping their
    /// results, then aborts whatever is left.
    async fn drain(
        &self,
        handlers: &mut JoinSet<(ToolCallRecord, ToolResult)>,
        closed_by: Side,
        report: &mut SessionReport,
    ) {
        info!(
            session_id = %self.id,
            closed_by = %closed_by,
            in_flight = handlers.len(),
            "Draining session"
        );

        let deadline = sleep(self.config.drain_timeout);
        tokio::pin!(deadline);

        while !handlers.is_empty() {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(
                        session_id = %self.id,
                        remaining = handlers.len(),
                        "Drain timeout reached, cancelling tool calls"
                    );
                    report.cancelled_calls += handlers.len();
                    handlers.shutdown().await;
                    break;
                }
                Some(joined) = handlers.join_next() => {
                    if let Ok((record, result)) = joined {
                        report.discarded_results += 1;
                        warn!(
                            session_id = %self.id,
                            call_id = %record.call_id,
                            direction = %result.direction,
                            "Discarding tool result completed after close"
                        );
                    }
                }
            }
        }

        self.tracker.clear_live();
    }

    /// Closes the client side, waits for both writers and enters `CLOSED`.
    async fn finish(
        &self,
        down_tx: mpsc::Sender<Frame>,
        down_writer: JoinHandle<()>,
        up_writer: Option<JoinHandle<()>>,
        report: &mut SessionReport,
    ) {
        let _ = down_tx.send(Frame::Close).await;
        drop(down_tx);

        for writer in std::iter::once(down_writer).chain(up_writer) {
            let abort = writer.abort_handle();
            if timeout(self.config.drain_timeout, writer).await.is_err() {
                abort.abort();
            }
        }

        self.transition(SessionState::Closed, report);
        info!(
            session_id = %self.id,
            tools_dispatched = report.tools_dispatched,
            tool_errors = report.tool_errors,
            decode_errors = report.decode_errors,
            failed = report.failed(),
            "Relay session closed"
        );
    }

    fn transition(&self, next: SessionState, report: &mut SessionReport) {
        let previous = self.state.send_replace(next);
        report.transitions.push(next);
        info!(session_id = %self.id, from = %previous, to = %next, "Session state changed");
    }
}

// =============================================================================
// Active Phase
// =============================================================================

/// Everything the `ACTIVE` loop mutates.
struct Pump<'r> {
    session_id: String,
    config: Arc<RelayConfig>,
    registry: Arc<ToolRegistry>,
    tracker: Arc<CorrelationTracker>,
    session_config: SessionConfig,
    translator: MessageTranslator,
    sequencer: TurnSequencer,
    router: ResultRouter,
    upstream: mpsc::Sender<Frame>,
    downstream: mpsc::Sender<Frame>,
    handlers: JoinSet<(ToolCallRecord, ToolResult)>,
    report: &'r mut SessionReport,
}

impl Pump<'_> {
    async fn run(&mut self, mut up_stream: FrameStream, mut down_stream: FrameStream) -> Exit {
        loop {
            tokio::select! {
                frame = up_stream.next() => match frame {
                    Some(Ok(Frame::Close)) | None => return Exit::Closed(Side::Upstream),
                    Some(Ok(frame)) => {
                        if let Err(e) = self.on_upstream_frame(frame).await {
                            return Exit::Failed(e);
                        }
                    }
                    Some(Err(e)) => return Exit::Failed(e.into()),
                },
                frame = down_stream.next() => match frame {
                    Some(Ok(Frame::Close)) | None => return Exit::Closed(Side::Downstream),
                    Some(Ok(frame)) => {
                        if let Err(e) = self.on_downstream_frame(frame).await {
                            return Exit::Failed(e);
                        }
                    }
                    Some(Err(e)) => return Exit::Failed(e.into()),
                },
                Some(joined) = self.handlers.join_next(), if !self.handlers.is_empty() => {
                    match joined {
                        Ok((record, result)) => {
                            if let Err(e) = self.on_tool_completed(record, result).await {
                                return Exit::Failed(e);
                            }
                        }
                        Err(e) => {
                            error!(session_id = %self.session_id, error = %e, "Tool task ended without a result");
                        }
                    }
                }
            }
        }
    }

    /// Client frames go upstream untouched, except for an optional rewrite of
    /// the client's own `session.update`.
    async fn on_downstream_frame(&mut self, frame: Frame) -> RelayResult<()> {
        let frame = match frame {
            Frame::Text(raw) if self.config.enforce_client_session => {
                match self.translator.rewrite_client_frame(&raw, &self.session_config) {
                    Some(rewritten) => {
                        debug!(session_id = %self.session_id, "Reapplied server session settings to client update");
                        Frame::Text(rewritten)
                    }
                    None => Frame::Text(raw),
                }
            }
            other => other,
        };
        forward(&self.upstream, frame).await
    }

    async fn on_upstream_frame(&mut self, frame: Frame) -> RelayResult<()> {
        let raw = match frame {
            Frame::Text(raw) => raw,
            other => return forward(&self.downstream, other).await,
        };

        let event = match self.translator.parse_upstream_frame(&raw) {
            Ok(event) => event,
            Err(e) if e.is_recoverable() => {
                self.report.decode_errors += 1;
                warn!(session_id = %self.session_id, error = %e, "Dropping undecodable upstream frame");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match event {
            UpstreamEvent::Passthrough(raw) => forward(&self.downstream, Frame::Text(raw)).await,
            UpstreamEvent::Suppressed(kind) => {
                debug!(session_id = %self.session_id, kind = ?kind, "Suppressed upstream frame");
                Ok(())
            }
            UpstreamEvent::SessionControl { kind, forward: text } => {
                if let Some(text) = text {
                    forward(&self.downstream, Frame::Text(text)).await?;
                }
                self.on_session_control(kind).await
            }
            UpstreamEvent::ToolCallRequested(request) => self.dispatch(request).await,
            UpstreamEvent::MalformedToolCall { request, reason } => {
                warn!(
                    session_id = %self.session_id,
                    call_id = %request.call_id,
                    tool = %request.name,
                    reason = %reason,
                    "Malformed tool call"
                );
                if let Some(record) = self.open(&request).await? {
                    self.on_tool_completed(record, ToolResult::error(reason))
                        .await?;
                }
                Ok(())
            }
        }
    }

    async fn on_session_control(&mut self, kind: SessionControlKind) -> RelayResult<()> {
        match kind {
            SessionControlKind::ResponseDone {
                turn_id: Some(turn_id),
            } => {
                let completion = self.sequencer.mark_response_done(&turn_id);
                self.resume_if_settled(&turn_id, completion).await
            }
            SessionControlKind::ResponseDone { turn_id: None } => Ok(()),
            SessionControlKind::Error { code, message } => {
                warn!(session_id = %self.session_id, code = ?code, message = %message, "Upstream reported an error");
                Ok(())
            }
            SessionControlKind::SessionCreated | SessionControlKind::SessionUpdated => {
                debug!(session_id = %self.session_id, kind = ?kind, "Upstream session event");
                Ok(())
            }
        }
    }

    /// Opens a tracker record and a sequencer slot for `request`.
    ///
    /// Returns `None` when the tracker refuses the call; the model then
    /// receives an error output for it.
    async fn open(&mut self, request: &ToolCallRequest) -> RelayResult<Option<ToolCallRecord>> {
        match self.tracker.begin_record(request.record()) {
            Ok(record) => {
                self.sequencer.open(record.clone());
                Ok(Some(record))
            }
            Err(e) => {
                self.report.tool_errors += 1;
                warn!(
                    session_id = %self.session_id,
                    call_id = %request.call_id,
                    error = %e,
                    "Tool call rejected"
                );
                self.router.reject(&request.call_id, &e.to_string()).await?;
                Ok(None)
            }
        }
    }

    async fn dispatch(&mut self, request: ToolCallRequest) -> RelayResult<()> {
        let Some(record) = self.open(&request).await? else {
            return Ok(());
        };
        self.report.tools_dispatched += 1;

        let tool = match self
            .registry
            .resolve(&request.name)
            .and_then(|tool| tool.check_arguments(&request.arguments).map(|_| tool))
            .map_err(RelayError::from)
        {
            Ok(tool) => tool,
            Err(e) => {
                warn!(
                    session_id = %self.session_id,
                    call_id = %record.call_id,
                    tool = %request.name,
                    error = %e,
                    "Tool call cannot be served"
                );
                return self
                    .on_tool_completed(record, ToolResult::error(e.to_string()))
                    .await;
            }
        };

        info!(
            session_id = %self.session_id,
            call_id = %record.call_id,
            turn_id = %record.turn_id,
            tool = %request.name,
            "Dispatching tool call"
        );

        let context = ToolContext {
            session_id: self.session_id.clone(),
            call_id: record.call_id.clone(),
            turn_id: record.turn_id.clone(),
            chain: self.tracker.chain(&record.call_id),
        };
        let limit = self.config.tool_timeout;
        self.handlers.spawn(async move {
            let result = invoke_isolated(tool, request.arguments, context, limit).await;
            (record, result)
        });
        Ok(())
    }

    async fn on_tool_completed(
        &mut self,
        record: ToolCallRecord,
        result: ToolResult,
    ) -> RelayResult<()> {
        if result.is_error() {
            self.report.tool_errors += 1;
            debug!(session_id = %self.session_id, call_id = %record.call_id, "Tool produced an error result");
        }

        let turn_id = record.turn_id.clone();
        let released = match self
            .sequencer
            .complete(&record.turn_id, &record.call_id, result)
        {
            Ok(released) => released,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Dropping result for unknown call");
                return Ok(());
            }
        };

        for (record, result) in &released.immediate {
            match self.router.deliver(result, record).await {
                Ok(_) => {}
                Err(e) if e.is_call_scoped() => {
                    warn!(session_id = %self.session_id, call_id = %record.call_id, error = %e, "Result not delivered");
                }
                Err(e) => return Err(e),
            }
        }

        for (record, result) in released.ordered {
            match self.router.route(&result, &record).await {
                Ok(routed) if routed.upstream_frames > 0 => {
                    self.sequencer.note_upstream_frame(&record.turn_id)
                }
                Ok(_) => {}
                Err(e) if e.is_call_scoped() => {
                    self.report.tool_errors += 1;
                    warn!(session_id = %self.session_id, call_id = %record.call_id, error = %e, "Result not routed");
                    self.router.reject(&record.call_id, &e.to_string()).await?;
                    self.sequencer.note_upstream_frame(&record.turn_id);
                }
                Err(e) => return Err(e),
            }
            match self.tracker.complete(&record.call_id) {
                Ok(_) => self.router.release(&record.call_id),
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "Tracker out of sync");
                }
            }
        }

        let completion = self.sequencer.settle(&turn_id);
        self.resume_if_settled(&turn_id, completion).await
    }

    /// Asks the model to continue once every output of a finished turn is in.
    async fn resume_if_settled(
        &mut self,
        turn_id: &str,
        completion: TurnCompletion,
    ) -> RelayResult<()> {
        if completion != TurnCompletion::Resume || !self.config.auto_continue {
            return Ok(());
        }
        debug!(session_id = %self.session_id, turn_id = %turn_id, "Turn settled, requesting continuation");
        forward(&self.upstream, Frame::Text(response_create_frame()?)).await
    }
}

// =============================================================================
// Plumbing
// =============================================================================

async fn forward(queue: &mpsc::Sender<Frame>, frame: Frame) -> RelayResult<()> {
    queue
        .send(frame)
        .await
        .map_err(|_| RelayError::Transport(TransportError::Closed))
}

async fn send_error(queue: &mpsc::Sender<Frame>, code: &str, message: &str) {
    match extension_error_frame(code, message) {
        Ok(text) => {
            let _ = queue.send(Frame::Text(text)).await;
        }
        Err(e) => warn!(error = %e, "Failed to encode relay error frame"),
    }
}

/// Drains `queue` into `sink` until a close frame or until every sender is gone.
async fn write_frames(mut queue: mpsc::Receiver<Frame>, mut sink: FrameSink, side: Side) {
    while let Some(frame) = queue.recv().await {
        let closing = frame == Frame::Close;
        if let Err(e) = sink.send(frame).await {
            debug!(side = %side, error = %e, "Writer stopped");
            return;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}
