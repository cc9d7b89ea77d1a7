// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.

use super::guard::ConnectionGuard;
use super::output::{OutputQueue, run_writer};
use super::upgrade::{UpgradePolicy, WebUpgradePolicy};
use crate::core::commands::{RequestContext, SessionAction};
use crate::core::metrics;
use crate::core::protocol::ws_frame::encode_pong;
use crate::core::protocol::{ConnectionCodec, Frame, HandshakeFlow, HandshakeNegotiator, Inbound};
use crate::core::shell::{Completion, Route, ShellDispatcher};
use crate::core::state::{
    ConnectionEntry, ConnectionMode, ConnectionRow, ConnectionState, ServerState,
};
use crate::core::NetShellError;
use bytes::Bytes;
use futures::StreamExt;
use futures::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::sync::{OwnedSemaphorePermit, broadcast};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info};

/// How long teardown waits for queued output to reach the socket.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Which listener accepted the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Console,
    WebSocket,
}

impl ListenerKind {
    pub fn label(self) -> &'static str {
        match self {
            ListenerKind::Console => "console",
            ListenerKind::WebSocket => "websocket",
        }
    }
}

/// Why the main loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    PeerClosed,
    Command,
    Rejected,
    Shutdown,
    Error,
}

/// The result of running one line to completion.
struct WorkOutcome {
    output: String,
    completion: Completion,
    action: SessionAction,
}

impl WorkOutcome {
    fn ok(output: String) -> Self {
        Self {
            output,
            completion: Completion::Ok,
            action: SessionAction::Continue,
        }
    }

    fn failed(e: NetShellError) -> Self {
        Self {
            output: format!("{e}\n"),
            completion: Completion::Failed,
            action: SessionAction::Continue,
        }
    }
}

type WorkFuture = BoxFuture<'static, WorkOutcome>;

/// Manages the full lifecycle of a client connection.
pub struct ConnectionHandler<S> {
    reader: FramedRead<ReadHalf<S>, ConnectionCodec>,
    output: OutputQueue,
    writer: Option<JoinHandle<()>>,
    addr: SocketAddr,
    state: Arc<ServerState>,
    session_id: u64,
    row: Arc<ConnectionRow>,
    listener: ListenerKind,
    global_shutdown_rx: broadcast::Receiver<()>,
    negotiator: Option<HandshakeNegotiator>,
    policy: Arc<dyn UpgradePolicy>,
    dispatcher: ShellDispatcher,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Creates a new `ConnectionHandler` and starts its writer task.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        state: Arc<ServerState>,
        listener: ListenerKind,
    ) -> Self {
        let session_id = state.next_session_id();
        let mode = match listener {
            ListenerKind::Console => ConnectionMode::Plain,
            ListenerKind::WebSocket => ConnectionMode::AwaitingUpgrade,
        };
        let row = Arc::new(ConnectionRow::new(session_id, addr, mode));

        let (read_half, write_half) = tokio::io::split(stream);
        let (output, rx) = OutputQueue::channel(Arc::clone(&row));
        let writer = tokio::spawn(run_writer(write_half, rx, Arc::clone(&row)));

        let dispatcher = ShellDispatcher::new(
            state.console_profile(),
            state.config.max_queued_lines,
            Arc::clone(&row),
        );

        Self {
            reader: FramedRead::new(read_half, ConnectionCodec::new()),
            output,
            writer: Some(writer),
            addr,
            global_shutdown_rx: state.shutdown_tx.subscribe(),
            state,
            session_id,
            row,
            listener,
            negotiator: (listener == ListenerKind::WebSocket).then(HandshakeNegotiator::new),
            policy: Arc::new(WebUpgradePolicy),
            dispatcher,
        }
    }

    /// Replaces the hook consulted when a WebSocket handshake completes.
    pub fn with_upgrade_policy(mut self, policy: Arc<dyn UpgradePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Runs the connection until it closes. `permit` is the admission slot,
    /// released only after the connection is fully unregistered.
    pub async fn run(mut self, permit: Option<OwnedSemaphorePermit>) -> Result<(), NetShellError> {
        self.state.stats.on_connection_open(Arc::clone(&self.row));
        self.state.clients.insert(
            self.session_id,
            ConnectionEntry {
                row: Arc::clone(&self.row),
                output: self.output.clone(),
            },
        );
        let guard = ConnectionGuard::new(Arc::clone(&self.state), Arc::clone(&self.row), permit);
        let _use = self.row.acquire_use();
        info!(
            "Session {} opened on the {} listener.",
            self.session_id,
            self.listener.label()
        );

        if self.negotiator.is_none() {
            self.write_initial_prompt();
        }

        let mut in_flight: Option<WorkFuture> = None;
        let result = self.serve(&mut in_flight).await;
        let reason = match &result {
            Ok(reason) => *reason,
            Err(e) => {
                if matches!(e, NetShellError::Protocol(_)) {
                    metrics::PROTOCOL_ERRORS_TOTAL
                        .with_label_values(&[self.listener.label()])
                        .inc();
                }
                CloseReason::Error
            }
        };
        self.finish(in_flight, reason).await;
        self.row.set_state(ConnectionState::Close);
        info!("Session {} closing ({:?}).", self.session_id, reason);

        // Dropping the last queue handle lets the writer flush and exit.
        self.state.clients.remove(&self.session_id);
        let writer = self.writer.take();
        drop(self.output);
        if let Some(mut writer) = writer
            && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err()
        {
            debug!(
                "Session {}: output not drained in time; dropping it.",
                self.session_id
            );
            writer.abort();
        }
        drop(guard);

        match result {
            Err(e) if !is_normal_disconnect(&e) => Err(e),
            _ => Ok(()),
        }
    }

    /// The main event loop: shutdown signal, finished work, and inbound data.
    async fn serve(
        &mut self,
        in_flight: &mut Option<WorkFuture>,
    ) -> Result<CloseReason, NetShellError> {
        loop {
            self.row.set_state(if in_flight.is_some() {
                ConnectionState::Run
            } else {
                ConnectionState::IWait
            });
            // A full queue stops reading, which pushes back on the peer.
            let accepting = !self.dispatcher.is_saturated();

            tokio::select! {
                // Prioritize shutdown signals over other events.
                biased;
                _ = self.global_shutdown_rx.recv() => {
                    info!("Connection handler for {} received GLOBAL shutdown signal.", self.addr);
                    return Ok(CloseReason::Shutdown);
                }
                outcome = wait_for(in_flight) => {
                    *in_flight = None;
                    if let Some(reason) = self.complete(outcome, in_flight)? {
                        return Ok(reason);
                    }
                }
                item = self.reader.next(), if accepting => {
                    match item {
                        Some(Ok(inbound)) => {
                            if let Some(reason) = self.on_inbound(inbound, in_flight)? {
                                return Ok(reason);
                            }
                        }
                        Some(Err(e)) => return Err(e),
                        None => {
                            debug!("Connection from {} closed by peer.", self.addr);
                            return Ok(CloseReason::PeerClosed);
                        }
                    }
                }
            }
        }
    }

    fn on_inbound(
        &mut self,
        inbound: Inbound,
        in_flight: &mut Option<WorkFuture>,
    ) -> Result<Option<CloseReason>, NetShellError> {
        match inbound {
            Inbound::Line(line) => {
                self.count_line();
                if self.negotiator.is_some() {
                    return self.on_handshake_line(&line);
                }
                self.accept_line(line, in_flight);
                Ok(None)
            }
            Inbound::Frame(Frame::Text(mut text)) => {
                if text.ends_with('\r') {
                    text.pop();
                }
                self.count_line();
                self.accept_line(text, in_flight);
                Ok(None)
            }
            Inbound::Frame(Frame::Ping(payload)) => {
                debug!("Session {}: ping of {} bytes", self.session_id, payload.len());
                self.row.touch();
                self.output.send_raw(encode_pong(&payload))?;
                Ok(None)
            }
            Inbound::Frame(Frame::Close) => {
                debug!("Session {}: close frame received", self.session_id);
                Ok(Some(CloseReason::PeerClosed))
            }
        }
    }

    /// Feeds one header line to the negotiator and acts on the result.
    fn on_handshake_line(&mut self, line: &str) -> Result<Option<CloseReason>, NetShellError> {
        let Some(negotiator) = self.negotiator.as_mut() else {
            return Ok(None);
        };
        let mut flow = negotiator.feed_line(line)?;
        if let HandshakeFlow::HeadersComplete(request) = &flow {
            debug!(
                "Session {}: request for '{}' (websocket: {})",
                self.session_id, request.url, request.websocket
            );
            let decision = self.policy.decide(request, &self.state);
            flow = negotiator.resolve(decision);
        }

        match flow {
            HandshakeFlow::Continue | HandshakeFlow::HeadersComplete(_) => Ok(None),
            HandshakeFlow::Upgrade(response) => {
                let url = negotiator.url().to_string();
                self.output.send_raw(Bytes::from(response))?;
                self.row.set_mode(ConnectionMode::Framed);
                self.reader.decoder_mut().switch_to_frames();
                self.negotiator = None;
                metrics::WEBSOCKET_UPGRADES_TOTAL.inc();
                info!("Session {} upgraded to WebSocket at '{}'.", self.session_id, url);

                match self.state.websocket_profile() {
                    Ok(profile) => {
                        self.dispatcher.set_profile(profile);
                        self.write_initial_prompt();
                        Ok(None)
                    }
                    Err(e) => {
                        self.output.send_text(&format!("{e}\n"))?;
                        Ok(Some(CloseReason::Rejected))
                    }
                }
            }
            HandshakeFlow::Plain => {
                self.negotiator = None;
                self.row.set_mode(ConnectionMode::Plain);
                self.write_initial_prompt();
                Ok(None)
            }
            HandshakeFlow::CloseWithResponse(text) => {
                self.output.send_raw(Bytes::from(text))?;
                Ok(Some(CloseReason::Rejected))
            }
            HandshakeFlow::CloseSilently => Ok(Some(CloseReason::Rejected)),
        }
    }

    fn count_line(&self) {
        self.row.record_line();
        self.state.stats.on_line_received();
    }

    fn accept_line(&mut self, line: String, in_flight: &mut Option<WorkFuture>) {
        if let Some(next) = self.dispatcher.on_line(line) {
            *in_flight = Some(self.start_work(next));
        }
    }

    /// Writes a finished line's output and starts the next queued one.
    fn complete(
        &mut self,
        outcome: WorkOutcome,
        in_flight: &mut Option<WorkFuture>,
    ) -> Result<Option<CloseReason>, NetShellError> {
        match outcome.action {
            SessionAction::Close => {
                let (text, _) = self
                    .dispatcher
                    .on_eval_complete(&outcome.output, Completion::Closing);
                self.output.send_text(&text)?;
                return Ok(Some(CloseReason::Command));
            }
            SessionAction::EnterShell(profile) => self.dispatcher.enter_shell(profile),
            SessionAction::Continue => {}
        }
        let (text, next) = self
            .dispatcher
            .on_eval_complete(&outcome.output, outcome.completion);
        self.output.send_text(&text)?;
        if let Some(line) = next {
            *in_flight = Some(self.start_work(line));
        }
        Ok(None)
    }

    /// Builds the future that runs one line: a command, the evaluator, or an error.
    fn start_work(&self, line: String) -> WorkFuture {
        let route = self.dispatcher.route(&line, &self.state.commands);
        let ctx = RequestContext::new(Arc::clone(&self.state), self.session_id);
        let use_guard = self.row.acquire_use();
        debug!("Session {}: running {:?}", self.session_id, line);

        Box::pin(async move {
            let _use = use_guard;
            let started = Instant::now();
            let outcome = match route {
                Route::Empty => WorkOutcome::ok(String::new()),
                Route::Command { descriptor, args } => {
                    match descriptor.dispatch(&args, &ctx).await {
                        Ok(outcome) => WorkOutcome {
                            output: outcome.output,
                            completion: Completion::Ok,
                            action: outcome.action,
                        },
                        Err(e) => WorkOutcome::failed(e),
                    }
                }
                Route::Evaluate { evaluator, line } => match evaluator.evaluate(&line).await {
                    Ok(output) => WorkOutcome::ok(output),
                    Err(e) => WorkOutcome::failed(e),
                },
                Route::Unknown(word) => WorkOutcome::failed(NetShellError::UnknownCommand(word)),
            };
            metrics::EVAL_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());
            outcome
        })
    }

    /// Lets in-flight work finish before teardown. After a peer close, lines
    /// that were already received still run.
    async fn finish(&mut self, mut in_flight: Option<WorkFuture>, reason: CloseReason) {
        if reason == CloseReason::PeerClosed {
            while let Some(work) = in_flight.take() {
                let outcome = work.await;
                if !matches!(self.complete(outcome, &mut in_flight), Ok(None)) {
                    break;
                }
            }
        } else if let Some(work) = in_flight.take() {
            let outcome = work.await;
            let _ = self.output.send_text(&outcome.output);
        }

        if reason == CloseReason::Shutdown {
            let _ = self.output.send_text("Server is shutting down.\n");
        }
    }

    fn write_initial_prompt(&self) {
        if let Some(prompt) = self.dispatcher.initial_prompt() {
            let _ = self.output.send_text(prompt);
        }
    }
}

/// Resolves when the in-flight work does; pends forever when there is none.
async fn wait_for(work: &mut Option<WorkFuture>) -> WorkOutcome {
    match work {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

/// Helper function to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &NetShellError) -> bool {
    if matches!(e, NetShellError::QueueClosed) {
        return true;
    }
    matches!(e, NetShellError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}
