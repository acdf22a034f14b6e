//! Per-session event loop.
//!
//! Every [`Session`](crate::Session) owns one spawned task running
//! [`SessionLoop::run`]. The task is the only place that touches session
//! state: commands from handles arrive over an mpsc channel, in-flight I/O
//! runs as boxed futures in a [`FuturesUnordered`], and the loop selects
//! between the two. Every completion is handled by exactly one method, which
//! performs at most one state transition.
//!
//! # Callback Ordering
//!
//! A callback that reports a terminal outcome always runs before the
//! terminal state is published, so a caller woken by
//! [`Session::terminated`](crate::Session::terminated) has already seen it.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::transport::{Endpoint, Resolver, Transport};

use super::options::{SessionOptions, duration_millis};
use super::state::State;
use super::{CloseHandler, ConnectHandler, DisconnectHandler, MessageHandler, SendHandler};

// ============================================================================
// Constants
// ============================================================================

/// Maximum time the WebSocket upgrade may take once the stream is connected.
pub(crate) const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Command
// ============================================================================

/// Request sent from a handle to the event loop.
pub(crate) enum Command {
    /// Start the connect sequence.
    Connect {
        on_connect: ConnectHandler,
        on_message: MessageHandler,
        on_disconnect: DisconnectHandler,
    },
    /// Queue one outbound message.
    Send {
        payload: Vec<u8>,
        on_sent: SendHandler,
    },
    /// Start the close handshake.
    Close { on_close: CloseHandler },
}

impl Command {
    /// Answers a command that can no longer reach the event loop.
    pub(crate) fn reject(self) {
        match self {
            Self::Connect { on_connect, .. } => on_connect(Err(Error::AlreadyConnecting)),
            Self::Send { on_sent, .. } => on_sent(Err(Error::NotConnected)),
            Self::Close { on_close } => on_close(Err(Error::NotConnected)),
        }
    }
}

// ============================================================================
// Completion
// ============================================================================

/// Result of an in-flight operation.
enum Completion {
    Resolved(Result<Vec<Endpoint>>),
    Connected(Result<Endpoint>),
    Handshaken(Result<()>),
    Read {
        result: Result<usize>,
        buffer: Vec<u8>,
    },
    Written(Result<usize>),
    Closed(Result<()>),
}

type InFlight = BoxFuture<'static, Completion>;

/// Message waiting for the write in progress to finish.
struct Outbound {
    payload: Vec<u8>,
    on_sent: SendHandler,
}

// ============================================================================
// SessionLoop
// ============================================================================

/// State owned by the session task.
pub(crate) struct SessionLoop<R, T> {
    id: SessionId,
    options: SessionOptions,
    resolver: Arc<R>,
    transport: Arc<T>,

    state: State,
    state_tx: watch::Sender<State>,
    /// Set once the user asked to close; silences the disconnect callback.
    closed: bool,

    /// Receive buffer, moved into the read future while a read is pending.
    buffer: Vec<u8>,
    /// Messages waiting behind the write in progress.
    outbound: VecDeque<Outbound>,
    /// Callback of the write in progress.
    writing: Option<SendHandler>,

    on_connect: Option<ConnectHandler>,
    on_message: Option<MessageHandler>,
    on_disconnect: Option<DisconnectHandler>,
    on_close: Option<CloseHandler>,

    in_flight: FuturesUnordered<InFlight>,
}

impl<R: Resolver, T: Transport> SessionLoop<R, T> {
    pub(crate) fn new(
        id: SessionId,
        options: SessionOptions,
        resolver: Arc<R>,
        transport: Arc<T>,
        state_tx: watch::Sender<State>,
    ) -> Self {
        Self {
            id,
            options,
            resolver,
            transport,
            state: State::Idle,
            state_tx,
            closed: false,
            buffer: Vec::new(),
            outbound: VecDeque::new(),
            writing: None,
            on_connect: None,
            on_message: None,
            on_disconnect: None,
            on_close: None,
            in_flight: FuturesUnordered::new(),
        }
    }

    /// Runs until the session reaches a terminal state.
    pub(crate) async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        let mut commands_open = true;

        loop {
            tokio::select! {
                Some(completion) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.on_completion(completion);
                }

                command = command_rx.recv(), if commands_open => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        commands_open = false;
                        self.on_handles_dropped();
                    }
                },

                else => break,
            }

            if self.state.is_terminal() {
                break;
            }
        }

        if !self.state.is_terminal() {
            error!(session = %self.id, state = %self.state, "Session loop stopped without a terminal state");
        }
        self.abort_outstanding();

        // Commands that raced with the terminal transition still get an answer.
        command_rx.close();
        while let Ok(command) = command_rx.try_recv() {
            command.reject();
        }

        debug!(session = %self.id, state = %self.state, "Session loop terminated");
    }
}

// ============================================================================
// Commands
// ============================================================================

impl<R: Resolver, T: Transport> SessionLoop<R, T> {
    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect {
                on_connect,
                on_message,
                on_disconnect,
            } => self.on_connect_requested(on_connect, on_message, on_disconnect),
            Command::Send { payload, on_sent } => self.on_send_requested(payload, on_sent),
            Command::Close { on_close } => self.on_close_requested(on_close),
        }
    }

    fn on_connect_requested(
        &mut self,
        on_connect: ConnectHandler,
        on_message: MessageHandler,
        on_disconnect: DisconnectHandler,
    ) {
        if self.state != State::Idle {
            debug!(session = %self.id, state = %self.state, "Connect rejected");
            on_connect(Err(Error::AlreadyConnecting));
            return;
        }

        self.on_connect = Some(on_connect);
        self.on_message = Some(on_message);
        self.on_disconnect = Some(on_disconnect);
        self.closed = false;
        self.transition(State::Resolving);

        let resolver = Arc::clone(&self.resolver);
        let host = self.options.host.clone();
        let service = self.options.service.clone();
        self.in_flight.push(Box::pin(async move {
            Completion::Resolved(resolver.resolve(&host, &service).await)
        }));
    }

    fn on_send_requested(&mut self, payload: Vec<u8>, on_sent: SendHandler) {
        if self.state != State::Open {
            trace!(session = %self.id, state = %self.state, "Send rejected");
            on_sent(Err(Error::NotConnected));
            return;
        }

        if self.writing.is_some() {
            self.outbound.push_back(Outbound { payload, on_sent });
            trace!(session = %self.id, queued = self.outbound.len(), "Message queued");
            return;
        }

        self.start_write(payload, on_sent);
    }

    fn on_close_requested(&mut self, on_close: CloseHandler) {
        match self.state {
            State::Open => {}
            State::Closing => {
                on_close(Err(Error::AlreadyClosing));
                return;
            }
            _ => {
                on_close(Err(Error::NotConnected));
                return;
            }
        }

        self.closed = true;
        self.on_close = Some(on_close);
        self.transition(State::Closing);
        self.abort_queued();

        let transport = Arc::clone(&self.transport);
        self.in_flight
            .push(Box::pin(async move { Completion::Closed(transport.close().await) }));
    }

    fn on_handles_dropped(&mut self) {
        debug!(session = %self.id, state = %self.state, "All session handles dropped");

        match self.state {
            State::Idle => self.transition(State::Closed),
            State::Resolving | State::Connecting | State::Handshaking => {
                self.fail_connect(Error::OperationAborted);
            }
            State::Open => self.lose_connection(Error::OperationAborted),
            // The close handshake finishes on its own.
            State::Closing | State::Closed | State::Errored => {}
        }
    }
}

// ============================================================================
// Completions
// ============================================================================

impl<R: Resolver, T: Transport> SessionLoop<R, T> {
    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Resolved(result) => self.on_resolved(result),
            Completion::Connected(result) => self.on_connected(result),
            Completion::Handshaken(result) => self.on_handshaken(result),
            Completion::Read { result, buffer } => self.on_read(result, buffer),
            Completion::Written(result) => self.on_written(result),
            Completion::Closed(result) => self.on_closed(result),
        }
    }

    fn on_resolved(&mut self, result: Result<Vec<Endpoint>>) {
        let endpoints = match result {
            Ok(endpoints) if endpoints.is_empty() => {
                let error = Error::resolve(
                    &self.options.host,
                    &self.options.service,
                    "no endpoints found",
                );
                self.fail_connect(error);
                return;
            }
            Ok(endpoints) => endpoints,
            Err(e) => {
                self.fail_connect(e);
                return;
            }
        };

        debug!(session = %self.id, count = endpoints.len(), "Resolved endpoints");
        self.transition(State::Connecting);

        let transport = Arc::clone(&self.transport);
        let limit = self.options.connect_timeout();
        self.in_flight.push(Box::pin(async move {
            // The deadline spans every attempt; the first success disarms it.
            let result = timeout(limit, connect_any(transport.as_ref(), &endpoints))
                .await
                .unwrap_or_else(|_| Err(Error::connection_timeout(duration_millis(limit))));
            Completion::Connected(result)
        }));
    }

    fn on_connected(&mut self, result: Result<Endpoint>) {
        let endpoint = match result {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.fail_connect(e);
                return;
            }
        };

        debug!(session = %self.id, %endpoint, "Transport connected");
        self.transition(State::Handshaking);

        let transport = Arc::clone(&self.transport);
        let host = self.options.host.clone();
        let path = self.options.path.clone();
        self.in_flight.push(Box::pin(async move {
            // The connect deadline no longer applies; the upgrade has its own.
            let result = timeout(HANDSHAKE_TIMEOUT, transport.handshake(&host, &path))
                .await
                .unwrap_or_else(|_| {
                    Err(Error::handshake(format!(
                        "no upgrade response within {}s",
                        HANDSHAKE_TIMEOUT.as_secs()
                    )))
                });
            Completion::Handshaken(result)
        }));
    }

    fn on_handshaken(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.fail_connect(e);
            return;
        }

        self.transport.set_text(true);
        self.transition(State::Open);
        self.start_read();

        info!(
            session = %self.id,
            host = %self.options.host,
            path = %self.options.path,
            "Session open"
        );

        if let Some(on_connect) = self.on_connect.take() {
            on_connect(Ok(()));
        }
    }

    fn on_read(&mut self, result: Result<usize>, mut buffer: Vec<u8>) {
        match result {
            Ok(bytes) => {
                let message: Vec<u8> = buffer.drain(..).collect();
                self.buffer = buffer;

                trace!(session = %self.id, bytes, "Message received");
                if let Some(on_message) = self.on_message.as_mut() {
                    on_message(message);
                }
                self.start_read();
            }
            Err(e) => {
                buffer.clear();
                self.buffer = buffer;
                self.on_read_failed(e);
            }
        }
    }

    /// Decides whether a failed read ends the receive loop.
    fn on_read_failed(&mut self, error: Error) {
        if error.is_recoverable_read() {
            debug!(session = %self.id, error = %error, "Discarding unreadable message");
            self.start_read();
            return;
        }

        if self.closed {
            debug!(session = %self.id, error = %error, "Receive loop stopped after close");
            return;
        }

        self.lose_connection(error);
    }

    fn on_written(&mut self, result: Result<usize>) {
        match &result {
            Ok(bytes) => trace!(session = %self.id, bytes, "Message sent"),
            Err(e) => warn!(session = %self.id, error = %e, "Write failed"),
        }

        if let Some(on_sent) = self.writing.take() {
            on_sent(result.map(|_| ()));
        }

        if self.state == State::Open
            && let Some(next) = self.outbound.pop_front()
        {
            self.start_write(next.payload, next.on_sent);
        }
    }

    fn on_closed(&mut self, result: Result<()>) {
        match &result {
            Ok(()) => info!(session = %self.id, "Session closed"),
            Err(e) => warn!(session = %self.id, error = %e, "Close handshake failed"),
        }

        if let Some(on_close) = self.on_close.take() {
            on_close(result);
        }
        self.transition(State::Closed);
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl<R: Resolver, T: Transport> SessionLoop<R, T> {
    fn transition(&mut self, next: State) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(session = %self.id, from = %self.state, to = %next, "State transition");
        self.state = next;
        self.state_tx.send_replace(next);
    }

    fn start_read(&mut self) {
        let transport = Arc::clone(&self.transport);
        let mut buffer = std::mem::take(&mut self.buffer);
        self.in_flight.push(Box::pin(async move {
            let result = transport.read(&mut buffer).await;
            Completion::Read { result, buffer }
        }));
    }

    fn start_write(&mut self, payload: Vec<u8>, on_sent: SendHandler) {
        self.writing = Some(on_sent);
        let transport = Arc::clone(&self.transport);
        self.in_flight.push(Box::pin(async move {
            Completion::Written(transport.write(&payload).await)
        }));
    }

    /// Reports a connect-phase failure and ends the session.
    fn fail_connect(&mut self, error: Error) {
        warn!(session = %self.id, state = %self.state, error = %error, "Connect failed");
        if let Some(on_connect) = self.on_connect.take() {
            on_connect(Err(error));
        }
        self.transition(State::Errored);
    }

    /// Reports the loss of an open connection and ends the session.
    fn lose_connection(&mut self, error: Error) {
        warn!(session = %self.id, error = %error, "Connection lost");
        self.abort_queued();
        if let Some(on_disconnect) = self.on_disconnect.take() {
            on_disconnect(error);
        }
        self.transition(State::Errored);
    }

    /// Fails every message still waiting behind the write in progress.
    fn abort_queued(&mut self) {
        for message in self.outbound.drain(..) {
            (message.on_sent)(Err(Error::OperationAborted));
        }
    }

    /// Answers every callback still owed once the loop stops.
    fn abort_outstanding(&mut self) {
        if let Some(on_sent) = self.writing.take() {
            on_sent(Err(Error::OperationAborted));
        }
        self.abort_queued();
        if let Some(on_connect) = self.on_connect.take() {
            on_connect(Err(Error::OperationAborted));
        }
        if let Some(on_close) = self.on_close.take() {
            on_close(Err(Error::OperationAborted));
        }
    }
}

/// Tries `endpoints` in order, returning the first that connects.
async fn connect_any<T: Transport>(transport: &T, endpoints: &[Endpoint]) -> Result<Endpoint> {
    let mut last_error = None;

    for endpoint in endpoints {
        match transport.connect(endpoint).await {
            Ok(()) => return Ok(endpoint.clone()),
            Err(e) => {
                warn!(%endpoint, error = %e, "Endpoint attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(Error::NotConnected))
}
