//! Session handle.
//!
//! [`Session`] is a cheap, cloneable handle to a session task. Every method
//! returns immediately; outcomes arrive through the supplied callbacks.
//! The task ends once the session reaches a terminal state, or once every
//! handle has been dropped.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::transport::{Resolver, Transport};

use super::builder::SessionBuilder;
use super::event_loop::{Command, SessionLoop};
use super::options::SessionOptions;
use super::state::State;

// ============================================================================
// Session
// ============================================================================

/// Handle to a WebSocket client session.
///
/// # Thread Safety
///
/// `Session` is `Send + Sync` and cheap to clone. All clones drive the same
/// session task.
#[derive(Clone)]
pub struct Session {
    /// Unique identifier, used in log fields.
    id: SessionId,
    /// Channel to the session task.
    command_tx: mpsc::UnboundedSender<Command>,
    /// Latest state published by the session task.
    state_rx: watch::Receiver<State>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Session {
    /// Creates a new session builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Creates an idle session over the given ports.
    ///
    /// Spawns the session task, so it must be called within a tokio runtime.
    ///
    /// `options` are taken as given and are not passed through
    /// [`SessionOptions::validate`]; a zero connect timeout, for example,
    /// fails every connect with [`Error::ConnectionTimeout`]. Use
    /// [`Session::builder`] or [`SessionOptions::from_json_file`] to get
    /// validated options.
    #[must_use]
    pub fn new<R, T>(options: SessionOptions, resolver: R, transport: T) -> Self
    where
        R: Resolver,
        T: Transport,
    {
        let id = SessionId::generate();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(State::Idle);

        debug!(session = %id, host = %options.host, service = %options.service, "Session created");

        let event_loop =
            SessionLoop::new(id, options, Arc::new(resolver), Arc::new(transport), state_tx);
        tokio::spawn(event_loop.run(command_rx));

        Self {
            id,
            command_tx,
            state_rx,
        }
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl Session {
    /// Returns the session identifier.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the most recently published state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> State {
        *self.state_rx.borrow()
    }

    /// Waits until the session reaches [`State::Closed`] or [`State::Errored`].
    ///
    /// Every callback reporting the final outcome has run by the time this
    /// returns.
    pub async fn terminated(&self) -> State {
        let mut state_rx = self.state_rx.clone();
        let result = state_rx.wait_for(State::is_terminal).await.map(|state| *state);
        result.unwrap_or_else(|_| *state_rx.borrow())
    }
}

// ============================================================================
// Operations
// ============================================================================

impl Session {
    /// Starts connecting.
    ///
    /// - `on_connect` runs exactly once, with `Ok(())` once the session is
    ///   open or with the error that stopped the connect sequence.
    /// - `on_message` runs for every inbound message while open.
    /// - `on_disconnect` runs at most once, if the open connection ends
    ///   without a call to [`close`](Self::close).
    ///
    /// Only valid on an idle session; otherwise `on_connect` receives
    /// [`Error::AlreadyConnecting`].
    pub fn connect<C, M, D>(&self, on_connect: C, on_message: M, on_disconnect: D)
    where
        C: FnOnce(Result<()>) + Send + 'static,
        M: FnMut(Vec<u8>) + Send + 'static,
        D: FnOnce(Error) + Send + 'static,
    {
        self.dispatch(Command::Connect {
            on_connect: Box::new(on_connect),
            on_message: Box::new(on_message),
            on_disconnect: Box::new(on_disconnect),
        });
    }

    /// Queues `message` for sending.
    ///
    /// Messages are written one at a time in call order. `on_sent` runs
    /// exactly once with the write outcome, [`Error::NotConnected`] if the
    /// session is not open, or [`Error::OperationAborted`] if the session
    /// closed before the message was written.
    pub fn send<F>(&self, message: impl Into<Vec<u8>>, on_sent: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.dispatch(Command::Send {
            payload: message.into(),
            on_sent: Box::new(on_sent),
        });
    }

    /// Starts the close handshake.
    ///
    /// `on_close` runs exactly once with the close outcome,
    /// [`Error::AlreadyClosing`] if a close is already running, or
    /// [`Error::NotConnected`] if the session is not open.
    pub fn close<F>(&self, on_close: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.dispatch(Command::Close {
            on_close: Box::new(on_close),
        });
    }

    fn dispatch(&self, command: Command) {
        if let Err(SendError(command)) = self.command_tx.send(command) {
            debug!(session = %self.id, "Session task gone, rejecting command");
            command.reject();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
