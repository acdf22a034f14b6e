//! Error types for the WebSocket session engine.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use network_monitor::{Error, Result};
//!
//! session.connect(
//!     |result: Result<()>| match result {
//!         Ok(()) => println!("connected"),
//!         Err(Error::ConnectionTimeout { timeout_ms }) => eprintln!("gave up after {timeout_ms}ms"),
//!         Err(e) => eprintln!("{e}"),
//!     },
//!     |_message| {},
//!     |_error| {},
//! );
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Resolve`], [`Error::Connect`], [`Error::ConnectionTimeout`], [`Error::Tls`], [`Error::Handshake`] |
//! | Exchange | [`Error::Write`], [`Error::Read`], [`Error::ConnectionClosed`], [`Error::Close`] |
//! | Session | [`Error::OperationAborted`], [`Error::NotConnected`], [`Error::AlreadyConnecting`], [`Error::AlreadyClosing`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Stage
// ============================================================================

/// Connection stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Host/service name resolution.
    Resolve,
    /// Transport establishment, including TLS setup.
    Connect,
    /// WebSocket upgrade.
    Handshake,
    /// Outbound frame.
    Write,
    /// Inbound frame.
    Read,
    /// Close handshake.
    Close,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolve => "resolve",
            Self::Connect => "connect",
            Self::Handshake => "handshake",
            Self::Write => "write",
            Self::Read => "read",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging. Use
/// [`Error::stage`] to find out which part of the connection lifecycle
/// produced it.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Name resolution failed.
    #[error("Failed to resolve {host}:{service}: {message}")]
    Resolve {
        /// Host that was looked up.
        host: String,
        /// Service or port that was looked up.
        service: String,
        /// Resolver failure reason.
        message: String,
    },

    /// Transport connection failed.
    #[error("Connection to {endpoint} failed: {message}")]
    Connect {
        /// Endpoint the attempt was made against.
        endpoint: String,
        /// Description of the connection error.
        message: String,
    },

    /// Connect phase exceeded its deadline.
    ///
    /// The deadline covers every endpoint attempt after resolution.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// TLS setup or trust anchor loading failed.
    #[error("TLS error: {message}")]
    Tls {
        /// Description of the TLS error.
        message: String,
    },

    /// WebSocket upgrade failed.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake error.
        message: String,
    },

    // ========================================================================
    // Exchange Errors
    // ========================================================================
    /// Writing a frame failed.
    #[error("Write failed: {message}")]
    Write {
        /// Description of the write error.
        message: String,
    },

    /// A single inbound frame could not be read.
    ///
    /// Recoverable: the stream is still usable for the next read.
    #[error("Read failed: {message}")]
    Read {
        /// Description of the read error.
        message: String,
    },

    /// Peer closed the connection or the stream ended.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Close handshake failed.
    #[error("Close failed: {message}")]
    Close {
        /// Description of the close error.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Outstanding operation cancelled because its owner closed or went away.
    #[error("Operation aborted")]
    OperationAborted,

    /// Operation requires an open session.
    #[error("Not connected")]
    NotConnected,

    /// `connect` was called on a session that already left the idle state.
    #[error("Session already connecting or connected")]
    AlreadyConnecting,

    /// `close` was called while a close handshake is already running.
    #[error("Session already closing")]
    AlreadyClosing,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a resolve error.
    #[inline]
    pub fn resolve(
        host: impl Into<String>,
        service: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Resolve {
            host: host.into(),
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connect(endpoint: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Connect {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a TLS error.
    #[inline]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a write error.
    #[inline]
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            message: message.into(),
        }
    }

    /// Creates a recoverable read error.
    #[inline]
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    /// Creates a close error.
    #[inline]
    pub fn close(message: impl Into<String>) -> Self {
        Self::Close {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the lifecycle stage this error belongs to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Resolve { .. } => Some(Stage::Resolve),
            Self::Connect { .. } | Self::ConnectionTimeout { .. } | Self::Tls { .. } => {
                Some(Stage::Connect)
            }
            Self::Handshake { .. } => Some(Stage::Handshake),
            Self::Write { .. } => Some(Stage::Write),
            Self::Read { .. } | Self::ConnectionClosed => Some(Stage::Read),
            Self::Close { .. } => Some(Stage::Close),
            _ => None,
        }
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if an outstanding operation was cancelled.
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::OperationAborted)
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Resolve { .. }
                | Self::Connect { .. }
                | Self::ConnectionTimeout { .. }
                | Self::Tls { .. }
                | Self::Handshake { .. }
                | Self::ConnectionClosed
        )
    }

    /// Returns `true` if the failed read left the stream usable.
    ///
    /// The receive loop swallows these and issues the next read.
    #[inline]
    #[must_use]
    pub fn is_recoverable_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
