//! Resolver and transport ports.
//!
//! The session state machine only talks to these two traits, so the same
//! engine runs over plain TCP, TLS, or in-memory test doubles.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   resolve(host, service)   ┌──────────────────┐
//! │                 │───────────────────────────►│ Resolver         │
//! │    Session      │                            └──────────────────┘
//! │  (event loop)   │   connect / handshake      ┌──────────────────┐
//! │                 │   read / write / close     │ Transport        │
//! │                 │───────────────────────────►│  └─ Connector    │
//! └─────────────────┘                            └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `resolver` | [`Resolver`] port, [`Endpoint`], [`DnsResolver`] |
//! | `connector` | Plain and TLS stream connectors |
//! | `websocket` | [`WebSocketTransport`] over a connector |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// Stream connectors (plain TCP, TLS).
pub mod connector;

/// Name resolution port.
pub mod resolver;

/// WebSocket transport implementation.
pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connector::{Connector, TcpConnector, TlsConnector, load_trust_anchors};
pub use resolver::{DnsResolver, Endpoint, Resolver};
pub use websocket::{PlainTransport, SecureTransport, WebSocketTransport};

// ============================================================================
// Transport
// ============================================================================

/// A duplex, message-framed byte stream.
///
/// Methods take `&self` so that a read and a write can be outstanding at
/// the same time. Implementations must allow at most one outstanding
/// operation per direction and must serialize callers that overlap.
///
/// # Cancellation
///
/// [`close`](Transport::close) must make an outstanding
/// [`read`](Transport::read) complete with
/// [`Error::OperationAborted`](crate::Error::OperationAborted).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establishes the underlying stream, including any TLS session.
    ///
    /// # Errors
    ///
    /// Returns a [`Stage::Connect`](crate::Stage::Connect) error on failure.
    async fn connect(&self, endpoint: &Endpoint) -> Result<()>;

    /// Performs the WebSocket upgrade for `host` and `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`](crate::Error::Handshake) on failure.
    async fn handshake(&self, host: &str, path: &str) -> Result<()>;

    /// Selects text (`true`) or binary (`false`) framing for writes.
    fn set_text(&self, text: bool);

    /// Writes one message, returning the payload size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Write`](crate::Error::Write) on failure.
    async fn write(&self, payload: &[u8]) -> Result<usize>;

    /// Reads one complete message, appending its payload to `buffer`.
    ///
    /// Returns the number of bytes appended.
    ///
    /// # Errors
    ///
    /// - [`Error::OperationAborted`](crate::Error::OperationAborted) if closed meanwhile
    /// - [`Error::Read`](crate::Error::Read) if only this frame was unreadable
    /// - any other error if the stream is no longer usable
    async fn read(&self, buffer: &mut Vec<u8>) -> Result<usize>;

    /// Runs the close handshake and releases the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Close`](crate::Error::Close) on failure.
    async fn close(&self) -> Result<()>;
}
