//! Network Monitor - asynchronous WebSocket client sessions.
//!
//! This library provides a callback-driven WebSocket client that connects
//! to one peer, exchanges text messages with it and shuts down cleanly,
//! over plain TCP or TLS.
//!
//! # Architecture
//!
//! Each [`Session`] owns a spawned tokio task that serializes every state
//! transition and callback. Network access goes through two ports:
//!
//! - **[`Resolver`]**: turns a host/service pair into candidate endpoints
//! - **[`Transport`]**: connects, upgrades, reads, writes and closes
//!
//! Key design principles:
//!
//! - Explicit state machine (`Idle` → `Resolving` → `Connecting` →
//!   `Handshaking` → `Open` → `Closing` → `Closed`, or `Errored`)
//! - One deadline for the whole connect phase, with endpoint failover
//! - Outbound messages written one at a time, in call order
//! - Every completion callback runs exactly once
//!
//! # Quick Start
//!
//! ```no_run
//! use network_monitor::{Result, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::builder()
//!         .host("localhost")
//!         .port(9000)
//!         .path("/echo")
//!         .build()?;
//!
//!     let handle = session.clone();
//!     session.connect(
//!         move |result| match result {
//!             Ok(()) => handle.send("hello there", |_| {}),
//!             Err(e) => eprintln!("connect failed: {e}"),
//!         },
//!         |message| println!("received: {}", String::from_utf8_lossy(&message)),
//!         |error| eprintln!("connection lost: {error}"),
//!     );
//!
//!     session.terminated().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`session`] | [`Session`] handle, options, builder and states |
//! | [`transport`] | Resolver and transport ports with WebSocket implementations |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// WebSocket client sessions.
///
/// Use [`Session::builder()`] to create a configured session.
pub mod session;

/// Resolver and transport ports.
///
/// Includes the system resolver and the plain and TLS WebSocket transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result, Stage};

// Identifier types
pub use identifiers::SessionId;

// Session types
pub use session::{
    CloseHandler, ConnectHandler, DisconnectHandler, MessageHandler, SendHandler, Session,
    SessionBuilder, SessionOptions, State, read_json_file,
};

// Transport types
pub use transport::{
    Connector, DnsResolver, Endpoint, PlainTransport, Resolver, SecureTransport, TcpConnector,
    TlsConnector, Transport, WebSocketTransport, load_trust_anchors,
};
