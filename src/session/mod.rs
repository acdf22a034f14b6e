//! WebSocket client session.
//!
//! A [`Session`] connects to one peer, exchanges messages with it and closes
//! the connection, reporting every outcome through callbacks.
//!
//! # Lifecycle
//!
//! 1. [`Session::connect`] resolves the host, tries the endpoints in order
//!    under a single deadline and performs the WebSocket upgrade.
//! 2. While open, inbound messages are delivered in arrival order and
//!    [`Session::send`] writes queued messages one at a time.
//! 3. [`Session::close`] runs the close handshake. A connection lost without
//!    a close request is reported to the disconnect callback instead.
//!
//! # Callbacks
//!
//! All callbacks run on the session task. They may call back into a
//! [`Session`] handle; such calls are queued, never re-entrant.
//!
//! # Example
//!
//! ```ignore
//! use network_monitor::Session;
//!
//! let session = Session::builder().host("localhost").port(9000).build()?;
//!
//! let sender = session.clone();
//! session.connect(
//!     move |result| {
//!         if result.is_ok() {
//!             sender.send("hello", |_| {});
//!         }
//!     },
//!     |message| println!("{}", String::from_utf8_lossy(&message)),
//!     |error| eprintln!("connection lost: {error}"),
//! );
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

// ============================================================================
// Submodules
// ============================================================================

/// Fluent session construction.
pub mod builder;

/// Session handle.
pub mod core;

/// Per-session task.
mod event_loop;

/// Connection parameters.
pub mod options;

/// Lifecycle states.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SessionBuilder;
pub use self::core::Session;
pub use options::{SessionOptions, read_json_file};
pub use state::State;

// ============================================================================
// Callback Types
// ============================================================================

/// Receives the outcome of [`Session::connect`]. Runs exactly once.
pub type ConnectHandler = Box<dyn FnOnce(Result<()>) + Send>;

/// Receives every inbound message while the session is open.
pub type MessageHandler = Box<dyn FnMut(Vec<u8>) + Send>;

/// Receives the error that ended an open session without a close request.
pub type DisconnectHandler = Box<dyn FnOnce(Error) + Send>;

/// Receives the outcome of one [`Session::send`]. Runs exactly once.
pub type SendHandler = Box<dyn FnOnce(Result<()>) + Send>;

/// Receives the outcome of [`Session::close`]. Runs exactly once.
pub type CloseHandler = Box<dyn FnOnce(Result<()>) + Send>;
