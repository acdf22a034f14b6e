//! Name resolution port.
//!
//! The session never touches DNS directly; it asks a [`Resolver`] for the
//! candidate [`Endpoint`]s of a host/service pair and tries them in order.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::lookup_host;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Endpoint
// ============================================================================

/// A connectable candidate produced by a [`Resolver`].
///
/// Carries the host name it was resolved from so that encrypted transports
/// can validate the peer certificate against it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    addr: SocketAddr,
}

impl Endpoint {
    /// Creates an endpoint for `host` at `addr`.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            host: host.into(),
            addr,
        }
    }

    /// Returns the host name this endpoint was resolved from.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the socket address to connect to.
    #[inline]
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.host, self.addr)
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Translates a host/service pair into connectable endpoints.
///
/// Implementations must return candidates in preference order. An empty
/// list is treated by the session as a resolution failure.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    /// Resolves `host` and `service` (a port number or well-known name).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolve`] if the lookup fails.
    async fn resolve(&self, host: &str, service: &str) -> Result<Vec<Endpoint>>;
}

// ============================================================================
// DnsResolver
// ============================================================================

/// Resolver backed by the operating system via [`tokio::net::lookup_host`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

impl DnsResolver {
    /// Creates a new system resolver.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, host: &str, service: &str) -> Result<Vec<Endpoint>> {
        let port = service_port(service)
            .ok_or_else(|| Error::resolve(host, service, "unknown service"))?;

        let addrs = lookup_host((host, port))
            .await
            .map_err(|e| Error::resolve(host, service, e.to_string()))?;

        let endpoints: Vec<Endpoint> = addrs.map(|addr| Endpoint::new(host, addr)).collect();

        debug!(host, service, count = endpoints.len(), "Resolved endpoints");

        Ok(endpoints)
    }
}

/// Maps a service to a port number.
///
/// Accepts numeric ports and the names of the schemes a WebSocket URL can
/// carry.
fn service_port(service: &str) -> Option<u16> {
    match service {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        other => other.parse().ok(),
    }
}

// ============================================================================
// Tests
// ============================================================================
