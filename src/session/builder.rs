//! Builder pattern for session configuration.
//!
//! Provides a fluent API for configuring and creating [`Session`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use network_monitor::Session;
//!
//! # async fn example() -> network_monitor::Result<()> {
//! let session = Session::builder()
//!     .host("echo.example.com")
//!     .service("wss")
//!     .path("/socket")
//!     .connect_timeout(Duration::from_secs(3))
//!     .ca_bundle("cacert.pem")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{
    DnsResolver, PlainTransport, Resolver, SecureTransport, TlsConnector, Transport,
};

use super::core::Session;
use super::options::SessionOptions;

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for configuring a [`Session`] instance.
///
/// Use [`Session::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct SessionBuilder {
    /// Peer host name.
    host: Option<String>,
    /// Port number or service name.
    service: Option<String>,
    /// Upgrade request path.
    path: Option<String>,
    /// Connect-phase deadline.
    connect_timeout: Option<Duration>,
    /// Trust anchor bundle; enables TLS.
    ca_bundle: Option<PathBuf>,
}

// ============================================================================
// SessionBuilder Implementation
// ============================================================================

impl SessionBuilder {
    /// Creates a new session builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from existing options.
    #[must_use]
    pub fn options(self, options: SessionOptions) -> Self {
        let connect_timeout = options.connect_timeout();
        Self {
            host: Some(options.host),
            service: Some(options.service),
            path: Some(options.path),
            connect_timeout: Some(connect_timeout),
            ca_bundle: options.ca_bundle,
        }
    }

    /// Sets the host to connect to.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the service, either a port number or a scheme name.
    #[inline]
    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Sets a numeric port as the service.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.service = Some(port.to_string());
        self
    }

    /// Sets the upgrade request path. Defaults to `/`.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the deadline covering all endpoint attempts. Defaults to 5s.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Enables TLS, trusting the certificates in a PEM bundle.
    #[inline]
    #[must_use]
    pub fn ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    /// Builds validated options without creating a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if host or service is missing or the
    /// options fail [`SessionOptions::validate`].
    pub fn build_options(self) -> Result<SessionOptions> {
        let host = self.host.ok_or_else(|| {
            Error::config(
                "Host is required. Use .host() to set it.\n\
                 Example: Session::builder().host(\"localhost\")",
            )
        })?;
        let service = self.service.ok_or_else(|| {
            Error::config(
                "Service is required. Use .service() or .port() to set it.\n\
                 Example: Session::builder().port(8080)",
            )
        })?;

        let mut options = SessionOptions::new(host, service);
        if let Some(path) = self.path {
            options = options.with_path(path);
        }
        if let Some(timeout) = self.connect_timeout {
            options = options.with_connect_timeout(timeout);
        }
        if let Some(bundle) = self.ca_bundle {
            options = options.with_ca_bundle(bundle);
        }

        options.validate()?;
        Ok(options)
    }

    /// Builds a session using system DNS and a WebSocket transport.
    ///
    /// The transport is encrypted when a CA bundle was configured.
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::Io`] if the CA bundle cannot be read
    /// - [`Error::Tls`] if the CA bundle holds no usable certificate
    pub fn build(self) -> Result<Session> {
        let options = self.build_options()?;

        match options.ca_bundle.clone() {
            Some(bundle) => {
                let connector = TlsConnector::from_ca_bundle(bundle)?;
                Ok(Session::new(
                    options,
                    DnsResolver::new(),
                    SecureTransport::secure(connector),
                ))
            }
            None => Ok(Session::new(
                options,
                DnsResolver::new(),
                PlainTransport::plain(),
            )),
        }
    }

    /// Builds a session over custom ports.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn build_with<R, T>(self, resolver: R, transport: T) -> Result<Session>
    where
        R: Resolver,
        T: Transport,
    {
        let options = self.build_options()?;
        Ok(Session::new(options, resolver, transport))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::session::State;
    use crate::transport::mock::{MockTransport, StaticResolver};

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = SessionBuilder::new();
        assert!(builder.host.is_none());
        assert!(builder.service.is_none());
        assert!(builder.ca_bundle.is_none());
    }

    #[test]
    fn test_port_sets_service() {
        let builder = SessionBuilder::new().port(8080);
        assert_eq!(builder.service.as_deref(), Some("8080"));
    }

    #[test]
    fn test_build_options_applies_defaults() {
        let options = SessionBuilder::new()
            .host("localhost")
            .port(9000)
            .build_options()
            .unwrap();

        assert_eq!(options, SessionOptions::new("localhost", "9000"));
    }

    #[test]
    fn test_build_options_round_trips_options() {
        let configured = SessionOptions::new("example.com", "wss")
            .with_path("/feed")
            .with_connect_timeout(Duration::from_millis(750))
            .with_ca_bundle("/etc/ssl/cacert.pem");

        let rebuilt = SessionBuilder::new()
            .options(configured.clone())
            .build_options()
            .unwrap();

        assert_eq!(rebuilt, configured);
    }

    #[test]
    fn test_build_fails_without_host() {
        let err = SessionBuilder::new().port(80).build_options().unwrap_err();
        assert!(err.to_string().contains("Host"));
    }

    #[test]
    fn test_build_fails_without_service() {
        let err = SessionBuilder::new()
            .host("localhost")
            .build_options()
            .unwrap_err();
        assert!(err.to_string().contains("Service"));
    }

    #[test]
    fn test_build_fails_with_invalid_path() {
        let result = SessionBuilder::new()
            .host("localhost")
            .port(80)
            .path("no-slash")
            .build_options();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_build_plain_session() {
        let session = SessionBuilder::new()
            .host("localhost")
            .port(9000)
            .build()
            .unwrap();
        assert_eq!(session.state(), State::Idle);
    }

    #[tokio::test]
    async fn test_build_fails_with_missing_ca_bundle() {
        let result = SessionBuilder::new()
            .host("localhost")
            .port(443)
            .ca_bundle("/nonexistent/cacert.pem")
            .build();
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_build_with_custom_ports() {
        let session = SessionBuilder::new()
            .host("localhost")
            .port(9001)
            .build_with(StaticResolver::localhost(), MockTransport::new())
            .unwrap();
        assert_eq!(session.state(), State::Idle);
    }
}
