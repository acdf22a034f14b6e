//! Stream connectors for the WebSocket transport.
//!
//! A [`Connector`] establishes the byte stream a WebSocket is layered on.
//! Encrypted connectors finish their TLS handshake here, so the WebSocket
//! upgrade always runs over a fully established stream.
//!
//! | Connector | Stream | Scheme |
//! |-----------|--------|--------|
//! | [`TcpConnector`] | `TcpStream` | `ws` |
//! | [`TlsConnector`] | `TlsStream<TcpStream>` | `wss` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::Endpoint;

// ============================================================================
// Connector
// ============================================================================

/// Establishes the stream a WebSocket connection runs over.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connected stream type.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// URI scheme used for the WebSocket upgrade request.
    const SCHEME: &'static str;

    /// Port implied by [`SCHEME`](Self::SCHEME).
    const DEFAULT_PORT: u16;

    /// Connects to `endpoint`.
    ///
    /// # Errors
    ///
    /// - [`Error::Connect`] if the TCP connection fails
    /// - [`Error::Tls`] if the TLS handshake fails
    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Stream>;
}

// ============================================================================
// TcpConnector
// ============================================================================

/// Plain TCP connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    const SCHEME: &'static str = "ws";
    const DEFAULT_PORT: u16 = 80;

    async fn connect(&self, endpoint: &Endpoint) -> Result<TcpStream> {
        let stream = TcpStream::connect(endpoint.addr())
            .await
            .map_err(|e| Error::connect(endpoint, e.to_string()))?;

        // Messages are small and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            trace!(error = %e, "Failed to set TCP_NODELAY");
        }

        debug!(%endpoint, "TCP connection established");
        Ok(stream)
    }
}

// ============================================================================
// TlsConnector
// ============================================================================

/// TLS-over-TCP connector validating peers against a trust anchor bundle.
#[derive(Clone)]
pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
}

impl fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConnector").finish_non_exhaustive()
    }
}

impl TlsConnector {
    /// Creates a connector trusting the certificates in a PEM bundle.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the bundle cannot be opened
    /// - [`Error::Tls`] if it contains no usable certificate
    pub fn from_ca_bundle(path: impl AsRef<Path>) -> Result<Self> {
        let roots = load_trust_anchors(path.as_ref())?;
        Self::with_roots(roots)
    }

    /// Creates a connector trusting the given root store.
    ///
    /// Uses the process-wide crypto provider when one is installed,
    /// otherwise ring.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if the provider supports no protocol version.
    pub fn with_roots(roots: RootCertStore) -> Result<Self> {
        let provider = CryptoProvider::get_default()
            .cloned()
            .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()));

        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            inner: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }
}

#[async_trait]
impl Connector for TlsConnector {
    type Stream = TlsStream<TcpStream>;

    const SCHEME: &'static str = "wss";
    const DEFAULT_PORT: u16 = 443;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Stream> {
        let tcp = TcpConnector.connect(endpoint).await?;

        let server_name = ServerName::try_from(endpoint.host().to_owned())
            .map_err(|e| Error::tls(format!("invalid server name '{}': {e}", endpoint.host())))?;

        let stream = self
            .inner
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::tls(format!("handshake with {endpoint} failed: {e}")))?;

        debug!(%endpoint, "TLS session established");
        Ok(stream)
    }
}

// ============================================================================
// Trust Anchors
// ============================================================================

/// Loads every PEM certificate in `path` into a root store.
///
/// Certificates that fail to parse are skipped; the bundle must yield at
/// least one usable anchor.
///
/// # Errors
///
/// - [`Error::Io`] if the file cannot be read
/// - [`Error::Tls`] if no certificate could be added
pub fn load_trust_anchors(path: &Path) -> Result<RootCertStore> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut store = RootCertStore::empty();
    let mut invalid = 0usize;

    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert?;
        if let Err(e) = store.add(cert) {
            warn!(error = %e, "Skipping invalid trust anchor");
            invalid += 1;
        }
    }

    if store.is_empty() {
        return Err(Error::tls(format!(
            "no usable certificates in {} ({invalid} invalid)",
            path.display()
        )));
    }

    debug!(path = %path.display(), valid = store.len(), invalid, "Loaded trust anchors");
    Ok(store)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_schemes() {
        assert_eq!(TcpConnector::SCHEME, "ws");
        assert_eq!(TlsConnector::SCHEME, "wss");
        assert_eq!(TcpConnector::DEFAULT_PORT, 80);
        assert_eq!(TlsConnector::DEFAULT_PORT, 443);
    }

    #[test]
    fn test_missing_bundle_is_io_error() {
        let err = load_trust_anchors(Path::new("/nonexistent/cacert.pem")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_bundle_without_certificates() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "not a certificate").expect("write");

        let err = load_trust_anchors(file.path()).unwrap_err();
        assert!(matches!(err, Error::Tls { .. }));
        assert!(TlsConnector::from_ca_bundle(file.path()).is_err());
    }

    #[test]
    fn test_with_empty_roots_builds() {
        assert!(TlsConnector::with_roots(RootCertStore::empty()).is_ok());
    }

    #[tokio::test]
    async fn test_tcp_connect_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let endpoint = Endpoint::new("127.0.0.1", addr);
        let err = TcpConnector.connect(&endpoint).await.unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
    }
}
