//! Session configuration.
//!
//! [`SessionOptions`] names the peer (host, service, path), the connect-phase
//! deadline and, for encrypted sessions, the trust anchor bundle.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use network_monitor::SessionOptions;
//!
//! let options = SessionOptions::new("echo.example.com", "443")
//!     .with_path("/socket")
//!     .with_connect_timeout(Duration::from_secs(3))
//!     .with_ca_bundle("cacert.pem");
//!
//! options.validate()?;
//! ```
//!
//! Options can also be loaded from a JSON document:
//!
//! ```json
//! { "host": "echo.example.com", "service": "443", "caBundle": "cacert.pem" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default request path.
const DEFAULT_PATH: &str = "/";

/// Default connect-phase deadline in milliseconds.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SessionOptions
// ============================================================================

/// Connection parameters for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// Host name to resolve and to present in the upgrade request.
    pub host: String,

    /// Port number or service name.
    pub service: String,

    /// Request path of the WebSocket upgrade.
    #[serde(default = "default_path")]
    pub path: String,

    /// Deadline covering every endpoint attempt after resolution.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// PEM bundle of trusted roots. Enables TLS when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<PathBuf>,
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

const fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

// ============================================================================
// Constructors
// ============================================================================

impl SessionOptions {
    /// Creates options for `host` and `service` with default path and timeout.
    #[must_use]
    pub fn new(host: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            service: service.into(),
            path: default_path(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            ca_bundle: None,
        }
    }

    /// Loads and validates options from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Json`] if it is not a valid options document
    /// - [`Error::Config`] if the options fail validation
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let options: Self = read_json_file(path)?;
        options.validate()?;
        Ok(options)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Sets the request path.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the connect-phase deadline.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_millis(timeout);
        self
    }

    /// Enables TLS, trusting the certificates in `path`.
    #[inline]
    #[must_use]
    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }
}

/// Converts to whole milliseconds, saturating at `u64::MAX`.
///
/// A non-zero duration below one millisecond rounds up so it never reads
/// as "no deadline".
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    match u64::try_from(duration.as_millis()).unwrap_or(u64::MAX) {
        0 if !duration.is_zero() => 1,
        millis => millis,
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl SessionOptions {
    /// Returns the connect-phase deadline.
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns `true` if the session runs over TLS.
    #[inline]
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.ca_bundle.is_some()
    }

    /// Returns the URL the upgrade request targets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if host, service or path do not form a URL.
    pub fn url(&self) -> Result<Url> {
        let scheme = if self.is_secure() { "wss" } else { "ws" };
        let raw = format!("{scheme}://{}{}", self.host, self.path);
        Url::parse(&raw).map_err(|e| Error::config(format!("Invalid target '{raw}': {e}")))
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("Host must not be empty"));
        }
        if self.service.trim().is_empty() {
            return Err(Error::config("Service must not be empty"));
        }
        if !self.path.starts_with('/') {
            return Err(Error::config(format!(
                "Path must start with '/', got '{}'",
                self.path
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::config("Connect timeout must be greater than zero"));
        }
        self.url()?;
        Ok(())
    }
}

// ============================================================================
// JSON Documents
// ============================================================================

/// Parses the JSON document at `path` into `T`.
///
/// # Errors
///
/// - [`Error::Io`] if the file cannot be opened
/// - [`Error::Json`] if the content does not deserialize into `T`
pub fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

// ============================================================================
// Tests
// ============================================================================
