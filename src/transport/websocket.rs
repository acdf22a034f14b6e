//! WebSocket transport over a pluggable stream connector.
//!
//! [`WebSocketTransport`] implements the [`Transport`] port on top of
//! `tokio-tungstenite`. The stream is split after the upgrade so that one
//! read and one write can be outstanding at the same time; each half sits
//! behind its own async mutex, which keeps every direction to a single
//! outstanding operation.
//!
//! # Close and Cancellation
//!
//! [`Transport::close`] raises a closing flag before sending the close
//! frame. A read waiting on the stream observes the flag and completes
//! with [`Error::OperationAborted`], releasing the read half so the close
//! handshake can consume the peer's close reply.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{WebSocketStream, client_async};
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::connector::{Connector, TcpConnector, TlsConnector};
use super::{Endpoint, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for the peer's close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

type WsStream<C> = WebSocketStream<<C as Connector>::Stream>;

/// Plain `ws://` transport.
pub type PlainTransport = WebSocketTransport<TcpConnector>;

/// Encrypted `wss://` transport.
pub type SecureTransport = WebSocketTransport<TlsConnector>;

// ============================================================================
// WebSocketTransport
// ============================================================================

/// WebSocket [`Transport`] layered on a [`Connector`] stream.
pub struct WebSocketTransport<C: Connector> {
    /// Stream factory.
    connector: C,
    /// Connected stream and peer port, waiting for the upgrade.
    stream: SyncMutex<Option<(C::Stream, u16)>>,
    /// Write half after the upgrade.
    sink: Mutex<Option<SplitSink<WsStream<C>, Message>>>,
    /// Read half after the upgrade.
    source: Mutex<Option<SplitStream<WsStream<C>>>>,
    /// Outbound frames are text when set, binary otherwise.
    text: AtomicBool,
    /// Raised by `close` to abort an outstanding read.
    closing: watch::Sender<bool>,
}

impl<C: Connector> WebSocketTransport<C> {
    /// Creates an unconnected transport using `connector`.
    #[must_use]
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            stream: SyncMutex::new(None),
            sink: Mutex::new(None),
            source: Mutex::new(None),
            text: AtomicBool::new(false),
            closing: watch::Sender::new(false),
        }
    }

    /// Encodes an outbound payload according to the framing mode.
    fn frame(&self, payload: &[u8]) -> Result<Message> {
        if self.text.load(Ordering::Acquire) {
            let text = std::str::from_utf8(payload)
                .map_err(|e| Error::write(format!("text frame is not valid UTF-8: {e}")))?;
            Ok(Message::Text(text.to_owned().into()))
        } else {
            Ok(Message::Binary(payload.to_vec().into()))
        }
    }
}

impl PlainTransport {
    /// Creates a plain `ws://` transport.
    #[inline]
    #[must_use]
    pub fn plain() -> Self {
        Self::new(TcpConnector)
    }
}

impl SecureTransport {
    /// Creates a `wss://` transport using `connector`.
    #[inline]
    #[must_use]
    pub fn secure(connector: TlsConnector) -> Self {
        Self::new(connector)
    }
}

#[async_trait]
impl<C: Connector> Transport for WebSocketTransport<C> {
    async fn connect(&self, endpoint: &Endpoint) -> Result<()> {
        let stream = self.connector.connect(endpoint).await?;
        *self.stream.lock() = Some((stream, endpoint.addr().port()));
        Ok(())
    }

    async fn handshake(&self, host: &str, path: &str) -> Result<()> {
        let (stream, port) = self
            .stream
            .lock()
            .take()
            .ok_or_else(|| Error::handshake("transport is not connected"))?;

        let uri = upgrade_uri::<C>(host, port, path);
        let (ws_stream, response) = client_async(uri.as_str(), stream)
            .await
            .map_err(|e| Error::handshake(e.to_string()))?;

        debug!(%uri, status = %response.status(), "WebSocket upgrade completed");

        let (sink, source) = ws_stream.split();
        *self.sink.lock().await = Some(sink);
        *self.source.lock().await = Some(source);
        Ok(())
    }

    fn set_text(&self, text: bool) {
        self.text.store(text, Ordering::Release);
    }

    async fn write(&self, payload: &[u8]) -> Result<usize> {
        let message = self.frame(payload)?;

        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(Error::NotConnected)?;
        sink.send(message)
            .await
            .map_err(|e| Error::write(e.to_string()))?;

        trace!(bytes = payload.len(), "Frame written");
        Ok(payload.len())
    }

    async fn read(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        let mut closing = self.closing.subscribe();
        let mut guard = self.source.lock().await;
        let source = guard.as_mut().ok_or(Error::NotConnected)?;

        loop {
            let next = tokio::select! {
                biased;
                () = closing_raised(&mut closing) => return Err(Error::OperationAborted),
                next = source.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    buffer.extend_from_slice(text.as_bytes());
                    return Ok(text.len());
                }
                Some(Ok(Message::Binary(data))) => {
                    buffer.extend_from_slice(&data);
                    return Ok(data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Close frame received");
                    return Err(Error::ConnectionClosed);
                }
                // Ping, Pong and raw frames carry no payload for the caller
                Some(Ok(_)) => continue,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return Err(Error::ConnectionClosed);
                }
                Some(Err(WsError::Io(e))) => return Err(Error::Io(e)),
                Some(Err(e)) => return Err(Error::read(e.to_string())),
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.closing.send_replace(true);

        {
            let mut guard = self.sink.lock().await;
            let sink = guard.as_mut().ok_or(Error::NotConnected)?;
            sink.close()
                .await
                .map_err(|e| Error::close(e.to_string()))?;
        }

        // Consume frames until the peer answers with its own close frame.
        let mut guard = self.source.lock().await;
        let result = match guard.as_mut() {
            Some(source) => timeout(CLOSE_TIMEOUT, drain_until_closed(source))
                .await
                .unwrap_or_else(|_| Err(Error::close("timed out waiting for close frame"))),
            None => Ok(()),
        };

        *guard = None;
        *self.sink.lock().await = None;

        debug!(ok = result.is_ok(), "Close handshake finished");
        result
    }
}

/// Builds the upgrade request URI; the port is kept unless it is the
/// scheme's default, so the `Host` header names the real peer.
fn upgrade_uri<C: Connector>(host: &str, port: u16, path: &str) -> String {
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    };

    if port == C::DEFAULT_PORT {
        format!("{}://{host}{path}", C::SCHEME)
    } else {
        format!("{}://{host}:{port}{path}", C::SCHEME)
    }
}

/// Resolves once `close` has raised the closing flag.
async fn closing_raised(closing: &mut watch::Receiver<bool>) {
    // A dropped sender means the transport is gone, which also ends the read.
    let _ = closing.wait_for(|closing| *closing).await;
}

/// Reads until the stream reports the close handshake as complete.
async fn drain_until_closed<S>(source: &mut SplitStream<WebSocketStream<S>>) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        match source.next().await {
            Some(Ok(_)) => continue,
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => return Ok(()),
            Some(Err(e)) => return Err(Error::close(e.to_string())),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
