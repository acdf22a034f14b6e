//! In-memory resolver and transport for unit tests.
//!
//! Both doubles are cheap to clone and share their state, so a test can hand
//! one copy to a session and keep another to script the peer and inspect the
//! recorded operations.

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::error::{Error, Result};

use super::{Endpoint, Resolver, Transport};

// ============================================================================
// Helpers
// ============================================================================

/// Returns a loopback endpoint on `port`.
pub(crate) fn endpoint(port: u16) -> Endpoint {
    Endpoint::new(
        "localhost",
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
    )
}

// ============================================================================
// StaticResolver
// ============================================================================

/// Resolver returning a fixed answer.
#[derive(Clone)]
pub(crate) struct StaticResolver {
    answer: std::result::Result<Vec<Endpoint>, String>,
    calls: Arc<AtomicUsize>,
}

impl StaticResolver {
    /// Resolves every query to `endpoints`.
    pub(crate) fn with_endpoints(endpoints: Vec<Endpoint>) -> Self {
        Self {
            answer: Ok(endpoints),
            calls: Arc::default(),
        }
    }

    /// Resolves every query to a single loopback endpoint.
    pub(crate) fn localhost() -> Self {
        Self::with_endpoints(vec![endpoint(9001)])
    }

    /// Fails every query with `reason`.
    pub(crate) fn failing(reason: &str) -> Self {
        Self {
            answer: Err(reason.to_string()),
            calls: Arc::default(),
        }
    }

    /// Number of queries answered so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str, service: &str) -> Result<Vec<Endpoint>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Ok(endpoints) => Ok(endpoints.clone()),
            Err(reason) => Err(Error::resolve(host, service, reason.clone())),
        }
    }
}

// ============================================================================
// MockTransport
// ============================================================================

/// Operation recorded by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    Connect(SocketAddr),
    Handshake { host: String, path: String },
    SetText(bool),
    Read,
    Write(Vec<u8>),
    Close,
}

/// Scripted behaviour of a [`MockTransport`].
#[derive(Debug, Default)]
pub(crate) struct MockConfig {
    /// Endpoints whose connect attempt is refused.
    pub refuse: HashSet<SocketAddr>,
    /// Connect attempts never complete.
    pub hang_on_connect: bool,
    /// Handshakes never complete.
    pub hang_on_handshake: bool,
    /// Handshake fails with this reason.
    pub handshake_error: Option<String>,
    /// Every write waits this long before completing.
    pub write_delay: Option<Duration>,
    /// Close waits this long before completing.
    pub close_delay: Option<Duration>,
    /// Close fails with this reason.
    pub close_error: Option<String>,
    /// Written payloads are delivered back as inbound messages.
    pub echo: bool,
}

struct Shared {
    config: MockConfig,
    ops: Mutex<Vec<Op>>,
    inbound_tx: mpsc::UnboundedSender<Result<Vec<u8>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Vec<u8>>>>,
    closing: watch::Sender<bool>,
    text: AtomicBool,
    writes_in_flight: AtomicUsize,
    max_writes_in_flight: AtomicUsize,
}

/// Transport driven by a script and an injectable inbound queue.
#[derive(Clone)]
pub(crate) struct MockTransport {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Creates a transport that accepts everything.
    pub(crate) fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// Creates a transport that echoes every write.
    pub(crate) fn echo() -> Self {
        Self::with_config(MockConfig {
            echo: true,
            ..MockConfig::default()
        })
    }

    /// Creates a transport following `config`.
    pub(crate) fn with_config(config: MockConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                config,
                ops: Mutex::new(Vec::new()),
                inbound_tx,
                inbound_rx: tokio::sync::Mutex::new(inbound_rx),
                closing: watch::Sender::new(false),
                text: AtomicBool::new(false),
                writes_in_flight: AtomicUsize::new(0),
                max_writes_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Queues an inbound message or read failure.
    pub(crate) fn push_inbound(&self, item: Result<Vec<u8>>) {
        let _ = self.shared.inbound_tx.send(item);
    }

    /// Simulates the peer dropping the connection.
    pub(crate) fn drop_connection(&self) {
        self.push_inbound(Err(Error::ConnectionClosed));
    }

    /// Returns every recorded operation.
    pub(crate) fn ops(&self) -> Vec<Op> {
        self.shared.ops.lock().clone()
    }

    /// Returns the payloads written so far, in order.
    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Write(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    /// Returns how many times `predicate` matched a recorded operation.
    pub(crate) fn count(&self, predicate: impl Fn(&Op) -> bool) -> usize {
        self.shared.ops.lock().iter().filter(|op| predicate(op)).count()
    }

    /// Highest number of writes observed in flight at once.
    pub(crate) fn max_writes_in_flight(&self) -> usize {
        self.shared.max_writes_in_flight.load(Ordering::SeqCst)
    }

    /// Returns the last framing mode selected.
    pub(crate) fn is_text(&self) -> bool {
        self.shared.text.load(Ordering::SeqCst)
    }

    fn record(&self, op: Op) {
        self.shared.ops.lock().push(op);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, endpoint: &Endpoint) -> Result<()> {
        self.record(Op::Connect(endpoint.addr()));
        if self.shared.config.hang_on_connect {
            std::future::pending::<()>().await;
        }
        if self.shared.config.refuse.contains(&endpoint.addr()) {
            return Err(Error::connect(endpoint, "connection refused"));
        }
        Ok(())
    }

    async fn handshake(&self, host: &str, path: &str) -> Result<()> {
        self.record(Op::Handshake {
            host: host.to_string(),
            path: path.to_string(),
        });
        if self.shared.config.hang_on_handshake {
            std::future::pending::<()>().await;
        }
        match &self.shared.config.handshake_error {
            Some(reason) => Err(Error::handshake(reason.clone())),
            None => Ok(()),
        }
    }

    fn set_text(&self, text: bool) {
        self.record(Op::SetText(text));
        self.shared.text.store(text, Ordering::SeqCst);
    }

    async fn write(&self, payload: &[u8]) -> Result<usize> {
        self.record(Op::Write(payload.to_vec()));

        let shared = &self.shared;
        let in_flight = shared.writes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        shared
            .max_writes_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        if let Some(delay) = shared.config.write_delay {
            tokio::time::sleep(delay).await;
        }

        shared.writes_in_flight.fetch_sub(1, Ordering::SeqCst);

        if shared.config.echo {
            self.push_inbound(Ok(payload.to_vec()));
        }
        Ok(payload.len())
    }

    async fn read(&self, buffer: &mut Vec<u8>) -> Result<usize> {
        self.record(Op::Read);

        let mut closing = self.shared.closing.subscribe();
        let mut inbound = self.shared.inbound_rx.lock().await;

        tokio::select! {
            biased;
            () = closing_raised(&mut closing) => Err(Error::OperationAborted),
            next = inbound.recv() => match next {
                Some(Ok(payload)) => {
                    buffer.extend_from_slice(&payload);
                    Ok(payload.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(Error::ConnectionClosed),
            },
        }
    }

    async fn close(&self) -> Result<()> {
        self.record(Op::Close);
        self.shared.closing.send_replace(true);
        if let Some(delay) = self.shared.config.close_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.shared.config.close_error {
            Some(reason) => Err(Error::close(reason.clone())),
            None => Ok(()),
        }
    }
}

async fn closing_raised(closing: &mut watch::Receiver<bool>) {
    let _ = closing.wait_for(|closing| *closing).await;
}
