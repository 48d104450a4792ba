//! Connections and their lifecycle tracking.
//!
//! # Responsibilities
//! - Bundle a scope with its inbound stream and outbound sink
//! - Generate unique connection IDs for tracing
//! - Count live connections so shutdown can drain them
//! - Provide an in-memory channel pair for hosts and tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::PollSender;

use crate::net::message::{Inbound, InboundStream, Outbound, OutboundSink, TransportError};
use crate::net::scope::{ConnectionScope, TransportKind};
use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough since only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One bidirectional channel between a client and the application.
///
/// Dropping the connection drops both halves; the host observes that as
/// the handler being finished.
pub struct Connection {
    pub id: ConnectionId,
    pub scope: ConnectionScope,
    pub inbound: InboundStream,
    pub outbound: OutboundSink,
}

impl Connection {
    pub fn new(scope: ConnectionScope, inbound: InboundStream, outbound: OutboundSink) -> Self {
        Self {
            id: ConnectionId::new(),
            scope,
            inbound,
            outbound,
        }
    }

    /// Build a connection backed by bounded channels.
    ///
    /// The returned [`PeerEnd`] plays the host: it feeds inbound events and
    /// reads outbound commands. Dropping its sender ends the inbound stream,
    /// which handlers treat as a disconnect. A `buffer` of zero is raised
    /// to one.
    pub fn pair(scope: ConnectionScope, buffer: usize) -> (Self, PeerEnd) {
        let buffer = buffer.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer);

        let inbound = ReceiverStream::new(inbound_rx).boxed();
        let outbound: OutboundSink =
            Box::pin(PollSender::new(outbound_tx).sink_map_err(|_| TransportError::Closed));

        let connection = Self::new(scope, inbound, outbound);
        let peer = PeerEnd {
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        (connection, peer)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Host side of a channel-backed [`Connection`].
pub struct PeerEnd {
    pub inbound: mpsc::Sender<Inbound>,
    pub outbound: mpsc::Receiver<Outbound>,
}

impl PeerEnd {
    /// Deliver one event to the handler.
    pub async fn send(&self, event: Inbound) -> Result<(), TransportError> {
        self.inbound
            .send(event)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Next command from the handler, `None` once every writer is gone.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }
}

/// Tracks live connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new live connection. Returns a guard that decrements on drop.
    pub fn track(&self, id: ConnectionId, kind: TransportKind) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::record_connection_opened(kind);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id,
            kind,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed or the deadline passes.
    ///
    /// Returns `true` when the tracker drained in time.
    pub async fn wait_for_drain(&self, deadline: Duration) -> bool {
        let wait = async {
            while self.active_count.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(deadline, wait).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
    kind: TransportKind,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::record_connection_closed(self.kind);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
