//! Connection handle and identifiers

use chrono::{DateTime, Utc};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::hub::HubHandle;

use super::lifecycle::{ConnectionState, Lifecycle};

/// Opaque connection identifier. Uniqueness is up to whoever creates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Monotonic id source owned by the listener
#[derive(Debug)]
pub struct ConnectionIdGenerator {
    next: AtomicU64,
}

impl ConnectionIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// One authenticated client stream.
///
/// Shared as `Arc<Connection>` between the hub registry and the task that
/// runs the stream; the transport itself stays with that task.
pub struct Connection {
    pub id: ConnectionId,
    pub remote_addr: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
    /// Last activity timestamp (Unix seconds)
    last_activity: AtomicI64,
    lifecycle: Lifecycle,
    close_tx: watch::Sender<bool>,
    hub: HubHandle,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        lifecycle: Lifecycle,
        remote_addr: Option<SocketAddr>,
        hub: HubHandle,
    ) -> Self {
        let now = Utc::now();
        let (close_tx, _) = watch::channel(false);
        Self {
            id,
            remote_addr,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
            lifecycle,
            close_tx,
            hub,
        }
    }

    /// Connection accepted by the listener and waiting on the auth gate
    pub fn accepted(
        id: ConnectionId,
        remote_addr: Option<SocketAddr>,
        hub: HubHandle,
    ) -> Self {
        Self::new(id, Lifecycle::authenticating(), remote_addr, hub)
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    pub fn advance(&self, next: ConnectionState) -> Result<ConnectionState, GatewayError> {
        self.lifecycle.advance(next)
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    /// Ask the task running this connection's stream to stop.
    pub fn close(&self) {
        self.close_tx.send_replace(true);
    }

    pub fn is_close_requested(&self) -> bool {
        *self.close_tx.borrow()
    }

    pub fn close_signal(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }

    /// Submit an Add event for this connection.
    pub async fn register(self: &Arc<Self>) -> Result<(), GatewayError> {
        self.hub.add(self.clone()).await
    }

    /// Submit a Remove event for this connection.
    pub async fn unregister(self: &Arc<Self>) -> Result<(), GatewayError> {
        self.hub.remove(self.clone()).await
    }

    /// Funnel an error to the hub for central logging.
    pub async fn report(&self, error: GatewayError) {
        if let Err(e) = self.hub.err(error).await {
            tracing::debug!(connection_id = %self.id, error = %e, "Dropped connection error report");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Why a connection's read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    ProtocolError,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::ProtocolError => "protocol_error",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
