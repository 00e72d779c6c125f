//! Observer connection state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;
use vista_rpc::{RpcChannel, RpcError, Transport, TransportError};

use crate::context::BridgeContext;

/// The RPC channel attached to every observer connection.
pub type ObserverChannel = RpcChannel<BridgeContext>;

/// Unique connection id, `conn_<uuid v7>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepting and delivering frames.
    Open,
    /// Close started; nothing new is delivered.
    Closing,
    /// Channel closed, pending calls failed.
    Closed,
}

/// Outbound half of a socket: frames go into the session's write queue.
pub struct WsTransport {
    tx: mpsc::Sender<Arc<String>>,
}

impl WsTransport {
    /// Transport feeding `tx`.
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        Self { tx }
    }
}

impl Transport for WsTransport {
    fn send(&self, frame: Arc<String>) -> Result<(), TransportError> {
        self.tx.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => TransportError::Full,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

/// One connected observer.
pub struct Connection {
    id: ConnectionId,
    channel: Arc<ObserverChannel>,
    state: Mutex<ConnectionState>,
    /// When this connection was established.
    pub connected_at: Instant,
    last_seen: Mutex<Instant>,
    dropped_frames: AtomicU64,
}

impl Connection {
    /// Wrap an open channel.
    pub fn new(id: ConnectionId, channel: Arc<ObserverChannel>) -> Self {
        let now = Instant::now();
        Self {
            id,
            channel,
            state: Mutex::new(ConnectionState::Open),
            connected_at: now,
            last_seen: Mutex::new(now),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// The attached RPC channel.
    pub fn channel(&self) -> &Arc<ObserverChannel> {
        &self.channel
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Whether frames are still delivered.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Deliver a pre-encoded push frame.
    ///
    /// A refused frame is counted and reported; it is never retried.
    pub fn deliver(&self, frame: Arc<String>) -> Result<(), RpcError> {
        if !self.is_open() {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            return Err(RpcError::TransportClosed);
        }
        self.channel.push_encoded(frame).inspect_err(|_| {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
        })
    }

    /// Frames refused so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Close the connection and fail its pending calls.
    ///
    /// Returns `false` when it was already closing or closed.
    pub fn close(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Open {
                return false;
            }
            *state = ConnectionState::Closing;
        }
        self.channel.close();
        *self.state.lock() = ConnectionState::Closed;
        true
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound activity.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
