//! Outbound frame sink.

use std::sync::Arc;

/// Why a frame could not be handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer is gone.
    #[error("transport closed")]
    Closed,
    /// The outbound queue is full.
    #[error("send queue full")]
    Full,
    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

/// Writes encoded frames towards the peer.
///
/// `send` must not block: implementations queue the frame and return.
pub trait Transport: Send + Sync {
    /// Queue one encoded frame.
    fn send(&self, frame: Arc<String>) -> Result<(), TransportError>;
}
