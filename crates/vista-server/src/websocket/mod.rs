//! Observer connections: identity and state, the shared registry, and the
//! per-socket session loop.

pub mod connection;
pub mod registry;
pub mod session;

pub use connection::{Connection, ConnectionId, ConnectionState, ObserverChannel, WsTransport};
pub use registry::ConnectionRegistry;
