//! # vista-rpc
//!
//! Bidirectional call channel between the bridge and one observer.
//!
//! - [`frame`]: request / push / response frames and their wire encoding
//! - [`channel::RpcChannel`]: pending-call map, timeouts, inbound dispatch
//! - [`registry::MethodRegistry`]: locally callable handlers
//! - [`events`]: the push events observers receive and the methods they call

#![deny(unsafe_code)]

pub mod args;
pub mod channel;
pub mod errors;
pub mod events;
pub mod frame;
pub mod registry;
pub mod transport;

pub use args::Args;
pub use channel::RpcChannel;
pub use errors::{ErrorBody, RpcError};
pub use events::{ClientEvent, ServerMethod};
pub use frame::CallFrame;
pub use registry::{MethodHandler, MethodRegistry};
pub use transport::{Transport, TransportError};
