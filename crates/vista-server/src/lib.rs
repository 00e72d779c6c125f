//! # vista-server
//!
//! Axum `WebSocket` bridge between a test engine and its observers.
//!
//! - API endpoint: one RPC channel per accepted socket, 13 callable methods
//! - Event fan-out: [`reporter::WebSocketReporter`] pushes engine lifecycle
//!   events to every open connection
//! - HTTP endpoints: health check, Prometheus metrics
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod reporter;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use context::BridgeContext;
pub use errors::ServerError;
pub use reporter::WebSocketReporter;
pub use server::{ApiState, VistaServer, api_router};

#[cfg(test)]
mod test_support;
