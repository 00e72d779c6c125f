//! Shared state handed to every method handler.

use std::sync::Arc;

use vista_core::Engine;

/// What handlers can reach: the engine, and nothing else.
#[derive(Clone)]
pub struct BridgeContext {
    /// The engine whose state is exposed.
    pub engine: Arc<dyn Engine>,
}

impl BridgeContext {
    /// Context over `engine`.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }
}
