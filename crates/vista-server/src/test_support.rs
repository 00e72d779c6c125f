//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use vista_core::memory::{MemoryEngine, StaticProject};
use vista_core::stack::{NativeStackParser, StackParser};
use vista_core::{Engine, ParsedStack};
use vista_rpc::{MethodRegistry, RpcChannel, Transport, TransportError};

use crate::context::BridgeContext;
use crate::handlers;
use crate::websocket::ObserverChannel;

/// Engine with an empty core project rooted at `/repo`.
pub(crate) fn make_engine() -> Arc<MemoryEngine> {
    Arc::new(MemoryEngine::new(Arc::new(StaticProject::new("core", "/repo"))))
}

/// Context over a fresh engine.
pub(crate) fn make_context() -> Arc<BridgeContext> {
    context_for(make_engine())
}

/// Context over `engine`.
pub(crate) fn context_for(engine: Arc<MemoryEngine>) -> Arc<BridgeContext> {
    let engine: Arc<dyn Engine> = engine;
    Arc::new(BridgeContext::new(engine))
}

/// Channel with every handler registered.
pub(crate) fn make_channel(
    transport: Arc<dyn Transport>,
    context: Arc<BridgeContext>,
) -> Arc<ObserverChannel> {
    let mut registry = MethodRegistry::new();
    handlers::register_all(&mut registry);
    Arc::new(RpcChannel::new("test", transport, Arc::new(registry), context))
}

/// Transport backed by an unbounded queue.
pub(crate) struct QueueTransport {
    tx: mpsc::UnboundedSender<Arc<String>>,
}

impl QueueTransport {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<Arc<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for QueueTransport {
    fn send(&self, frame: Arc<String>) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }
}

/// Transport that refuses every frame.
pub(crate) struct FailingTransport;

impl Transport for FailingTransport {
    fn send(&self, _frame: Arc<String>) -> Result<(), TransportError> {
        Err(TransportError::Other("socket reset".into()))
    }
}

/// Native parser that counts how often it runs.
#[derive(Default)]
pub(crate) struct CountingParser {
    inner: NativeStackParser,
    pub(crate) calls: AtomicUsize,
}

impl CountingParser {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StackParser for CountingParser {
    fn parse_stack(&self, stack: &str) -> Vec<ParsedStack> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.parse_stack(stack)
    }
}
