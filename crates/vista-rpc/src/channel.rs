//! One RPC channel per connection.
//!
//! Outbound calls register a waiter keyed by call id and wait for the
//! matching response frame. Inbound requests are dispatched on their own
//! task so a slow handler never blocks the reader loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use vista_codec::Graph;

use crate::args::Args;
use crate::errors::RpcError;
use crate::events::ClientEvent;
use crate::frame::CallFrame;
use crate::registry::MethodRegistry;
use crate::transport::Transport;

/// Default time an outbound call waits for its response.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

type Waiter = oneshot::Sender<Result<Graph, RpcError>>;

/// Bidirectional call channel over one transport.
pub struct RpcChannel<C> {
    label: String,
    transport: Arc<dyn Transport>,
    handlers: Arc<MethodRegistry<C>>,
    context: Arc<C>,
    pending: Mutex<HashMap<String, Waiter>>,
    next_id: AtomicU64,
    timeout: Duration,
    closed: AtomicBool,
}

impl<C: Send + Sync + 'static> RpcChannel<C> {
    /// Create a channel. `label` names the peer in logs.
    pub fn new(
        label: impl Into<String>,
        transport: Arc<dyn Transport>,
        handlers: Arc<MethodRegistry<C>>,
        context: Arc<C>,
    ) -> Self {
        Self {
            label: label.into(),
            transport,
            handlers,
            context,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            timeout: DEFAULT_CALL_TIMEOUT,
            closed: AtomicBool::new(false),
        }
    }

    /// Override the outbound call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Peer label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of outbound calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().len()
    }

    /// Call a remote method and wait for its response.
    pub async fn call(&self, method: &str, args: Args) -> Result<Graph, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();
        {
            // `close` flips the flag under this lock, so a waiter is either
            // refused here or drained there.
            let mut pending = self.pending.lock();
            if self.is_closed() {
                return Err(RpcError::TransportClosed);
            }
            let _ = pending.insert(id.clone(), tx);
        }

        let frame = CallFrame::Request {
            id: id.clone(),
            method: method.to_owned(),
            args,
        };
        if let Err(err) = self.transport.send(Arc::new(frame.encode())) {
            let _ = self.pending.lock().remove(&id);
            debug!(peer = %self.label, method, error = %err, "call not sent");
            return Err(RpcError::TransportClosed);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_dropped)) => Err(RpcError::ConnectionClosed),
            Err(_elapsed) => {
                let _ = self.pending.lock().remove(&id);
                warn!(peer = %self.label, method, "call timed out");
                Err(RpcError::Timeout {
                    method: method.to_owned(),
                })
            }
        }
    }

    /// Send a push event. Does not wait for anything.
    pub fn push(&self, event: ClientEvent, args: Args) -> Result<(), RpcError> {
        let frame = CallFrame::event(event, args);
        self.push_encoded(Arc::new(frame.encode()))
    }

    /// Send a frame that was already encoded (shared across connections).
    pub fn push_encoded(&self, frame: Arc<String>) -> Result<(), RpcError> {
        if self.is_closed() {
            return Err(RpcError::TransportClosed);
        }
        self.transport
            .send(frame)
            .map_err(|_| RpcError::TransportClosed)
    }

    /// Feed one inbound frame.
    ///
    /// Returns a protocol error when the frame cannot be decoded; the caller
    /// is expected to close the connection.
    pub fn receive(self: &Arc<Self>, raw: &str) -> Result<(), RpcError> {
        match CallFrame::decode(raw)? {
            CallFrame::Request { id, method, args } => {
                let channel = Arc::clone(self);
                let _ = tokio::spawn(async move {
                    channel.answer(id, method, args).await;
                });
            }
            CallFrame::Push { method, args } => {
                let channel = Arc::clone(self);
                let _ = tokio::spawn(async move {
                    if let Err(err) = channel
                        .handlers
                        .dispatch(&method, args, &channel.context)
                        .await
                    {
                        debug!(peer = %channel.label, method = %method, error = %err, "push handler failed");
                    }
                });
            }
            CallFrame::Response { id, outcome } => {
                let waiter = self.pending.lock().remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(outcome.map_err(RpcError::Remote));
                    }
                    None => debug!(peer = %self.label, id = %id, "response for unknown call"),
                }
            }
        }
        Ok(())
    }

    async fn answer(&self, id: String, method: String, args: Args) {
        debug!(peer = %self.label, method = %method, id = %id, "dispatching request");
        let outcome = self
            .handlers
            .dispatch(&method, args, &self.context)
            .await
            .map_err(|err| err.to_error_body());

        if self.is_closed() {
            debug!(peer = %self.label, method = %method, id = %id, "dropping response for closed channel");
            return;
        }
        let frame = CallFrame::Response { id, outcome };
        if let Err(err) = self.transport.send(Arc::new(frame.encode())) {
            warn!(peer = %self.label, method = %method, error = %err, "response not delivered");
        }
    }

    /// Close the channel: every pending call fails with
    /// [`RpcError::ConnectionClosed`] and later sends are refused.
    pub fn close(&self) {
        let waiters: Vec<Waiter> = {
            let mut pending = self.pending.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            pending.drain().map(|(_, tx)| tx).collect()
        };
        for tx in waiters {
            let _ = tx.send(Err(RpcError::ConnectionClosed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MethodHandler;
    use crate::transport::TransportError;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    /// Transport backed by an unbounded queue.
    struct QueueTransport {
        tx: mpsc::UnboundedSender<Arc<String>>,
    }

    impl Transport for QueueTransport {
        fn send(&self, frame: Arc<String>) -> Result<(), TransportError> {
            self.tx.send(frame).map_err(|_| TransportError::Closed)
        }
    }

    struct ClosedTransport;

    impl Transport for ClosedTransport {
        fn send(&self, _frame: Arc<String>) -> Result<(), TransportError> {
            Err(TransportError::Closed)
        }
    }

    struct Upper;

    #[async_trait]
    impl MethodHandler<()> for Upper {
        async fn handle(&self, args: Args, _ctx: &()) -> Result<Graph, RpcError> {
            let s = args.require_str(0, "text")?;
            Ok(Graph::from_json(&json!(s.to_uppercase())))
        }
    }

    type Channel = Arc<RpcChannel<()>>;

    fn channel_with(
        registry: MethodRegistry<()>,
        timeout: Duration,
    ) -> (Channel, mpsc::UnboundedReceiver<Arc<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = RpcChannel::new(
            "test",
            Arc::new(QueueTransport { tx }),
            Arc::new(registry),
            Arc::new(()),
        )
        .with_timeout(timeout);
        (Arc::new(channel), rx)
    }

    /// Two channels wired back to back.
    fn pair(
        server: MethodRegistry<()>,
        timeout: Duration,
    ) -> (Channel, Channel) {
        let (client, mut client_out) = channel_with(MethodRegistry::new(), timeout);
        let (server, mut server_out) = channel_with(server, timeout);

        let to_server = Arc::clone(&server);
        let _ = tokio::spawn(async move {
            while let Some(frame) = client_out.recv().await {
                let _ = to_server.receive(&frame);
            }
        });
        let to_client = Arc::clone(&client);
        let _ = tokio::spawn(async move {
            while let Some(frame) = server_out.recv().await {
                let _ = to_client.receive(&frame);
            }
        });
        (client, server)
    }

    #[tokio::test]
    async fn call_gets_response() {
        let mut reg = MethodRegistry::new();
        reg.register("upper", Upper);
        let (client, _server) = pair(reg, DEFAULT_CALL_TIMEOUT);

        let out = client
            .call("upper", Args::from_json([json!("abc")]))
            .await
            .unwrap();
        assert_eq!(out.to_json(out.root()).unwrap(), json!("ABC"));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn handler_error_comes_back_as_remote() {
        let mut reg = MethodRegistry::new();
        reg.register("upper", Upper);
        let (client, _server) = pair(reg, DEFAULT_CALL_TIMEOUT);

        let err = client.call("upper", Args::empty()).await.unwrap_err();
        assert_matches!(&err, RpcError::Remote(body) if body.code == crate::errors::INVALID_PARAMS);

        let err = client.call("missing", Args::empty()).await.unwrap_err();
        assert_eq!(err.code(), crate::errors::METHOD_NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_only_fails_that_call() {
        // Peer that never answers the first call but answers the second.
        let (client, mut out) = channel_with(MethodRegistry::new(), Duration::from_millis(100));

        let slow = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.call("slow", Args::empty()).await })
        };
        let fast = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.call("fast", Args::empty()).await })
        };

        let mut ids = HashMap::new();
        for _ in 0..2 {
            let frame = out.recv().await.unwrap();
            if let CallFrame::Request { id, method, .. } = CallFrame::decode(&frame).unwrap() {
                let _ = ids.insert(method, id);
            }
        }
        let reply = CallFrame::Response {
            id: ids["fast"].clone(),
            outcome: Ok(Graph::from_json(&json!("ok"))),
        };
        client.receive(&reply.encode()).unwrap();

        let fast = fast.await.unwrap().unwrap();
        assert_eq!(fast.to_json(fast.root()).unwrap(), json!("ok"));

        let slow = slow.await.unwrap().unwrap_err();
        assert_matches!(&slow, RpcError::Timeout { method } if method == "slow");
        assert_eq!(slow.to_string(), "[vista-api]: Timeout calling \"slow\"");
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn close_fails_pending_calls() {
        let (client, mut out) = channel_with(MethodRegistry::new(), DEFAULT_CALL_TIMEOUT);

        let pending = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.call("never", Args::empty()).await })
        };
        let _ = out.recv().await.unwrap();
        client.close();

        assert_matches!(pending.await.unwrap(), Err(RpcError::ConnectionClosed));
        assert_matches!(
            client.push(ClientEvent::Finished, Args::empty()),
            Err(RpcError::TransportClosed)
        );
        assert_matches!(
            client.call("again", Args::empty()).await,
            Err(RpcError::TransportClosed)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn call_racing_close_never_waits_for_timeout() {
        for _ in 0..200 {
            let (client, _out) = channel_with(MethodRegistry::new(), DEFAULT_CALL_TIMEOUT);
            let caller = {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.call("never", Args::empty()).await })
            };
            let closer = {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.close() })
            };
            closer.await.unwrap();

            let outcome = tokio::time::timeout(Duration::from_secs(5), caller)
                .await
                .expect("call outlived close")
                .unwrap();
            assert_matches!(
                outcome,
                Err(RpcError::TransportClosed | RpcError::ConnectionClosed)
            );
            assert_eq!(client.pending_calls(), 0);
        }
    }

    #[tokio::test]
    async fn dead_transport_fails_fast() {
        let channel = RpcChannel::new(
            "dead",
            Arc::new(ClosedTransport),
            Arc::new(MethodRegistry::<()>::new()),
            Arc::new(()),
        );
        assert_matches!(
            channel.call("getFiles", Args::empty()).await,
            Err(RpcError::TransportClosed)
        );
        assert_eq!(channel.pending_calls(), 0);
    }

    #[tokio::test]
    async fn push_is_not_answered() {
        let mut reg = MethodRegistry::new();
        reg.register("upper", Upper);
        let (server, mut out) = channel_with(reg, DEFAULT_CALL_TIMEOUT);

        let push = CallFrame::Push {
            method: "upper".into(),
            args: Args::from_json([json!("x")]),
        };
        server.receive(&push.encode()).unwrap();
        tokio::task::yield_now().await;
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_frame_is_protocol_error() {
        let (server, _out) = channel_with(MethodRegistry::new(), DEFAULT_CALL_TIMEOUT);
        assert_matches!(server.receive("{nope"), Err(RpcError::Protocol { .. }));
    }

    #[tokio::test]
    async fn unknown_response_is_ignored() {
        let (client, _out) = channel_with(MethodRegistry::new(), DEFAULT_CALL_TIMEOUT);
        let stray = CallFrame::Response {
            id: "999".into(),
            outcome: Ok(Graph::new()),
        };
        assert!(client.receive(&stray.encode()).is_ok());
    }
}
