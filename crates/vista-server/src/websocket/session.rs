//! Observer session lifecycle: one accepted socket from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use vista_rpc::RpcChannel;

use super::connection::{Connection, ConnectionId, WsTransport};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_PROTOCOL_ERRORS_TOTAL,
};
use crate::server::ApiState;

/// How long cleanup waits for the writer to flush its close frame.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Run a session for an accepted socket.
///
/// 1. Registers a connection with its own RPC channel
/// 2. Feeds every inbound text (or UTF-8 binary) message to the channel
/// 3. Forwards outbound frames from the send queue, pinging periodically
/// 4. Closes on client close, transport error, malformed frame, silence
///    longer than the client timeout, or server shutdown
/// 5. Fails pending calls and leaves the registry before returning
#[instrument(skip_all, fields(conn_id = %id))]
pub async fn run_session(socket: WebSocket, id: ConnectionId, state: ApiState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(state.config.max_send_queue);
    let channel = RpcChannel::new(
        id.as_str(),
        Arc::new(WsTransport::new(send_tx)),
        Arc::clone(&state.handlers),
        Arc::clone(&state.context),
    )
    .with_timeout(state.config.rpc_timeout());
    let connection = Arc::new(Connection::new(id.clone(), Arc::new(channel)));

    let started = Instant::now();
    info!("observer connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    state.registry.add(Arc::clone(&connection)).await;

    let done = state.shutdown.token().child_token();

    // Outbound forwarder with periodic pings.
    let writer_conn = Arc::clone(&connection);
    let writer_done = done.clone();
    let heartbeat = state.config.heartbeat_interval();
    let client_timeout = state.config.client_timeout();
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            // Queued frames go out before the close frame.
            tokio::select! {
                biased;
                Some(frame) = send_rx.recv() => {
                    if ws_tx.send(Message::Text(String::clone(&frame).into())).await.is_err() {
                        break;
                    }
                }
                () = writer_done.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                _ = ping_interval.tick() => {
                    if writer_conn.last_seen_elapsed() > client_timeout {
                        warn!(timeout = ?client_timeout, "observer unresponsive, disconnecting");
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        writer_done.cancel();
    });

    loop {
        let next = tokio::select! {
            () = done.cancelled() => break,
            next = ws_rx.next() => next,
        };
        let Some(Ok(msg)) = next else { break };
        connection.mark_alive();

        let text = match msg {
            Message::Text(text) => text.to_string(),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "non-UTF8 binary frame, closing connection");
                    counter!(WS_PROTOCOL_ERRORS_TOTAL).increment(1);
                    break;
                }
            },
            Message::Close(_) => {
                info!("observer sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if let Err(err) = connection.channel().receive(&text) {
            warn!(error = %err, "malformed frame, closing connection");
            counter!(WS_PROTOCOL_ERRORS_TOTAL).increment(1);
            break;
        }
    }

    // Clean up: fail pending calls and leave the registry before any
    // further broadcast can pick this connection.
    let _ = connection.close();
    let _ = state.registry.remove(&id).await;
    done.cancel();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        debug!("writer did not finish in time");
    }

    info!(dropped = connection.drop_count(), "observer disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}
