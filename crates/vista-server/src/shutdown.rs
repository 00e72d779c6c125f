//! Shutdown: stop accepting observers, close every session, wait for them.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// How long sessions get to flush and close before shutdown gives up.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the shutdown signal and the set of live observer sessions.
///
/// Sessions watch [`token`](Self::token) and close their socket when it
/// fires. [`graceful_shutdown`](Self::graceful_shutdown) then waits for the
/// listener and every tracked session to finish.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Count `session` as live until it completes.
    pub fn track_session<F: Future>(&self, session: F) -> TrackedFuture<F> {
        self.sessions.track_future(session)
    }

    /// Sessions that have not finished yet.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Signal shutdown, then wait up to `timeout` for the listener task and
    /// every tracked session.
    ///
    /// Returns `false` when the wait timed out with sessions still open.
    pub async fn graceful_shutdown(
        &self,
        listener: JoinHandle<()>,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);

        self.shutdown();
        let _ = self.sessions.close();
        info!(
            sessions = self.active_sessions(),
            timeout_secs = timeout.as_secs(),
            "draining observer sessions"
        );

        let drain = async {
            let _ = listener.await;
            self.sessions.wait().await;
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                sessions = self.active_sessions(),
                "drain timed out after {timeout:?}"
            );
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
