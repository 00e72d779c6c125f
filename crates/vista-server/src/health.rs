//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open observer connections.
    pub connections: usize,
    /// Files the engine currently tracks.
    pub files: usize,
    /// RFC 3339 time of the check.
    pub timestamp: String,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, files: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        files,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}
