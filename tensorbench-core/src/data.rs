use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

/// Outcome of a single call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ended_at: OffsetDateTime,
    /// Measured on a monotonic clock.
    pub elapsed: Duration,
    /// `None` on success.
    pub error: Option<String>,
    pub client_index: usize,
    /// Position of the call within its client's batch, in spawn order. Bookkeeping only: results
    /// arrive in completion order.
    pub request_index: usize,
}

impl CallResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }
}

/// A client that could not connect and therefore issued none of its calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionFailure {
    pub client_index: usize,
    pub assigned_runs: usize,
    pub error: String,
}
