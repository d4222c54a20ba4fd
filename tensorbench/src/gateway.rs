//! The remote call capability the benchmark drives.
//!
//! A [`Gateway`] knows how to open a connection to a target address and how to issue a single
//! predict call over it. The engine never looks at responses: a call either succeeds or fails
//! with a [`CallError`] whose text ends up in the per-call record.
use std::future::Future;
use std::time::Duration;
use tensorbench_core::PredictRequest;
use thiserror::Error;

/// Opening a connection failed. Fatal for the client that dialed.
#[derive(Debug, Clone, Error)]
#[error("Failed to connect to {address}: {reason}")]
pub struct ConnectionError {
    pub address: String,
    pub reason: String,
}

impl ConnectionError {
    pub fn new(address: &str, reason: impl ToString) -> Self {
        Self {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A single call failed. Recorded in the call's result; the run continues.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Call exceeded its deadline of {0:?}")]
    Timeout(Duration),
}

/// Connects to a prediction service and issues calls.
///
/// One gateway is shared by every client of a run; each client dials its own connection and
/// uses it exclusively for its whole batch.
pub trait Gateway: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    fn dial(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Self::Connection, ConnectionError>> + Send;

    /// Issue one blocking request/response call.
    ///
    /// `deadline` is the configured per-call timeout. Implementations should apply it to the
    /// underlying transport; the client worker enforces it regardless.
    fn call(
        &self,
        connection: &Self::Connection,
        request: &PredictRequest,
        deadline: Option<Duration>,
    ) -> impl Future<Output = Result<(), CallError>> + Send;
}
