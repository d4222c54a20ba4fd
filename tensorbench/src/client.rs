use crate::gateway::{CallError, Gateway};
use std::sync::Arc;
use std::time::Duration;
use tensorbench_core::{CallResult, ConnectionFailure, PredictRequest};
use time::OffsetDateTime;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// What a client hands to the collector.
#[derive(Debug)]
pub(crate) enum ClientMessage {
    Result(CallResult),
    ConnectionFailed(ConnectionFailure),
}

/// Everything a client needs for its batch.
pub(crate) struct ClientTask<G: Gateway> {
    pub client_index: usize,
    pub assigned_runs: usize,
    pub concurrency: usize,
    pub target: String,
    pub deadline: Option<Duration>,
    pub gateway: Arc<G>,
    pub request: Arc<PredictRequest>,
}

impl<G: Gateway> ClientTask<G> {
    /// Dial once and issue `assigned_runs` calls, at most `concurrency` of them in flight.
    ///
    /// Returns once every call has finished.
    #[instrument(name = "client", skip_all, fields(client = self.client_index, runs = self.assigned_runs))]
    pub async fn run(self, results: mpsc::Sender<ClientMessage>) {
        if self.assigned_runs == 0 {
            debug!("No runs assigned.");
            return;
        }

        let connection = match self.gateway.dial(&self.target).await {
            Ok(connection) => Arc::new(connection),
            Err(err) => {
                error!("Client {} is giving up on its batch: {err}", self.client_index);
                let failure = ConnectionFailure {
                    client_index: self.client_index,
                    assigned_runs: self.assigned_runs,
                    error: err.to_string(),
                };
                if results
                    .send(ClientMessage::ConnectionFailed(failure))
                    .await
                    .is_err()
                {
                    error!("Result channel closed.");
                }
                return;
            }
        };
        debug!("Connected to {}.", self.target);

        let permits = Arc::new(Semaphore::new(self.concurrency));

        for request_index in 0..self.assigned_runs {
            // NOTE: Blocks this client's spawn loop only.
            let Ok(permit) = permits.clone().acquire_owned().await else {
                error!("Admission semaphore closed.");
                break;
            };

            let gateway = self.gateway.clone();
            let connection = connection.clone();
            let request = self.request.clone();
            let results = results.clone();
            let deadline = self.deadline;
            let client_index = self.client_index;

            tokio::spawn(
                async move {
                    let result = issue_call(
                        gateway.as_ref(),
                        connection.as_ref(),
                        request.as_ref(),
                        deadline,
                        client_index,
                        request_index,
                    )
                    .await;
                    drop(permit);

                    if results.send(ClientMessage::Result(result)).await.is_err() {
                        error!("Result channel closed.");
                    }
                }
                .in_current_span(),
            );
        }

        // Every call has finished once all permits are back.
        let all = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        if permits.acquire_many(all).await.is_err() {
            error!("Admission semaphore closed.");
            return;
        }

        debug!("Batch complete.");
    }
}

async fn issue_call<G: Gateway>(
    gateway: &G,
    connection: &G::Connection,
    request: &PredictRequest,
    deadline: Option<Duration>,
    client_index: usize,
    request_index: usize,
) -> CallResult {
    let started_at = OffsetDateTime::now_utc();
    let start = Instant::now();

    let outcome = match deadline {
        Some(deadline) => {
            match tokio::time::timeout(deadline, gateway.call(connection, request, Some(deadline)))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(CallError::Timeout(deadline)),
            }
        }
        None => gateway.call(connection, request, None).await,
    };

    let elapsed = start.elapsed();
    let ended_at = OffsetDateTime::now_utc();

    #[cfg(feature = "metrics")]
    {
        metrics::histogram!("tensorbench_call_latency").record(elapsed.as_secs_f64());
        if outcome.is_ok() {
            metrics::counter!("tensorbench_call_success").increment(1);
        } else {
            metrics::counter!("tensorbench_call_error").increment(1);
        }
    }

    let error = match outcome {
        Ok(()) => {
            trace!(request_index, "Call succeeded in {elapsed:?}");
            None
        }
        Err(err) => {
            warn!(request_index, "Call failed: {err}");
            Some(err.to_string())
        }
    };

    CallResult {
        started_at,
        ended_at,
        elapsed,
        error,
        client_index,
        request_index,
    }
}
