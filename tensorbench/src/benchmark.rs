//! Benchmark orchestration
//!
//! A run splits its calls across independent clients, launches them concurrently and funnels
//! every result through a single collector task. The collector is the only writer of the run's
//! state: it appends results in arrival order, keeps the counters, emits progress and signals
//! completion.
use crate::client::{ClientMessage, ClientTask};
use crate::gateway::Gateway;
use crate::summary::{BenchmarkSummary, Event, LiveCounters, RunOutcome};
use std::sync::Arc;
use std::time::Duration;
use tensorbench_core::{
    BenchmarkConfig, CallResult, ConfigError, ConnectionFailure, PredictRequest,
    MAX_PROGRESS_TICK, RESULT_CHANNEL_CAPACITY,
};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

/// A configured benchmark: where to send calls, how many, and what to send.
///
/// # Example
/// ```no_run
/// use serde_json::json;
/// use tensorbench::prelude::*;
///
/// # async fn example(gateway: impl Gateway) -> Result<(), Box<dyn std::error::Error>> {
/// let payload = PredictRequest::from_json(
///     ModelSpec::new("half_plus_two"),
///     &json!({ "x": [[1.0, 2.0], [3.0, 4.0]] }),
/// )?;
///
/// let mut summary = BenchmarkRequest::new("http://localhost:8501", payload)
///     .runs(10_000)
///     .clients(4)
///     .concurrency(16)
///     .run(gateway)?;
///
/// let outcome = summary.wait().await?;
/// println!("{}", outcome.report());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BenchmarkRequest {
    config: BenchmarkConfig,
    request: Arc<PredictRequest>,
}

impl BenchmarkRequest {
    pub fn new(target: &str, request: PredictRequest) -> Self {
        Self::from_config(BenchmarkConfig::new(target), request)
    }

    pub fn from_config(config: BenchmarkConfig, request: PredictRequest) -> Self {
        Self {
            config,
            request: Arc::new(request),
        }
    }

    /// Total number of calls across all clients.
    pub fn runs(mut self, runs: usize) -> Self {
        self.config.runs = runs;
        self
    }

    /// Number of independent clients, each with its own connection.
    pub fn clients(mut self, clients: usize) -> Self {
        self.config.clients = clients;
        self
    }

    /// Maximum in-flight calls per client.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Per-call deadline. Calls exceeding it are recorded as failures.
    pub fn max_timeout(mut self, max_timeout: Duration) -> Self {
        self.config.max_timeout = Some(max_timeout);
        self
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    pub fn payload(&self) -> &PredictRequest {
        &self.request
    }

    /// Start the run and return immediately.
    ///
    /// Must be called from within a tokio runtime. The returned summary streams progress and
    /// signals completion; see [`BenchmarkSummary`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] without starting anything if the configuration is invalid.
    pub fn run<G: Gateway>(&self, gateway: G) -> Result<BenchmarkSummary, ConfigError> {
        self.config.validate()?;

        info!(
            "Running benchmark against {} with {} runs, {} clients, concurrency {}",
            self.config.target, self.config.runs, self.config.clients, self.config.concurrency
        );

        #[cfg(feature = "metrics")]
        {
            metrics::describe_histogram!(
                "tensorbench_call_latency",
                metrics::Unit::Seconds,
                "Latency of each predict call."
            );
            metrics::describe_counter!("tensorbench_call_success", "Successful predict calls.");
            metrics::describe_counter!("tensorbench_call_error", "Failed predict calls.");
        }

        let started_at = OffsetDateTime::now_utc();
        let start = Instant::now();
        let gateway = Arc::new(gateway);
        let live = Arc::new(LiveCounters::default());
        let (results_tx, results_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let span = tracing::info_span!("benchmark", target = %self.config.target);

        for (client_index, assigned_runs) in self.config.partition().into_iter().enumerate() {
            let client = ClientTask {
                client_index,
                assigned_runs,
                concurrency: self.config.concurrency,
                target: self.config.target.clone(),
                deadline: self.config.max_timeout,
                gateway: gateway.clone(),
                request: self.request.clone(),
            };
            tokio::spawn(client.run(results_tx.clone()).instrument(span.clone()));
        }
        // The collector sees the channel close once every client is gone.
        drop(results_tx);

        let collector = Collector::new(
            self.config.runs,
            started_at,
            start,
            live.clone(),
            events_tx,
        );
        tokio::spawn(collector.collect(results_rx).instrument(span));

        Ok(BenchmarkSummary::new(
            self.config.clone(),
            started_at,
            start,
            live,
            events_rx,
        ))
    }
}

/// Interval, in completed calls, between progress checks.
pub fn progress_ticks(runs: usize) -> usize {
    (runs / 100).clamp(1, MAX_PROGRESS_TICK)
}

struct Collector {
    runs: usize,
    // Shrinks when a client reports it could not connect.
    expected: usize,
    ticks: usize,
    last_progress: usize,
    started_at: OffsetDateTime,
    start: Instant,
    results: Vec<CallResult>,
    errors: usize,
    connection_failures: Vec<ConnectionFailure>,
    live: Arc<LiveCounters>,
    events: mpsc::UnboundedSender<Event>,
}

impl Collector {
    fn new(
        runs: usize,
        started_at: OffsetDateTime,
        start: Instant,
        live: Arc<LiveCounters>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            runs,
            expected: runs,
            ticks: progress_ticks(runs),
            last_progress: 0,
            started_at,
            start,
            results: Vec::with_capacity(runs),
            errors: 0,
            connection_failures: vec![],
            live,
            events,
        }
    }

    async fn collect(mut self, mut rx: mpsc::Receiver<ClientMessage>) {
        while self.results.len() < self.expected {
            match rx.recv().await {
                Some(ClientMessage::Result(result)) => self.record(result),
                Some(ClientMessage::ConnectionFailed(failure)) => {
                    self.expected = self.expected.saturating_sub(failure.assigned_runs);
                    self.connection_failures.push(failure);
                }
                None => {
                    error!(
                        "Clients stopped after {} of {} results.",
                        self.results.len(),
                        self.expected
                    );
                    break;
                }
            }
        }

        self.finish();
    }

    fn record(&mut self, result: CallResult) {
        if !result.success() {
            self.errors += 1;
        }
        self.results.push(result);

        let completed = self.results.len();
        self.live.record(completed, self.errors);

        if completed % self.ticks == 0 {
            self.progress(100 * completed / self.runs);
        }
    }

    fn progress(&mut self, pct: usize) {
        if pct > self.last_progress {
            self.last_progress = pct;
            self.emit(Event::Progress(pct as f32));
        }
    }

    fn finish(mut self) {
        if self.last_progress < 100 {
            self.progress(100);
        }

        let outcome = RunOutcome {
            started_at: self.started_at,
            ended_at: OffsetDateTime::now_utc(),
            elapsed: self.start.elapsed(),
            results: std::mem::take(&mut self.results),
            errors: self.errors,
            connection_failures: std::mem::take(&mut self.connection_failures),
        };

        info!(
            "Benchmark complete: {} runs, {} errors in {:?}",
            outcome.runs(),
            outcome.errors,
            outcome.elapsed
        );

        self.emit(Event::Done(Box::new(outcome)));
        // Dropping `self` closes the event stream.
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            trace!("Summary dropped, discarding event.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{CallError, ConnectionError};
    use crate::summary::RunEvent;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tensorbench_core::ModelSpec;

    fn payload() -> PredictRequest {
        PredictRequest::from_json(
            ModelSpec::new("test"),
            &json!({ "x": [[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]] }),
        )
        .unwrap()
    }

    /// Succeeds after `delay`, tracking the in-flight count on each connection.
    #[derive(Default)]
    struct MockGateway {
        delay: Duration,
        fail_calls: bool,
        refuse_dials: usize,
        dials: AtomicUsize,
        max_in_flight: Arc<AtomicUsize>,
    }

    struct MockConnection {
        in_flight: AtomicUsize,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl Gateway for MockGateway {
        type Connection = MockConnection;

        async fn dial(&self, address: &str) -> Result<MockConnection, ConnectionError> {
            if self.dials.fetch_add(1, Ordering::SeqCst) < self.refuse_dials {
                return Err(ConnectionError::new(address, "connection refused"));
            }

            Ok(MockConnection {
                in_flight: AtomicUsize::new(0),
                max_in_flight: self.max_in_flight.clone(),
            })
        }

        async fn call(
            &self,
            connection: &MockConnection,
            _request: &PredictRequest,
            _deadline: Option<Duration>,
        ) -> Result<(), CallError> {
            let now = connection.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            connection.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            } else {
                tokio::task::yield_now().await;
            }

            connection.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_calls {
                Err(CallError::Status {
                    status: 503,
                    message: "unavailable".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    async fn drain(summary: &mut BenchmarkSummary) -> Vec<f32> {
        let mut progress = vec![];
        while let Some(event) = summary.recv().await {
            match event {
                RunEvent::Progress(pct) => progress.push(pct),
                RunEvent::Done => break,
            }
        }
        progress
    }

    #[test]
    fn tick_interval() {
        assert_eq!(progress_ticks(1), 1);
        assert_eq!(progress_ticks(150), 1);
        assert_eq!(progress_ticks(1_000), 10);
        assert_eq!(progress_ticks(10_000), 100);
        assert_eq!(progress_ticks(1_000_000), 100);
    }

    #[tracing_test::traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10_000)]
    async fn completes_every_run() {
        let mut summary = BenchmarkRequest::new("mock", payload())
            .runs(1_001)
            .clients(4)
            .concurrency(8)
            .run(MockGateway::default())
            .unwrap();

        let progress = drain(&mut summary).await;

        assert_eq!(progress.last(), Some(&100.));
        assert!(progress.windows(2).all(|w| w[0] < w[1]), "{progress:?}");
        assert!(progress.iter().all(|p| *p > 0. && *p <= 100.));

        let outcome = summary.outcome().unwrap();
        assert_eq!(outcome.runs(), 1_001);
        assert_eq!(outcome.errors, 0);
        assert!(outcome.connection_failures.is_empty());
        assert_eq!(summary.runs(), 1_001);
        assert_eq!(summary.errors(), 0);

        let mut per_client = [0usize; 4];
        for result in &outcome.results {
            per_client[result.client_index] += 1;
        }
        assert_eq!(per_client, [251, 250, 250, 250]);

        // Request indices are unique per client.
        let mut seen = std::collections::HashSet::new();
        assert!(outcome
            .results
            .iter()
            .all(|r| seen.insert((r.client_index, r.request_index))));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn failing_gateway_still_completes() {
        let gateway = MockGateway {
            fail_calls: true,
            ..Default::default()
        };
        let mut summary = BenchmarkRequest::new("mock", payload())
            .runs(250)
            .clients(3)
            .concurrency(4)
            .run(gateway)
            .unwrap();

        let outcome = summary.wait().await.unwrap();

        assert_eq!(outcome.runs(), 250);
        assert_eq!(outcome.errors, 250);
        assert_eq!(outcome.failed().count(), 250);
        assert!(outcome
            .results
            .iter()
            .all(|r| r.error_message().contains("503")));
        assert_eq!(summary.errors(), 250);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10_000)]
    async fn concurrency_ceiling_holds() {
        let gateway = MockGateway {
            delay: Duration::from_millis(2),
            ..Default::default()
        };
        let max_in_flight = gateway.max_in_flight.clone();

        let mut summary = BenchmarkRequest::new("mock", payload())
            .runs(200)
            .clients(2)
            .concurrency(5)
            .run(gateway)
            .unwrap();
        let outcome = summary.wait().await.unwrap();

        assert_eq!(outcome.runs(), 200);
        let max = max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 5, "max in flight {max}");
        assert!(max > 1, "calls never overlapped");
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn connection_failure_drops_client_share() {
        let gateway = MockGateway {
            refuse_dials: 1,
            ..Default::default()
        };
        let mut summary = BenchmarkRequest::new("mock", payload())
            .runs(10)
            .clients(2)
            .concurrency(2)
            .run(gateway)
            .unwrap();

        let progress = drain(&mut summary).await;
        assert_eq!(progress.last(), Some(&100.));

        let outcome = summary.outcome().unwrap();
        assert_eq!(outcome.runs(), 5);
        assert_eq!(outcome.connection_failures.len(), 1);
        assert_eq!(outcome.connection_failures[0].assigned_runs, 5);
        assert!(outcome.connection_failures[0]
            .error
            .contains("connection refused"));

        let report = outcome.report();
        assert_eq!(report.failed_clients, 1);
        assert_eq!(report.missing_runs, 5);
        assert!(logs_contain("giving up on its batch"));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn every_client_refused() {
        let gateway = MockGateway {
            refuse_dials: usize::MAX,
            ..Default::default()
        };
        let mut summary = BenchmarkRequest::new("mock", payload())
            .runs(9)
            .clients(3)
            .run(gateway)
            .unwrap();

        let outcome = summary.wait().await.unwrap();
        assert_eq!(outcome.runs(), 0);
        assert_eq!(outcome.connection_failures.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(10_000)]
    async fn deadline_is_enforced() {
        let gateway = MockGateway {
            delay: Duration::from_secs(5),
            ..Default::default()
        };
        let mut summary = BenchmarkRequest::new("mock", payload())
            .runs(4)
            .concurrency(4)
            .max_timeout(Duration::from_millis(100))
            .run(gateway)
            .unwrap();

        let outcome = summary.wait().await.unwrap();
        assert_eq!(outcome.errors, 4);
        for result in &outcome.results {
            assert!(!result.success());
            assert!(result.error_message().contains("deadline"));
            assert!(result.elapsed < Duration::from_secs(1));
        }
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn more_clients_than_runs() {
        let mut summary = BenchmarkRequest::new("mock", payload())
            .runs(3)
            .clients(8)
            .run(MockGateway::default())
            .unwrap();

        let progress = drain(&mut summary).await;
        assert_eq!(progress, vec![33., 66., 100.]);
        assert_eq!(summary.outcome().unwrap().runs(), 3);
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let res = BenchmarkRequest::new("mock", payload())
            .runs(0)
            .run(MockGateway::default());
        assert!(matches!(res, Err(ConfigError::ZeroRuns)));

        let res = BenchmarkRequest::new("mock", payload())
            .clients(0)
            .run(MockGateway::default());
        assert!(matches!(res, Err(ConfigError::ZeroClients)));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn wait_after_done_returns_outcome() {
        let mut summary = BenchmarkRequest::new("mock", payload())
            .runs(5)
            .run(MockGateway::default())
            .unwrap();

        drain(&mut summary).await;
        assert!(summary.is_done());
        assert!(summary.recv().await.is_none());
        assert_eq!(summary.wait().await.unwrap().runs(), 5);
    }
}
