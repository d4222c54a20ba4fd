//! Live and final view of a benchmark run.
use crate::error::BenchmarkError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tensorbench_core::{BenchmarkConfig, BenchmarkReport, CallResult, ConnectionFailure};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Notification observed by the consumer of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunEvent {
    /// Percentage of configured runs completed, in `(0, 100]`. Strictly increasing within a run.
    Progress(f32),
    /// The run is complete. Delivered exactly once, after the final `Progress(100.)`.
    Done,
}

#[derive(Debug)]
pub(crate) enum Event {
    Progress(f32),
    Done(Box<RunOutcome>),
}

/// Counters published by the collector while the run is in progress.
#[derive(Debug, Default)]
pub(crate) struct LiveCounters {
    completed: AtomicUsize,
    errors: AtomicUsize,
}

impl LiveCounters {
    pub fn record(&self, completed: usize, errors: usize) {
        self.completed.store(completed, Ordering::Relaxed);
        self.errors.store(errors, Ordering::Relaxed);
    }
}

/// The completed state of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub started_at: OffsetDateTime,
    pub ended_at: OffsetDateTime,
    pub elapsed: Duration,
    /// Results in arrival order.
    pub results: Vec<CallResult>,
    pub errors: usize,
    pub connection_failures: Vec<ConnectionFailure>,
}

impl RunOutcome {
    pub fn runs(&self) -> usize {
        self.results.len()
    }

    pub fn failed(&self) -> impl Iterator<Item = &CallResult> {
        self.results.iter().filter(|r| !r.success())
    }

    pub fn report(&self) -> BenchmarkReport {
        BenchmarkReport::new(
            self.started_at,
            self.ended_at,
            self.elapsed,
            &self.results,
            &self.connection_failures,
        )
    }
}

/// Handle to a running benchmark, returned by [`crate::BenchmarkRequest::run`].
///
/// Progress and completion are observed through [`BenchmarkSummary::recv`] (or
/// [`BenchmarkSummary::wait`]). The counters can be read at any time.
///
/// # Example
/// ```no_run
/// # use tensorbench::prelude::*;
/// # async fn example(summary: &mut BenchmarkSummary) {
/// while let Some(event) = summary.recv().await {
///     match event {
///         RunEvent::Progress(pct) => println!("{pct}% ({:.2} RPS)", summary.calculate_rps()),
///         RunEvent::Done => break,
///     }
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct BenchmarkSummary {
    config: BenchmarkConfig,
    started_at: OffsetDateTime,
    start: Instant,
    live: Arc<LiveCounters>,
    events: mpsc::UnboundedReceiver<Event>,
    outcome: Option<RunOutcome>,
}

impl BenchmarkSummary {
    pub(crate) fn new(
        config: BenchmarkConfig,
        started_at: OffsetDateTime,
        start: Instant,
        live: Arc<LiveCounters>,
        events: mpsc::UnboundedReceiver<Event>,
    ) -> Self {
        Self {
            config,
            started_at,
            start,
            live,
            events,
            outcome: None,
        }
    }

    /// Next progress or completion event. `None` once the run is over and every event was seen.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        match self.events.recv().await? {
            Event::Progress(pct) => Some(RunEvent::Progress(pct)),
            Event::Done(outcome) => {
                self.outcome = Some(*outcome);
                Some(RunEvent::Done)
            }
        }
    }

    /// Drain events until the run completes.
    pub async fn wait(&mut self) -> Result<&RunOutcome, BenchmarkError> {
        while let Some(event) = self.recv().await {
            if event == RunEvent::Done {
                break;
            }
        }

        self.outcome.as_ref().ok_or(BenchmarkError::CollectorStopped)
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    pub fn into_outcome(self) -> Option<RunOutcome> {
        self.outcome
    }

    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    /// Calls completed so far.
    pub fn runs(&self) -> usize {
        self.live.completed.load(Ordering::Relaxed)
    }

    /// Failed calls so far.
    pub fn errors(&self) -> usize {
        self.live.errors.load(Ordering::Relaxed)
    }

    /// Completed calls per second since the run started, measured now.
    pub fn calculate_rps(&self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64();
        if elapsed > 0. {
            self.runs() as f64 / elapsed
        } else {
            0.
        }
    }
}
