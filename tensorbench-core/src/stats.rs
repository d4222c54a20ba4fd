use crate::{CallResult, ConnectionFailure};
use pdatastructs::tdigest::{TDigest, K1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Final statistics of a benchmark run.
///
/// Latency figures only cover successful calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ended_at: OffsetDateTime,
    pub elapsed: Duration,
    pub runs: usize,
    pub errors: usize,
    pub failed_clients: usize,
    /// Calls never issued because their client failed to connect.
    pub missing_runs: usize,
    pub rps: f64,
    pub latency_mean: Duration,
    pub latency_p50: Duration,
    pub latency_p90: Duration,
    pub latency_p99: Duration,
    pub latency_max: Duration,
}

impl BenchmarkReport {
    pub fn new(
        started_at: OffsetDateTime,
        ended_at: OffsetDateTime,
        elapsed: Duration,
        results: &[CallResult],
        connection_failures: &[ConnectionFailure],
    ) -> Self {
        let mut latency = default_tdigest();
        let mut total = Duration::ZERO;
        let mut max = Duration::ZERO;
        let mut successes = 0u32;

        for result in results.iter().filter(|r| r.success()) {
            latency.insert(result.elapsed.as_secs_f64());
            total += result.elapsed;
            max = max.max(result.elapsed);
            successes += 1;
        }

        let latency_mean = total.checked_div(successes).unwrap_or_default();
        let rps = if elapsed.is_zero() {
            0.
        } else {
            results.len() as f64 / elapsed.as_secs_f64()
        };

        Self {
            started_at,
            ended_at,
            elapsed,
            runs: results.len(),
            errors: results.iter().filter(|r| !r.success()).count(),
            failed_clients: connection_failures.len(),
            missing_runs: connection_failures.iter().map(|f| f.assigned_runs).sum(),
            rps,
            latency_mean,
            latency_p50: quantile(&latency, successes, 0.5),
            latency_p90: quantile(&latency, successes, 0.9),
            latency_p99: quantile(&latency, successes, 0.99),
            latency_max: max,
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.runs == 0 {
            0.
        } else {
            self.errors as f64 / self.runs as f64
        }
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let started = self
            .started_at
            .format(&Rfc3339)
            .map_err(|_| fmt::Error)?;

        writeln!(f, "Started: {started}")?;
        writeln!(
            f,
            "Runs: {} (errors: {}, error rate: {:.2}%)",
            self.runs,
            self.errors,
            self.error_rate() * 100.
        )?;
        if self.failed_clients > 0 {
            writeln!(
                f,
                "Failed clients: {} ({} runs not issued)",
                self.failed_clients, self.missing_runs
            )?;
        }
        writeln!(f, "Duration: {}", human(self.elapsed))?;
        writeln!(f, "RPS: {:.2}", self.rps)?;
        write!(
            f,
            "Latency: mean={}, p50={}, p90={}, p99={}, max={}",
            human(self.latency_mean),
            human(self.latency_p50),
            human(self.latency_p90),
            human(self.latency_p99),
            human(self.latency_max),
        )
    }
}

fn human(dur: Duration) -> humantime::FormattedDuration {
    // Sub-microsecond digits are noise for network calls.
    let micros = u64::try_from(dur.as_micros()).unwrap_or(u64::MAX);
    humantime::format_duration(Duration::from_micros(micros))
}

fn quantile(digest: &TDigest<K1>, count: u32, q: f64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }

    let secs = digest.quantile(q);

    // TDigest can produce NaN on degenerate inputs.
    let secs = if secs.is_finite() && secs >= 0. {
        secs
    } else {
        error!("Non-finite latency quantile {q}, reporting zero.");
        0.
    };

    Duration::from_secs_f64(secs)
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}
