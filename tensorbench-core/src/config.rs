use crate::{
    ConfigError, DEFAULT_CLIENTS, DEFAULT_CONCURRENCY, DEFAULT_RUNS, MAX_CALL_TIMEOUT,
    MAX_CONCURRENCY,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::time::Duration;

/// Settings for a single benchmark run.
///
/// Built through `BenchmarkRequest` in the `tensorbench` crate; validated once right before the
/// run starts.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub target: String,
    pub runs: usize,
    pub clients: usize,
    pub concurrency: usize,
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    pub max_timeout: Option<Duration>,
}

impl BenchmarkConfig {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            runs: DEFAULT_RUNS,
            clients: DEFAULT_CLIENTS,
            concurrency: DEFAULT_CONCURRENCY,
            max_timeout: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::MissingTarget);
        }

        if self.runs == 0 {
            return Err(ConfigError::ZeroRuns);
        }

        if self.clients == 0 {
            return Err(ConfigError::ZeroClients);
        }

        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        if self.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::ConcurrencyTooLarge(self.concurrency));
        }

        match self.max_timeout {
            Some(timeout) if timeout.is_zero() || timeout > MAX_CALL_TIMEOUT => {
                Err(ConfigError::InvalidTimeout(timeout))
            }
            _ => Ok(()),
        }
    }

    /// Number of calls assigned to each client, indexed by client.
    ///
    /// The first `runs % clients` clients receive one extra call so the shares sum to `runs` and
    /// never differ by more than one.
    pub fn partition(&self) -> Vec<usize> {
        partition(self.runs, self.clients)
    }
}

pub fn partition(runs: usize, clients: usize) -> Vec<usize> {
    if clients == 0 {
        return vec![];
    }

    let base = runs / clients;
    let extra = runs % clients;

    (0..clients)
        .map(|idx| if idx < extra { base + 1 } else { base })
        .collect()
}
