use std::time::Duration;

/// Number of calls issued when none is configured.
pub const DEFAULT_RUNS: usize = 1000;

/// Number of independent clients used when none is configured.
pub const DEFAULT_CLIENTS: usize = 1;

/// Per-client in-flight ceiling used when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Model name targeted when none is configured.
pub const DEFAULT_MODEL_NAME: &str = "default";

/// Largest per-client in-flight ceiling accepted from configuration.
pub const MAX_CONCURRENCY: usize = u32::MAX as usize;

/// Upper bound of the progress tick interval, in completed calls.
pub const MAX_PROGRESS_TICK: usize = 100;

/// Capacity of the channel carrying call results from the clients to the collector.
pub const RESULT_CHANNEL_CAPACITY: usize = 1;

/// Upper bound on a single call timeout accepted from configuration.
pub const MAX_CALL_TIMEOUT: Duration = Duration::from_secs(3600);
