#![cfg_attr(docsrs, feature(doc_cfg))]
//! # tensorbench
//!
//! A load generator for tensor prediction services. A run issues a fixed number of predict calls
//! against a single target, spread across independent clients that each hold their own
//! connection and cap their in-flight calls.
//!
//! The transport is pluggable through the [`Gateway`] trait; `tensorbench-runtime` ships an HTTP
//! implementation for the TensorFlow Serving REST API.
//!
//! ```no_run
//! use serde_json::json;
//! use tensorbench::prelude::*;
//!
//! # async fn example(gateway: impl Gateway) -> Result<(), Box<dyn std::error::Error>> {
//! let payload = PredictRequest::from_json(ModelSpec::new("mnist"), &json!({ "x": [[0.5, 1.5]] }))?;
//! let mut summary = BenchmarkRequest::new("localhost:8501", payload)
//!     .runs(1_000)
//!     .clients(2)
//!     .concurrency(8)
//!     .run(gateway)?;
//!
//! while let Some(RunEvent::Progress(pct)) = summary.recv().await {
//!     println!("{pct}%");
//! }
//! # Ok(())
//! # }
//! ```

pub mod benchmark;
pub(crate) mod client;
pub mod error;
pub mod gateway;
pub mod summary;

pub use tensorbench_core as core;

pub use benchmark::BenchmarkRequest;
pub use error::BenchmarkError;
pub use gateway::{CallError, ConnectionError, Gateway};
pub use summary::{BenchmarkSummary, RunEvent, RunOutcome};

pub mod prelude {
    pub use crate::benchmark::BenchmarkRequest;
    pub use crate::gateway::{CallError, ConnectionError, Gateway};
    pub use crate::summary::{BenchmarkSummary, RunEvent, RunOutcome};

    pub use tensorbench_core::{BenchmarkConfig, BenchmarkReport, ModelSpec, PredictRequest};
}
