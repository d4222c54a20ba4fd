use std::path::PathBuf;
use tensorbench::core::{ConfigError, EncodeError};
use tensorbench::BenchmarkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("No input file given. Pass one with --input.")]
    NoInput,

    #[error("Failed to read input {path}: {source}")]
    ReadInput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Input {path} is not valid JSON: {source}")]
    ParseInput {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid input payload: {0}")]
    Encode(#[from] EncodeError),

    #[error("Invalid benchmark configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Benchmark(#[from] BenchmarkError),

    #[error("Failed to install metrics exporter: {0}")]
    Metrics(String),

    #[error("Failed to serialize report: {0}")]
    Report(serde_json::Error),
}
