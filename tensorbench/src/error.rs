use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("The result collector stopped before signalling completion")]
    CollectorStopped,
}
