use std::time::Duration;
use thiserror::Error;

/// Failure turning a JSON value tree into a tensor payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("Invalid payload shape: {0}")]
    InvalidPayloadShape(String),

    #[error("Unsupported element type: {0}")]
    UnsupportedElementType(String),
}

impl EncodeError {
    /// Prefix the message with the name of the input being encoded.
    pub(crate) fn in_input(self, name: &str) -> Self {
        match self {
            Self::InvalidPayloadShape(msg) => {
                Self::InvalidPayloadShape(format!("input `{name}`: {msg}"))
            }
            Self::UnsupportedElementType(msg) => {
                Self::UnsupportedElementType(format!("input `{name}`: {msg}"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("A target address is required")]
    MissingTarget,

    #[error("Number of runs must be greater than 0")]
    ZeroRuns,

    #[error("Number of clients must be greater than 0")]
    ZeroClients,

    #[error("Concurrency must be greater than 0")]
    ZeroConcurrency,

    #[error("Concurrency of {0} exceeds the supported maximum")]
    ConcurrencyTooLarge(usize),

    #[error("Invalid call timeout: {0:?}")]
    InvalidTimeout(Duration),
}
