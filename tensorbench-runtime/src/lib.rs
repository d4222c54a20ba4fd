//! Command line runtime for tensorbench, plus an HTTP [`Gateway`](tensorbench::Gateway) for the
//! TensorFlow Serving REST API.
pub mod display;
pub mod http;
pub mod runtime;

mod error;

pub use crate::error::RuntimeError;
pub use crate::http::HttpGateway;
pub use crate::runtime::BenchRuntime;
