//! Core data types shared by the tensorbench engine and runtime.
//!
//! This crate has no async machinery of its own: it holds the run configuration, the tensor
//! payload encoder, the per-call result records and the final report.
mod config;
mod constants;
mod data;
mod error;
mod predict;
mod stats;
pub mod tensor;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use error::*;
pub use predict::*;
pub use stats::*;
pub use tensor::{DataType, TensorPayload, TensorValues};
