//! # Demand Math
//!
//! Numeric building blocks for retail demand series.
//! This crate provides the per-series window operators used by feature
//! engineering (shift, rolling statistics, exponential smoothing) and the
//! accuracy metrics used to score forecasts.

use thiserror::Error;

pub mod cyclical;
pub mod metrics;
pub mod windows;

pub use metrics::{accuracy, mae, mape, rmse, wmape, AccuracyReport};
pub use cyclical::cyclical_encode;
pub use windows::{ewma, expanding_mean, lead, rolling_max, rolling_mean, shift, RollingWindow};

/// Errors that can occur in demand-series calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for demand math operations
pub type Result<T> = std::result::Result<T, MathError>;
