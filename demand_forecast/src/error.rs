//! Error types for the demand_forecast crate

use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the demand_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// A required column is absent from the input dataset
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// A date value could not be parsed as a calendar date
    #[error("Invalid date '{value}' in row {row}")]
    InvalidDate { row: usize, value: String },

    /// Two rows share one (date, store, SKU) key
    #[error("Duplicate row {row} for {store_id}/{sku_id} on {date}")]
    DuplicateKey {
        row: usize,
        date: chrono::NaiveDate,
        store_id: String,
        sku_id: String,
    },

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Prediction requested before the first successful training run
    #[error("Pipeline not ready: no model generation has been trained yet")]
    NotReady,

    /// Prediction requested for a horizon without a trained model
    #[error("Model not available for horizon T+{0}")]
    ModelNotAvailable(u32),

    /// Model fitting failed (empty partition, numerical divergence)
    #[error("Training error: {0}")]
    TrainingError(String),

    /// A persisted model artifact is incomplete or inconsistent
    #[error("Artifact error: {0}")]
    ArtifactError(String),

    /// Error from the configuration layer
    #[error("Config error: {0}")]
    ConfigError(String),

    /// An interactive prediction exceeded its deadline
    #[error("Prediction timed out after {0} ms")]
    Timeout(u64),

    /// A background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    /// Error from series math
    #[error("Math error: {0}")]
    MathError(#[from] demand_math::MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from JSON (de)serialization
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        ForecastError::ConfigError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ForecastError {
    fn from(err: tokio::task::JoinError) -> Self {
        ForecastError::TaskFailed(err.to_string())
    }
}

impl ForecastError {
    /// True for caller errors that must not be retried with the same input
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ForecastError::MissingColumn(_)
                | ForecastError::InvalidDate { .. }
                | ForecastError::DuplicateKey { .. }
                | ForecastError::InvalidParameter(_)
                | ForecastError::DataError(_)
        )
    }
}
