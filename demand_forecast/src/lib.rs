//! # Demand Forecast
//!
//! Short-horizon demand and supplier lead-time forecasting for FMCG SKUs.
//!
//! ## Features
//!
//! - Censored demand imputation: stock-out days are corrected with a count
//!   model fit on in-stock days
//! - Leak-free temporal features: lags, trailing windows, EWMA and
//!   interactions computed per (store, SKU) series
//! - Direct multi-horizon forecasting (T+1, T+7, T+14) with one boosted tree
//!   model per horizon
//! - Lead-time prediction from contextual and supplier fields
//! - Holdout evaluation (RMSE, MAE, WMAPE, MAPE) and a serving pipeline that
//!   publishes immutable model generations
//!
//! ## Quick Start
//!
//! ```no_run
//! use demand_forecast::data::{Context, DataLoader};
//! use demand_forecast::{DemandPipeline, Horizon, PipelineConfig};
//!
//! # fn main() -> demand_forecast::Result<()> {
//! let dataset = DataLoader::from_csv("sales.csv")?;
//! let pipeline = DemandPipeline::new(PipelineConfig::default())?;
//!
//! let metrics = pipeline.run_training_pipeline(dataset)?;
//! for (segment, m) in &metrics {
//!     println!("{}: RMSE {:.2}", segment, m.rmse);
//! }
//!
//! let mut context = Context::new();
//! context.insert("store_id".into(), "S1".into());
//! context.insert("sku_id".into(), "P1".into());
//! context.insert("lag_1".into(), 12.0.into());
//! let forecast = pipeline.get_forecast(&context, Horizon::Day7)?;
//! println!("T+7 demand: {:.1}", forecast.value);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod boosting;
pub mod config;
pub mod data;
pub mod encoder;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod forecaster;
pub mod imputer;
pub mod lead_time;
pub mod logging;
pub mod pipeline;
pub mod synthetic;

// Re-export commonly used types
pub use crate::artifact::{Explanation, ModelArtifact, Prediction};
pub use crate::config::PipelineConfig;
pub use crate::data::{DataLoader, Dataset, Observation};
pub use crate::error::{ForecastError, Result};
pub use crate::evaluation::{EvaluationReport, SegmentMetrics};
pub use crate::forecaster::{Horizon, MultiHorizonForecaster};
pub use crate::imputer::CensoredDemandImputer;
pub use crate::lead_time::LeadTimePredictor;
pub use crate::pipeline::{DemandPipeline, ModelGeneration, PipelineStatus, TrainingJob};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
