//! Training orchestration and model serving
//!
//! [`DemandPipeline`] is a long-lived service object. Training runs one at a
//! time: imputation, holdout evaluation on temporary models, then production
//! fits on all data. The finished models are published as an immutable
//! [`ModelGeneration`] by swapping one `Arc`, so predictions always see a
//! complete generation. While a retrain is in flight, predictions keep
//! being served from the previous generation.

use crate::artifact::Prediction;
use crate::config::PipelineConfig;
use crate::data::{Context, Dataset};
use crate::error::{ForecastError, Result};
use crate::evaluation::{self, EvaluationReport};
use crate::forecaster::{Horizon, MultiHorizonForecaster};
use crate::imputer::{CensoredDemandImputer, ImputationSummary};
use crate::lead_time::LeadTimePredictor;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Lifecycle state of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// No generation has been committed yet
    Untrained,
    /// A training run is in progress
    Training,
    /// A generation is committed and servable
    Ready,
}

/// An immutable, fully trained model set
#[derive(Debug)]
pub struct ModelGeneration {
    id: u64,
    forecaster: MultiHorizonForecaster,
    lead_time: LeadTimePredictor,
    metrics: EvaluationReport,
    imputation: ImputationSummary,
    trained_at: DateTime<Utc>,
}

impl ModelGeneration {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn forecaster(&self) -> &MultiHorizonForecaster {
        &self.forecaster
    }

    pub fn lead_time(&self) -> &LeadTimePredictor {
        &self.lead_time
    }

    pub fn metrics(&self) -> &EvaluationReport {
        &self.metrics
    }

    pub fn imputation(&self) -> &ImputationSummary {
        &self.imputation
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }
}

#[derive(Debug)]
struct StatusState {
    status: PipelineStatus,
    last_error: Option<String>,
}

/// Demand forecasting service
#[derive(Debug)]
pub struct DemandPipeline {
    config: PipelineConfig,
    current: RwLock<Option<Arc<ModelGeneration>>>,
    state: RwLock<StatusState>,
    training: Mutex<u64>,
}

impl DemandPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            current: RwLock::new(None),
            state: RwLock::new(StatusState {
                status: PipelineStatus::Untrained,
                last_error: None,
            }),
            training: Mutex::new(0),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn status(&self) -> PipelineStatus {
        self.state.read().status
    }

    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    /// Message of the most recent failed training run
    pub fn last_error(&self) -> Option<String> {
        self.state.read().last_error.clone()
    }

    /// The committed generation, if any
    pub fn generation(&self) -> Option<Arc<ModelGeneration>> {
        self.current.read().clone()
    }

    /// Evaluation metrics of the committed generation
    pub fn latest_metrics(&self) -> Option<EvaluationReport> {
        self.generation().map(|g| g.metrics.clone())
    }

    /// Impute, evaluate, retrain on all data and publish a new generation
    ///
    /// Blocks while another run is in progress. On failure the previous
    /// generation stays servable and the error is returned.
    pub fn run_training_pipeline(&self, dataset: Dataset) -> Result<EvaluationReport> {
        let mut generations = self.training.lock();
        self.state.write().status = PipelineStatus::Training;
        let started = Instant::now();
        tracing::info!(rows = dataset.len(), generation = *generations + 1, "Training pipeline started");

        match self.train_generation(dataset, *generations + 1) {
            Ok(generation) => {
                *generations = generation.id;
                let metrics = generation.metrics.clone();
                *self.current.write() = Some(Arc::new(generation));
                let mut state = self.state.write();
                state.status = PipelineStatus::Ready;
                state.last_error = None;
                tracing::info!(
                    generation = *generations,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    segments = metrics.len(),
                    "Training pipeline finished"
                );
                Ok(metrics)
            }
            Err(err) => {
                let mut state = self.state.write();
                state.status = if self.current.read().is_some() {
                    PipelineStatus::Ready
                } else {
                    PipelineStatus::Untrained
                };
                state.last_error = Some(err.to_string());
                tracing::error!(error = %err, "Training pipeline failed");
                Err(err)
            }
        }
    }

    fn train_generation(&self, mut dataset: Dataset, id: u64) -> Result<ModelGeneration> {
        let config = &self.config;
        dataset.require_unique_keys()?;

        let mut imputer = CensoredDemandImputer::new(config.imputer.clone())?;
        let imputation = imputer.train_and_impute(&mut dataset)?;

        let mut forecaster = MultiHorizonForecaster::new(
            config.horizons.clone(),
            config.forecaster.clone(),
            config.features.clone(),
            config.explain,
        )?;
        let table = forecaster.engineer().build(&dataset)?;

        let metrics = evaluation::evaluate(config, &dataset, &table);

        tracing::info!("Production training on the full dataset");
        let mut lead_time = LeadTimePredictor::new(config.lead_time.clone(), config.explain)?;
        let with_lead_times = dataset.has_column("lead_time_days");
        if !with_lead_times {
            tracing::warn!("No lead_time_days column; lead-time model left untrained");
        }
        let (forecast_result, lead_time_result) = rayon::join(
            || forecaster.train(&table),
            || {
                if with_lead_times {
                    lead_time.train(&dataset)
                } else {
                    Ok(())
                }
            },
        );
        forecast_result?;
        lead_time_result?;

        Ok(ModelGeneration {
            id,
            forecaster,
            lead_time,
            metrics,
            imputation,
            trained_at: Utc::now(),
        })
    }

    /// Start a training run on the blocking thread pool
    ///
    /// Returns immediately; must be called from within a tokio runtime.
    pub fn spawn_training(self: &Arc<Self>, dataset: Dataset) -> TrainingJob {
        let pipeline = Arc::clone(self);
        TrainingJob {
            handle: tokio::task::spawn_blocking(move || pipeline.run_training_pipeline(dataset)),
        }
    }

    fn committed(&self) -> Result<Arc<ModelGeneration>> {
        self.generation().ok_or(ForecastError::NotReady)
    }

    /// Demand forecast for one context and horizon
    pub fn get_forecast(&self, context: &Context, horizon: Horizon) -> Result<Prediction> {
        let generation = self.committed()?;
        generation.forecaster.predict(context, horizon)
    }

    /// Supplier lead time in days for one context
    pub fn get_lead_time_forecast(&self, context: &Context) -> Result<Prediction> {
        let generation = self.committed()?;
        generation.lead_time.predict(context)
    }

    /// [`DemandPipeline::get_forecast`] under the configured deadline
    pub async fn forecast_with_timeout(
        self: &Arc<Self>,
        context: Context,
        horizon: Horizon,
    ) -> Result<Prediction> {
        let pipeline = Arc::clone(self);
        self.with_timeout(move || pipeline.get_forecast(&context, horizon))
            .await
    }

    /// [`DemandPipeline::get_lead_time_forecast`] under the configured deadline
    pub async fn lead_time_with_timeout(self: &Arc<Self>, context: Context) -> Result<Prediction> {
        let pipeline = Arc::clone(self);
        self.with_timeout(move || pipeline.get_lead_time_forecast(&context))
            .await
    }

    async fn with_timeout<F>(&self, predict: F) -> Result<Prediction>
    where
        F: FnOnce() -> Result<Prediction> + Send + 'static,
    {
        let limit = self.config.predict_timeout_ms;
        let task = tokio::task::spawn_blocking(predict);
        match tokio::time::timeout(Duration::from_millis(limit), task).await {
            Ok(joined) => joined?,
            Err(_) => Err(ForecastError::Timeout(limit)),
        }
    }
}

/// Handle to a training run started with [`DemandPipeline::spawn_training`]
#[derive(Debug)]
pub struct TrainingJob {
    handle: JoinHandle<Result<EvaluationReport>>,
}

impl TrainingJob {
    /// Wait for the run to finish
    pub async fn wait(self) -> Result<EvaluationReport> {
        self.handle.await?
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_untrained() {
        let pipeline = DemandPipeline::new(PipelineConfig::default()).unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Untrained);
        assert!(!pipeline.is_ready());
        assert!(pipeline.latest_metrics().is_none());
    }

    #[test]
    fn forecast_before_training_is_rejected() {
        let pipeline = DemandPipeline::new(PipelineConfig::default()).unwrap();
        let mut context = Context::new();
        context.insert("store_id".into(), "S1".into());
        context.insert("sku_id".into(), "P1".into());
        let err = pipeline.get_forecast(&context, Horizon::Day1).unwrap_err();
        assert!(matches!(err, ForecastError::NotReady));
        assert!(matches!(
            pipeline.get_lead_time_forecast(&context),
            Err(ForecastError::NotReady)
        ));
    }

    #[test]
    fn failed_first_run_stays_untrained() {
        let pipeline = DemandPipeline::new(PipelineConfig::default()).unwrap();
        let err = pipeline.run_training_pipeline(Dataset::from_rows(Vec::new())).unwrap_err();
        assert!(matches!(err, ForecastError::TrainingError(_)));
        assert_eq!(pipeline.status(), PipelineStatus::Untrained);
        assert!(pipeline.last_error().is_some());
    }
}
