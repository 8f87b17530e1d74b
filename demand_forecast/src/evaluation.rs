//! Time-split evaluation of temporary models
//!
//! Features are computed once on the full table so lag history crosses the
//! cutoff, then temporary models are fit on rows before the cutoff and
//! scored on the rest. Nothing here touches the production models, and a
//! segment that cannot be scored is left out rather than failing the run.

use crate::config::PipelineConfig;
use crate::data::Dataset;
use crate::error::Result;
use crate::features::FeatureTable;
use crate::forecaster::{MultiHorizonForecaster, ScoredRows};
use crate::lead_time::LeadTimePredictor;
use chrono::Duration;
use demand_math::accuracy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Segment label of the lead-time model
pub const LEAD_TIME_SEGMENT: &str = "Lead_Time";

/// Accuracy of one segment, rounded to two decimals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetrics {
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    #[serde(rename = "MAE")]
    pub mae: f64,
    /// Weighted MAPE in percent
    #[serde(rename = "WMAPE", skip_serializing_if = "Option::is_none", default)]
    pub wmape: Option<f64>,
    /// MAPE in percent over non-zero actuals
    #[serde(rename = "MAPE", skip_serializing_if = "Option::is_none", default)]
    pub mape: Option<f64>,
    /// Number of scored rows
    pub rows: usize,
}

/// Segment label to metrics
pub type EvaluationReport = BTreeMap<String, SegmentMetrics>;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Run the holdout evaluation for every configured segment
pub fn evaluate(config: &PipelineConfig, dataset: &Dataset, table: &FeatureTable) -> EvaluationReport {
    let mut report = EvaluationReport::new();
    let Some(max_date) = dataset.max_date() else {
        tracing::warn!("Evaluation skipped: empty dataset");
        return report;
    };
    let cutoff = max_date - Duration::days(config.holdout_days);
    tracing::info!(%cutoff, holdout_days = config.holdout_days, "Evaluation started");

    let (train_table, test_table) = table.split_at_date(cutoff);
    let forecast_segments = forecast_scores(config, &train_table, &test_table);
    for (segment, scored) in forecast_segments {
        record(config, &mut report, segment, scored, true);
    }

    if dataset.has_column("lead_time_days") {
        let (train_rows, test_rows) = dataset.split_at_date(cutoff);
        let lead_time = lead_time_scores(config, &train_rows, &test_rows);
        record(config, &mut report, LEAD_TIME_SEGMENT.to_string(), lead_time, false);
    }

    report
}

fn forecast_scores(
    config: &PipelineConfig,
    train: &FeatureTable,
    test: &FeatureTable,
) -> Vec<(String, Result<ScoredRows>)> {
    let mut temporary = match MultiHorizonForecaster::new(
        config.horizons.clone(),
        config.forecaster.clone(),
        config.features.clone(),
        false,
    ) {
        Ok(forecaster) => forecaster,
        Err(err) => {
            tracing::warn!(error = %err, "Forecast segments skipped");
            return Vec::new();
        }
    };

    config
        .horizons
        .iter()
        .map(|&horizon| {
            let scored = temporary
                .train_horizon(train, horizon)
                .and_then(|_| temporary.score(test, horizon));
            (horizon.segment(), scored)
        })
        .collect()
}

fn lead_time_scores(config: &PipelineConfig, train: &Dataset, test: &Dataset) -> Result<ScoredRows> {
    let mut temporary = LeadTimePredictor::new(config.lead_time.clone(), false)?;
    temporary.train(train)?;
    temporary.score(test)
}

fn record(
    config: &PipelineConfig,
    report: &mut EvaluationReport,
    segment: String,
    scored: Result<ScoredRows>,
    percentages: bool,
) {
    let scored = match scored {
        Ok(scored) => scored,
        Err(err) => {
            tracing::warn!(%segment, error = %err, "Segment skipped: temporary model unavailable");
            return;
        }
    };
    if scored.is_empty() || scored.len() < config.min_holdout_rows {
        tracing::warn!(
            %segment,
            rows = scored.len(),
            min_rows = config.min_holdout_rows,
            "Segment skipped: holdout too small"
        );
        return;
    }

    match accuracy(&scored.actual, &scored.predicted) {
        Ok(acc) => {
            let metrics = SegmentMetrics {
                rmse: round2(acc.rmse),
                mae: round2(acc.mae),
                wmape: percentages.then(|| round2(acc.wmape)),
                mape: percentages.then(|| round2(acc.mape)),
                rows: acc.count,
            };
            tracing::info!(
                %segment,
                rmse = metrics.rmse,
                mae = metrics.mae,
                wmape = ?metrics.wmape,
                rows = metrics.rows,
                "Segment evaluated"
            );
            report.insert(segment, metrics);
        }
        Err(err) => tracing::warn!(%segment, error = %err, "Segment skipped: metrics failed"),
    }
}
