//! Supplier lead-time prediction
//!
//! Lead time is modelled from static and contextual fields only (calendar,
//! weather, geography, entity identity, supplier); recent demand history
//! plays no part.

use crate::artifact::{fit_encoders, MissingFeatures, ModelArtifact, Prediction, TargetTransform};
use crate::boosting::{BoostingParams, Objective};
use crate::data::{Context, Dataset, Observation};
use crate::error::{ForecastError, Result};
use crate::forecaster::ScoredRows;

pub const LEAD_TIME_FEATURES: [&str; 21] = [
    "year",
    "month",
    "day",
    "weekofyear",
    "weekday",
    "is_weekend",
    "is_holiday",
    "temperature",
    "rain_mm",
    "store_id",
    "country",
    "city",
    "channel",
    "latitude",
    "longitude",
    "sku_id",
    "sku_name",
    "category",
    "subcategory",
    "brand",
    "supplier_id",
];

#[derive(Debug, Clone)]
pub struct LeadTimePredictor {
    params: BoostingParams,
    explain: bool,
    model: Option<ModelArtifact>,
}

impl LeadTimePredictor {
    pub fn new(params: BoostingParams, explain: bool) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            explain,
            model: None,
        })
    }

    /// Fit on every row that has a recorded lead time
    pub fn train(&mut self, dataset: &Dataset) -> Result<()> {
        dataset.require_columns(&["lead_time_days"])?;
        let rows: Vec<&Observation> = dataset
            .rows()
            .iter()
            .filter(|r| r.lead_time_days.is_some_and(f64::is_finite))
            .collect();
        tracing::info!(rows = rows.len(), "Training lead-time model");

        let targets: Vec<f64> = rows.iter().filter_map(|r| r.lead_time_days).collect();
        let sources: Vec<Observation> = rows.into_iter().cloned().collect();
        let features: Vec<String> = LEAD_TIME_FEATURES.iter().map(|s| s.to_string()).collect();
        let encoders = fit_encoders(&sources, &features);

        let model = ModelArtifact::fit(
            &sources,
            &targets,
            features,
            encoders,
            Objective::SquaredError,
            TargetTransform::Identity,
            &self.params,
            MissingFeatures::Keep,
        )
        .map_err(|err| match err {
            ForecastError::TrainingError(msg) => ForecastError::TrainingError(format!("lead time: {}", msg)),
            other => other,
        })?;
        self.model = Some(model);
        Ok(())
    }

    /// Predicted lead time in days, never negative
    pub fn predict(&self, context: &Context) -> Result<Prediction> {
        let model = self.model.as_ref().ok_or(ForecastError::NotReady)?;
        Ok(model.predict_explained(context, self.explain))
    }

    /// Score rows that carry a recorded lead time
    pub fn score(&self, dataset: &Dataset) -> Result<ScoredRows> {
        let model = self.model.as_ref().ok_or(ForecastError::NotReady)?;
        let (sources, actual): (Vec<Observation>, Vec<f64>) = dataset
            .rows()
            .iter()
            .filter_map(|r| Some((r.clone(), r.lead_time_days.filter(|v| v.is_finite())?)))
            .unzip();
        let predicted = model.predict_batch(&sources);
        Ok(ScoredRows { actual, predicted })
    }

    pub fn artifact(&self) -> Option<&ModelArtifact> {
        self.model.as_ref()
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureValue;
    use chrono::NaiveDate;

    fn dataset() -> Dataset {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows = (0..80)
            .map(|i| {
                let supplier = if i % 2 == 0 { "SUP-A" } else { "SUP-B" };
                let mut row = Observation::new(start + chrono::Duration::days(i / 2), "S1", "P1");
                row.supplier_id = supplier.to_string();
                row.lead_time_days = Some(if supplier == "SUP-A" { 2.0 } else { 9.0 });
                row
            })
            .collect();
        Dataset::from_rows(rows)
    }

    fn params() -> BoostingParams {
        BoostingParams {
            n_estimators: 40,
            max_depth: 3,
            learning_rate: 0.3,
            ..BoostingParams::default()
        }
    }

    #[test]
    fn learns_supplier_effect() {
        let mut predictor = LeadTimePredictor::new(params(), false).unwrap();
        predictor.train(&dataset()).unwrap();

        let mut context = Context::new();
        context.insert("supplier_id".into(), FeatureValue::from("SUP-B"));
        let slow = predictor.predict(&context).unwrap().value;
        context.insert("supplier_id".into(), FeatureValue::from("SUP-A"));
        let fast = predictor.predict(&context).unwrap().value;
        assert!(slow > fast + 4.0);
        assert!(fast >= 0.0);
    }

    #[test]
    fn predict_before_training_is_not_ready() {
        let predictor = LeadTimePredictor::new(params(), false).unwrap();
        assert!(matches!(
            predictor.predict(&Context::new()),
            Err(ForecastError::NotReady)
        ));
    }

    #[test]
    fn rows_without_lead_time_are_skipped() {
        let mut rows = dataset().into_rows();
        rows[0].lead_time_days = None;
        let mut predictor = LeadTimePredictor::new(params(), false).unwrap();
        predictor.train(&Dataset::from_rows(rows.clone())).unwrap();
        let scored = predictor.score(&Dataset::from_rows(rows)).unwrap();
        assert_eq!(scored.len(), 79);
    }
}
