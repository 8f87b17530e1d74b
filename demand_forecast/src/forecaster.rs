//! Direct multi-horizon demand forecasting
//!
//! One independent regressor per horizon predicts `log1p` of the demand
//! `h` days after the row's date. Models live in a fixed slot per horizon,
//! so training one horizon never touches another.

use crate::artifact::{fit_encoders, FeatureSource, MissingFeatures, ModelArtifact, Prediction, TargetTransform};
use crate::boosting::{BoostingParams, Objective};
use crate::data::Context;
use crate::encoder::EncoderSet;
use crate::error::{ForecastError, Result};
use crate::features::{FeatureConfig, FeatureEngineer, FeatureTable, TableRow};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Contextual features used by every horizon, ahead of the generated ones
pub const BASE_FEATURES: [&str; 18] = [
    "month",
    "weekday",
    "is_weekend",
    "is_holiday",
    "dayofyear",
    "month_sin",
    "month_cos",
    "weekday_sin",
    "weekday_cos",
    "temperature",
    "list_price",
    "discount_pct",
    "promo_flag",
    "store_id",
    "sku_id",
    "category",
    "brand",
    "stock_opening",
];

/// Identity fields a forecast context must always carry
pub const IDENTITY_FIELDS: [&str; 2] = ["store_id", "sku_id"];

/// Supported forecast horizons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Horizon {
    Day1,
    Day7,
    Day14,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::Day1, Horizon::Day7, Horizon::Day14];

    /// Days ahead of the row date
    pub fn days(self) -> u32 {
        match self {
            Horizon::Day1 => 1,
            Horizon::Day7 => 7,
            Horizon::Day14 => 14,
        }
    }

    /// Metrics segment label, e.g. `Forecast_H7`
    pub fn segment(self) -> String {
        format!("Forecast_H{}", self.days())
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl TryFrom<u32> for Horizon {
    type Error = ForecastError;

    fn try_from(days: u32) -> Result<Self> {
        match days {
            1 => Ok(Horizon::Day1),
            7 => Ok(Horizon::Day7),
            14 => Ok(Horizon::Day14),
            other => Err(ForecastError::ModelNotAvailable(other)),
        }
    }
}

impl From<Horizon> for u32 {
    fn from(horizon: Horizon) -> Self {
        horizon.days()
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T+{}", self.days())
    }
}

/// Actual and predicted values for one scored segment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredRows {
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
}

impl ScoredRows {
    pub fn len(&self) -> usize {
        self.actual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actual.is_empty()
    }
}

/// One demand model per configured horizon
#[derive(Debug, Clone)]
pub struct MultiHorizonForecaster {
    horizons: Vec<Horizon>,
    params: BoostingParams,
    engineer: FeatureEngineer,
    explain: bool,
    encoders: Option<EncoderSet>,
    models: [Option<ModelArtifact>; Horizon::ALL.len()],
}

impl MultiHorizonForecaster {
    pub fn new(
        horizons: Vec<Horizon>,
        params: BoostingParams,
        features: FeatureConfig,
        explain: bool,
    ) -> Result<Self> {
        if horizons.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "at least one horizon is required".to_string(),
            ));
        }
        params.validate()?;
        Ok(Self {
            horizons,
            params,
            engineer: FeatureEngineer::new(features)?,
            explain,
            encoders: None,
            models: Default::default(),
        })
    }

    pub fn engineer(&self) -> &FeatureEngineer {
        &self.engineer
    }

    pub fn horizons(&self) -> &[Horizon] {
        &self.horizons
    }

    /// Base features followed by the table's generated columns
    pub fn feature_names(table: &FeatureTable) -> Vec<String> {
        BASE_FEATURES
            .iter()
            .map(|s| s.to_string())
            .chain(table.generated_columns().iter().cloned())
            .collect()
    }

    /// Fit a fresh model for every configured horizon
    ///
    /// Encoders are fit on the training rows of the first horizon and shared
    /// by all of them. Nothing is replaced unless every horizon succeeds.
    pub fn train(&mut self, table: &FeatureTable) -> Result<()> {
        let features = Self::feature_names(table);
        let rows = table.table_rows();
        let encoders = self.fit_shared_encoders(table, &rows, &features, self.horizons[0]);

        let fitted: Vec<(Horizon, ModelArtifact)> = self
            .horizons
            .par_iter()
            .map(|&horizon| {
                self.fit_horizon(table, &rows, &features, &encoders, horizon)
                    .map(|model| (horizon, model))
            })
            .collect::<Result<_>>()?;

        self.encoders = Some(encoders);
        for (horizon, model) in fitted {
            self.models[horizon.slot()] = Some(model);
        }
        Ok(())
    }

    /// Fit or refit a single horizon, leaving the others untouched
    ///
    /// Reuses the shared encoders when they exist, otherwise fits them on
    /// this horizon's training rows.
    pub fn train_horizon(&mut self, table: &FeatureTable, horizon: Horizon) -> Result<()> {
        if !self.horizons.contains(&horizon) {
            return Err(ForecastError::InvalidParameter(format!(
                "horizon {} is not configured",
                horizon
            )));
        }
        let features = Self::feature_names(table);
        let rows = table.table_rows();
        let encoders = match &self.encoders {
            Some(encoders) => encoders.clone(),
            None => self.fit_shared_encoders(table, &rows, &features, horizon),
        };

        let model = self.fit_horizon(table, &rows, &features, &encoders, horizon)?;
        self.encoders = Some(encoders);
        self.models[horizon.slot()] = Some(model);
        Ok(())
    }

    fn fit_shared_encoders(
        &self,
        table: &FeatureTable,
        rows: &[TableRow<'_>],
        features: &[String],
        horizon: Horizon,
    ) -> EncoderSet {
        let target = table.target(horizon.days() as usize);
        let kept: Vec<TableRow<'_>> = rows
            .iter()
            .zip(&target)
            .filter(|(_, y)| y.is_finite())
            .map(|(row, _)| *row)
            .collect();
        fit_encoders(&kept, features)
    }

    fn fit_horizon(
        &self,
        table: &FeatureTable,
        rows: &[TableRow<'_>],
        features: &[String],
        encoders: &EncoderSet,
        horizon: Horizon,
    ) -> Result<ModelArtifact> {
        tracing::info!(horizon = %horizon, rows = table.len(), "Training forecast model");
        let target = table.target(horizon.days() as usize);
        ModelArtifact::fit(
            rows,
            &target,
            features.to_vec(),
            encoders.clone(),
            Objective::SquaredError,
            TargetTransform::Log1p,
            &self.params,
            MissingFeatures::DropExcept(table.optional_columns()),
        )
        .map_err(|err| match err {
            ForecastError::TrainingError(msg) => {
                ForecastError::TrainingError(format!("horizon {}: {}", horizon, msg))
            }
            other => other,
        })
    }

    /// Forecast demand `horizon` days ahead for a single context
    ///
    /// `store_id` and `sku_id` are mandatory; any other absent feature is
    /// filled with zero.
    pub fn predict(&self, context: &Context, horizon: Horizon) -> Result<Prediction> {
        if let Some(missing) = IDENTITY_FIELDS.iter().find(|f| !context.contains_key(**f)) {
            return Err(ForecastError::InvalidParameter(format!(
                "forecast context must include '{}'",
                missing
            )));
        }
        let model = self.model(horizon)?;
        Ok(model.predict_explained(context, self.explain))
    }

    /// Score every row of `table` that has a target and every non-optional feature
    pub fn score(&self, table: &FeatureTable, horizon: Horizon) -> Result<ScoredRows> {
        let model = self.model(horizon)?;
        let target = table.target(horizon.days() as usize);

        let rows: Vec<(TableRow<'_>, f64)> = table
            .table_rows()
            .into_iter()
            .zip(target)
            .filter(|(row, y)| {
                y.is_finite()
                    && model
                        .feature_names()
                        .iter()
                        .all(|name| {
                            row.label(name).is_some()
                                || row.numeric(name).is_some_and(|v| !v.is_nan())
                                || table.optional_columns().contains(name)
                        })
            })
            .collect();

        let (sources, actual): (Vec<TableRow<'_>>, Vec<f64>) = rows.into_iter().unzip();
        let predicted = model.predict_batch(&sources);
        Ok(ScoredRows { actual, predicted })
    }

    fn model(&self, horizon: Horizon) -> Result<&ModelArtifact> {
        self.models[horizon.slot()]
            .as_ref()
            .ok_or(ForecastError::ModelNotAvailable(horizon.days()))
    }

    /// Artifact of a trained horizon
    pub fn artifact(&self, horizon: Horizon) -> Option<&ModelArtifact> {
        self.models[horizon.slot()].as_ref()
    }

    /// Horizons that currently have a model
    pub fn trained_horizons(&self) -> Vec<Horizon> {
        Horizon::ALL
            .into_iter()
            .filter(|h| self.models[h.slot()].is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_conversions() {
        assert_eq!(Horizon::try_from(7).unwrap(), Horizon::Day7);
        assert!(matches!(
            Horizon::try_from(3),
            Err(ForecastError::ModelNotAvailable(3))
        ));
        assert_eq!(Horizon::Day14.segment(), "Forecast_H14");
        assert_eq!(Horizon::Day1.to_string(), "T+1");
    }

    #[test]
    fn horizons_deserialize_from_days() {
        let horizons: Vec<Horizon> = serde_json::from_str("[1, 14]").unwrap();
        assert_eq!(horizons, vec![Horizon::Day1, Horizon::Day14]);
        assert!(serde_json::from_str::<Vec<Horizon>>("[5]").is_err());
    }

    #[test]
    fn requires_a_horizon() {
        let result = MultiHorizonForecaster::new(
            Vec::new(),
            BoostingParams::default(),
            FeatureConfig::default(),
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn untrained_horizon_is_not_available() {
        let forecaster = MultiHorizonForecaster::new(
            vec![Horizon::Day1],
            BoostingParams::default(),
            FeatureConfig::default(),
            false,
        )
        .unwrap();
        let mut context = Context::new();
        context.insert("store_id".into(), "S1".into());
        context.insert("sku_id".into(), "P1".into());
        let err = forecaster.predict(&context, Horizon::Day1).unwrap_err();
        assert!(matches!(err, ForecastError::ModelNotAvailable(1)));
    }
}
