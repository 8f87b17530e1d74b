//! Trained model artifacts
//!
//! An artifact bundles everything needed to score a row: the fitted
//! regressor, the exact ordered feature names it was trained on, the
//! categorical encoders, and the target transform. All parts travel together;
//! an artifact is never built or loaded from a subset of them.

use crate::boosting::{BoostingParams, FeatureMatrix, GradientBoostedRegressor, Objective};
use crate::data::{Context, Observation, CATEGORICAL_FIELDS};
use crate::encoder::{CategoricalEncoder, EncoderSet};
use crate::error::{ForecastError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Anything that can supply feature values by name
pub trait FeatureSource {
    /// Numeric value of a feature, `None` when absent
    fn numeric(&self, name: &str) -> Option<f64>;

    /// Label of a categorical feature, `None` when absent
    fn label(&self, name: &str) -> Option<Cow<'_, str>>;
}

impl FeatureSource for Observation {
    fn numeric(&self, name: &str) -> Option<f64> {
        Observation::numeric(self, name)
    }

    fn label(&self, name: &str) -> Option<Cow<'_, str>> {
        self.categorical(name).map(Cow::Borrowed)
    }
}

impl FeatureSource for Context {
    fn numeric(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_f64())
    }

    fn label(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Owned(v.as_label()))
    }
}

/// Which training rows [`ModelArtifact::fit`] keeps when features are missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingFeatures<'a> {
    /// Keep every row; a missing value follows the right branch of a split
    Keep,
    /// Skip rows missing any feature other than the listed ones
    DropExcept(&'a [String]),
}

impl MissingFeatures<'_> {
    fn rejects(&self, names: &[String], row: &[f64]) -> bool {
        match self {
            MissingFeatures::Keep => false,
            MissingFeatures::DropExcept(optional) => names
                .iter()
                .zip(row)
                .any(|(name, v)| v.is_nan() && !optional.contains(name)),
        }
    }
}

/// Transform applied to the target before fitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetTransform {
    #[default]
    Identity,
    /// `ln(1 + y)` when fitting, `exp(m) - 1` when predicting
    Log1p,
}

impl TargetTransform {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            TargetTransform::Identity => value,
            TargetTransform::Log1p => value.ln_1p(),
        }
    }

    pub fn inverse(&self, value: f64) -> f64 {
        match self {
            TargetTransform::Identity => value,
            TargetTransform::Log1p => value.exp_m1(),
        }
    }
}

/// Credit of one feature towards a prediction, in model margin space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAttribution {
    pub feature: String,
    pub value: f64,
}

/// Per-feature explanation of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Margin before any feature is taken into account
    pub bias: f64,
    /// Non-zero attributions, largest magnitude first
    pub attributions: Vec<FeatureAttribution>,
}

impl Explanation {
    /// Bias plus every attribution
    pub fn margin(&self) -> f64 {
        self.bias + self.attributions.iter().map(|a| a.value).sum::<f64>()
    }
}

/// A prediction with its optional explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
}

/// Fit one encoder for every categorical column in `feature_names`
pub fn fit_encoders<S: FeatureSource>(sources: &[S], feature_names: &[String]) -> EncoderSet {
    let mut encoders = EncoderSet::new();
    for name in feature_names {
        if CATEGORICAL_FIELDS.contains(&name.as_str()) {
            let encoder = CategoricalEncoder::fit(sources.iter().filter_map(|s| s.label(name)));
            encoders.insert(name.clone(), encoder);
        }
    }
    encoders
}

/// Build the model input for one source
///
/// Categorical columns are encoded (absent or unseen labels give the unseen
/// code); absent numeric columns take `missing`.
pub fn encode_features<S: FeatureSource + ?Sized>(
    feature_names: &[String],
    encoders: &EncoderSet,
    source: &S,
    missing: f64,
) -> Vec<f64> {
    feature_names
        .iter()
        .map(|name| match encoders.get(name) {
            Some(encoder) => source
                .label(name)
                .map_or(crate::encoder::UNSEEN_CODE, |label| encoder.transform(&label))
                as f64,
            None => source.numeric(name).unwrap_or(missing),
        })
        .collect()
}

/// A fitted regressor with its feature list and encoders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    regressor: GradientBoostedRegressor,
    feature_names: Vec<String>,
    encoders: EncoderSet,
    #[serde(default)]
    target: TargetTransform,
}

impl ModelArtifact {
    /// Assemble an artifact, checking that its parts agree
    pub fn new(
        regressor: GradientBoostedRegressor,
        feature_names: Vec<String>,
        encoders: EncoderSet,
        target: TargetTransform,
    ) -> Result<Self> {
        let artifact = Self {
            regressor,
            feature_names,
            encoders,
            target,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Fit a regressor on `sources` against `targets`
    ///
    /// Rows whose target is not finite are skipped; `missing` decides what
    /// happens to rows with absent features.
    #[allow(clippy::too_many_arguments)]
    pub fn fit<S: FeatureSource + Sync>(
        sources: &[S],
        targets: &[f64],
        feature_names: Vec<String>,
        encoders: EncoderSet,
        objective: Objective,
        target: TargetTransform,
        params: &BoostingParams,
        missing: MissingFeatures<'_>,
    ) -> Result<Self> {
        if sources.len() != targets.len() {
            return Err(ForecastError::TrainingError(format!(
                "{} rows but {} targets",
                sources.len(),
                targets.len()
            )));
        }

        let encoded: Vec<Option<(Vec<f64>, f64)>> = sources
            .par_iter()
            .zip(targets.par_iter())
            .map(|(source, &y)| {
                let y = target.apply(y);
                if !y.is_finite() {
                    return None;
                }
                let row = encode_features(&feature_names, &encoders, source, f64::NAN);
                if missing.rejects(&feature_names, &row) {
                    return None;
                }
                Some((row, y))
            })
            .collect();

        let mut matrix = FeatureMatrix::with_columns(feature_names.len());
        let mut y = Vec::with_capacity(encoded.len());
        for (row, value) in encoded.into_iter().flatten() {
            matrix.push_row(&row)?;
            y.push(value);
        }

        tracing::debug!(
            rows = matrix.n_rows(),
            skipped = sources.len() - matrix.n_rows(),
            features = feature_names.len(),
            "Fitting regressor"
        );

        let regressor = GradientBoostedRegressor::fit(&matrix, &y, objective, params)?;
        Self::new(regressor, feature_names, encoders, target)
    }

    /// Deserialize and validate an artifact
    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: ModelArtifact = serde_json::from_str(json)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn validate(&self) -> Result<()> {
        if self.feature_names.len() != self.regressor.n_features() {
            return Err(ForecastError::ArtifactError(format!(
                "{} feature names for a regressor trained on {} features",
                self.feature_names.len(),
                self.regressor.n_features()
            )));
        }
        if let Some(missing) = self
            .feature_names
            .iter()
            .find(|name| CATEGORICAL_FIELDS.contains(&name.as_str()) && !self.encoders.contains(name))
        {
            return Err(ForecastError::ArtifactError(format!(
                "No encoder for categorical feature '{}'",
                missing
            )));
        }
        self.regressor.check_consistency()
    }

    /// Prediction on the original target scale, clamped at zero
    ///
    /// Absent numeric features are filled with zero.
    pub fn predict<S: FeatureSource + ?Sized>(&self, source: &S) -> f64 {
        let row = encode_features(&self.feature_names, &self.encoders, source, 0.0);
        self.predict_encoded(&row)
    }

    /// Like [`ModelArtifact::predict`], with a per-feature explanation
    pub fn predict_explained<S: FeatureSource + ?Sized>(&self, source: &S, explain: bool) -> Prediction {
        let row = encode_features(&self.feature_names, &self.encoders, source, 0.0);
        let value = self.predict_encoded(&row);
        let explanation = explain.then(|| self.explain(&row));
        Prediction { value, explanation }
    }

    /// Batch predictions; absent values stay `NaN` rather than zero
    pub(crate) fn predict_batch<S: FeatureSource + Sync>(&self, sources: &[S]) -> Vec<f64> {
        sources
            .par_iter()
            .map(|s| {
                let row = encode_features(&self.feature_names, &self.encoders, s, f64::NAN);
                self.predict_encoded(&row)
            })
            .collect()
    }

    fn predict_encoded(&self, row: &[f64]) -> f64 {
        self.target.inverse(self.regressor.predict(row)).max(0.0)
    }

    fn explain(&self, row: &[f64]) -> Explanation {
        let contributions = self.regressor.contributions(row);
        let mut attributions: Vec<FeatureAttribution> = self
            .feature_names
            .iter()
            .zip(contributions.values)
            .filter(|(_, value)| *value != 0.0)
            .map(|(feature, value)| FeatureAttribution {
                feature: feature.clone(),
                value,
            })
            .collect();
        attributions.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
        Explanation {
            bias: contributions.bias,
            attributions,
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn encoders(&self) -> &EncoderSet {
        &self.encoders
    }

    pub fn regressor(&self) -> &GradientBoostedRegressor {
        &self.regressor
    }

    pub fn target_transform(&self) -> TargetTransform {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureValue;
    use chrono::NaiveDate;

    fn rows() -> Vec<Observation> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..60)
            .map(|i| {
                let store = if i % 2 == 0 { "S1" } else { "S2" };
                let mut row = Observation::new(start + chrono::Duration::days(i), store, "P1");
                row.list_price = (i % 5) as f64;
                row.units_sold = if store == "S1" { 3.0 } else { 9.0 };
                row
            })
            .collect()
    }

    fn fitted() -> ModelArtifact {
        let rows = rows();
        let targets: Vec<f64> = rows.iter().map(|r| r.units_sold).collect();
        let names = vec!["store_id".to_string(), "list_price".to_string()];
        let encoders = fit_encoders(&rows, &names);
        let params = BoostingParams {
            n_estimators: 40,
            max_depth: 2,
            learning_rate: 0.3,
            ..BoostingParams::default()
        };
        ModelArtifact::fit(
            &rows,
            &targets,
            names,
            encoders,
            Objective::SquaredError,
            TargetTransform::Identity,
            &params,
            MissingFeatures::DropExcept(&[]),
        )
        .unwrap()
    }

    #[test]
    fn log1p_round_trips() {
        let t = TargetTransform::Log1p;
        assert!((t.inverse(t.apply(12.0)) - 12.0).abs() < 1e-12);
    }

    #[test]
    fn context_prediction_uses_encoders() {
        let artifact = fitted();
        let mut context = Context::new();
        context.insert("store_id".to_string(), FeatureValue::from("S2"));
        assert!(artifact.predict(&context) > 6.0);
        context.insert("store_id".to_string(), FeatureValue::from("S1"));
        assert!(artifact.predict(&context) < 6.0);
    }

    #[test]
    fn explanation_sums_to_margin() {
        let artifact = fitted();
        let mut context = Context::new();
        context.insert("store_id".to_string(), FeatureValue::from("S2"));
        let prediction = artifact.predict_explained(&context, true);
        let explanation = prediction.explanation.unwrap();
        assert!((explanation.margin() - prediction.value).abs() < 1e-9);
        assert_eq!(explanation.attributions[0].feature, "store_id");
    }

    #[test]
    fn json_requires_every_part() {
        let artifact = fitted();
        let json = artifact.to_json().unwrap();
        assert!(ModelArtifact::from_json(&json).is_ok());

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value.as_object_mut().unwrap().remove("encoders");
        assert!(ModelArtifact::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn json_with_mismatched_features_is_rejected() {
        let artifact = fitted();
        let mut value: serde_json::Value = serde_json::from_str(&artifact.to_json().unwrap()).unwrap();
        value["feature_names"] = serde_json::json!(["store_id"]);
        let err = ModelArtifact::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, ForecastError::ArtifactError(_)));
    }
}
