//! Gradient-boosted regression trees
//!
//! A histogram-based boosting learner used by every stage of the pipeline.
//! Each feature is cut into at most `max_bins` quantile bins once per fit;
//! trees are grown depth-first on gradient/hessian histograms with L2
//! regularised second-order gain, and the split search across features runs
//! on the rayon pool. Results are deterministic for a given seed.
//!
//! ```
//! use demand_forecast::boosting::{BoostingParams, FeatureMatrix, GradientBoostedRegressor, Objective};
//!
//! let rows: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64]).collect();
//! let targets: Vec<f64> = (0..50).map(|i| if i < 25 { 1.0 } else { 5.0 }).collect();
//! let matrix = FeatureMatrix::from_rows(rows).unwrap();
//! let params = BoostingParams { n_estimators: 50, ..BoostingParams::default() };
//! let model = GradientBoostedRegressor::fit(&matrix, &targets, Objective::SquaredError, &params).unwrap();
//! assert!(model.predict(&[40.0]) > 4.0);
//! ```

mod binning;
mod objective;
mod tree;

pub use objective::Objective;
pub use tree::{Node, RegressionTree};

use crate::error::{ForecastError, Result};
use binning::BinMapper;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tree::{GrowthParams, TreeBuilder};

/// Dense row-major matrix of feature values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f64>,
    n_rows: usize,
    n_cols: usize,
}

impl FeatureMatrix {
    /// Create an empty matrix with a fixed number of columns
    pub fn with_columns(n_cols: usize) -> Self {
        Self {
            data: Vec::new(),
            n_rows: 0,
            n_cols,
        }
    }

    /// Build a matrix from equally sized rows
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_cols = rows.first().map_or(0, |r| r.len());
        let mut matrix = Self::with_columns(n_cols);
        for row in rows {
            matrix.push_row(&row)?;
        }
        Ok(matrix)
    }

    /// Append one row
    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.n_cols {
            return Err(ForecastError::DataError(format!(
                "Row has {} values, matrix has {} columns",
                row.len(),
                self.n_cols
            )));
        }
        self.data.extend_from_slice(row);
        self.n_rows += 1;
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.n_cols..(index + 1) * self.n_cols]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n_cols + col]
    }
}

/// Boosting hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Shrinkage applied to every leaf
    pub learning_rate: f64,
    /// Minimum rows on each side of a split
    pub min_samples_leaf: usize,
    /// Minimum hessian sum on each side of a split
    pub min_child_weight: f64,
    /// L2 regularisation on leaf weights
    pub lambda: f64,
    /// Minimum gain required to keep a split
    pub min_split_gain: f64,
    /// Fraction of rows sampled for each tree
    pub subsample: f64,
    /// Maximum number of histogram bins per feature
    pub max_bins: usize,
    /// Leaf weight clamp before shrinkage; `0` uses the objective default
    pub max_delta_step: f64,
    /// Seed for row subsampling
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 6,
            learning_rate: 0.1,
            min_samples_leaf: 1,
            min_child_weight: 1.0,
            lambda: 1.0,
            min_split_gain: 0.0,
            subsample: 1.0,
            max_bins: 64,
            max_delta_step: 0.0,
            seed: 42,
        }
    }
}

impl BoostingParams {
    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ForecastError::InvalidParameter(
                "n_estimators must be positive".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        if self.max_bins < 2 || self.max_bins > u16::MAX as usize {
            return Err(ForecastError::InvalidParameter(format!(
                "max_bins must be in [2, {}], got {}",
                u16::MAX,
                self.max_bins
            )));
        }
        if self.lambda < 0.0 || self.min_child_weight < 0.0 || self.max_delta_step < 0.0 {
            return Err(ForecastError::InvalidParameter(
                "lambda, min_child_weight and max_delta_step must be non-negative".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(ForecastError::InvalidParameter(
                "min_samples_leaf must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-feature explanation of a single prediction, in margin space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributions {
    /// Base score plus every tree's root value
    pub bias: f64,
    /// One credit per input feature
    pub values: Vec<f64>,
}

impl Contributions {
    /// Bias plus all feature credits; equals the raw model margin
    pub fn margin(&self) -> f64 {
        self.bias + self.values.iter().sum::<f64>()
    }
}

/// A fitted gradient-boosted tree ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    objective: Objective,
    base_score: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedRegressor {
    /// Fit an ensemble on `matrix` against `targets`
    pub fn fit(
        matrix: &FeatureMatrix,
        targets: &[f64],
        objective: Objective,
        params: &BoostingParams,
    ) -> Result<Self> {
        params.validate()?;
        objective
            .validate()
            .map_err(ForecastError::InvalidParameter)?;

        let n_rows = matrix.n_rows();
        if n_rows == 0 {
            return Err(ForecastError::TrainingError(
                "Cannot fit on an empty training partition".to_string(),
            ));
        }
        if targets.len() != n_rows {
            return Err(ForecastError::TrainingError(format!(
                "Target length ({}) doesn't match row count ({})",
                targets.len(),
                n_rows
            )));
        }
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(ForecastError::TrainingError(
                "Targets must be finite".to_string(),
            ));
        }
        if objective.uses_log_link() && targets.iter().any(|t| *t < 0.0) {
            return Err(ForecastError::TrainingError(
                "Log-link objectives require non-negative targets".to_string(),
            ));
        }

        let growth = GrowthParams {
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            min_child_weight: params.min_child_weight,
            lambda: params.lambda,
            learning_rate: params.learning_rate,
            max_delta_step: if params.max_delta_step > 0.0 {
                params.max_delta_step
            } else {
                objective.default_max_delta_step()
            },
            min_split_gain: params.min_split_gain,
        };

        let mapper = BinMapper::fit(matrix, params.max_bins);
        let bins = mapper.bin_matrix(matrix);
        let base_score = objective.base_score(targets);
        let mut margins = vec![base_score; n_rows];
        let mut gradients = vec![0.0; n_rows];
        let mut hessians = vec![0.0; n_rows];
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            gradients
                .par_iter_mut()
                .zip(hessians.par_iter_mut())
                .zip(margins.par_iter().zip(targets.par_iter()))
                .for_each(|((g, h), (m, t))| {
                    let (grad, hess) = objective.gradient(*m, *t);
                    *g = grad;
                    *h = hess;
                });

            if gradients.iter().chain(hessians.iter()).any(|v| !v.is_finite()) {
                return Err(ForecastError::TrainingError(format!(
                    "Numerical divergence at boosting round {}",
                    round
                )));
            }

            let mut rows: Vec<usize> = if params.subsample < 1.0 {
                (0..n_rows)
                    .filter(|_| rng.gen::<f64>() < params.subsample)
                    .collect()
            } else {
                (0..n_rows).collect()
            };
            if rows.is_empty() {
                rows = (0..n_rows).collect();
            }

            let tree = TreeBuilder::new(
                &bins,
                &mapper,
                &gradients,
                &hessians,
                &growth,
                matrix.n_cols(),
            )
            .build(&mut rows);

            margins
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, m)| *m += tree.predict(matrix.row(i)));

            if margins.iter().any(|m| !m.is_finite()) {
                return Err(ForecastError::TrainingError(format!(
                    "Numerical divergence at boosting round {}",
                    round
                )));
            }
            trees.push(tree);
        }

        Ok(Self {
            objective,
            base_score,
            n_features: matrix.n_cols(),
            trees,
        })
    }

    /// Raw margin for one row
    pub fn predict_margin(&self, row: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    /// Prediction on the target scale for one row
    pub fn predict(&self, row: &[f64]) -> f64 {
        self.objective.transform(self.predict_margin(row))
    }

    /// Decompose the margin of one row into bias and per-feature credits
    pub fn contributions(&self, row: &[f64]) -> Contributions {
        let mut values = vec![0.0; self.n_features];
        let bias = self.base_score
            + self
                .trees
                .iter()
                .map(|t| t.contributions(row, &mut values))
                .sum::<f64>();
        Contributions { bias, values }
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Check that every split refers to an existing feature
    pub(crate) fn check_consistency(&self) -> Result<()> {
        for tree in &self.trees {
            if let Some(feature) = tree.max_feature() {
                if feature >= self.n_features {
                    return Err(ForecastError::ArtifactError(format!(
                        "Tree splits on feature {} but the model has {} features",
                        feature, self.n_features
                    )));
                }
            }
        }
        Ok(())
    }
}
