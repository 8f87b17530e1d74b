//! Accuracy metrics for evaluating demand and lead-time forecasts

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

fn check_lengths(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.len() != predicted.len() {
        return Err(MathError::InvalidInput(format!(
            "Actual length ({}) doesn't match predicted length ({})",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.is_empty() {
        return Err(MathError::InsufficientData(
            "Metrics need at least one observation".to_string(),
        ));
    }
    Ok(())
}

/// Weighted Mean Absolute Percentage Error as a ratio
///
/// `sum(|actual - predicted|) / sum(|actual|)`; returns `0.0` when every
/// actual value is zero.
pub fn wmape(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual, predicted)?;

    let abs_error: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    let abs_actual: f64 = actual.iter().map(|a| a.abs()).sum();

    if abs_actual > 0.0 {
        Ok(abs_error / abs_actual)
    } else {
        Ok(0.0)
    }
}

/// Root Mean Squared Error
pub fn rmse(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual, predicted)?;

    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64;
    Ok(mse.sqrt())
}

/// Mean Absolute Error
pub fn mae(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual, predicted)?;

    Ok(actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64)
}

/// Mean Absolute Percentage Error in percent
///
/// Rows whose actual value is zero are excluded. Returns `0.0` when no row
/// has a non-zero actual.
pub fn mape(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual, predicted)?;

    let (sum, count) = actual
        .iter()
        .zip(predicted)
        .filter(|(a, _)| **a != 0.0)
        .fold((0.0, 0usize), |(sum, count), (a, p)| {
            (sum + ((a - p) / a).abs(), count + 1)
        });

    if count == 0 {
        return Ok(0.0);
    }
    Ok(sum / count as f64 * 100.0)
}

/// All accuracy metrics for one scored segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Weighted MAPE in percent
    pub wmape: f64,
    /// MAPE in percent
    pub mape: f64,
    /// Number of scored observations
    pub count: usize,
}

/// Compute every accuracy metric at once
pub fn accuracy(actual: &[f64], predicted: &[f64]) -> Result<AccuracyReport> {
    Ok(AccuracyReport {
        rmse: rmse(actual, predicted)?,
        mae: mae(actual, predicted)?,
        wmape: wmape(actual, predicted)? * 100.0,
        mape: mape(actual, predicted)?,
        count: actual.len(),
    })
}

impl std::fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "WMAPE: {:.2}% | MAPE: {:.2}% | RMSE: {:.2} | MAE: {:.2} (n={})",
            self.wmape, self.mape, self.rmse, self.mae, self.count
        )
    }
}
