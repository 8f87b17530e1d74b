//! Window operators over a single demand series
//!
//! All operators are positional and trailing: the output at index `i` only
//! reads inputs at indices `<= i`. Callers that need strictly-past values
//! apply [`shift`] first. Missing values are represented as `NaN`.

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Fixed-size trailing window that tracks sum and missing values
#[derive(Debug, Clone)]
pub struct RollingWindow {
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
    missing: usize,
}

impl RollingWindow {
    /// Create a new rolling window with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
            sum: 0.0,
            missing: 0,
        })
    }

    /// Push a new value, evicting the oldest one once the window is full
    pub fn update(&mut self, value: f64) {
        self.values.push_back(value);
        if value.is_nan() {
            self.missing += 1;
        } else {
            self.sum += value;
        }

        if self.values.len() > self.period {
            if let Some(old_value) = self.values.pop_front() {
                if old_value.is_nan() {
                    self.missing -= 1;
                } else {
                    self.sum -= old_value;
                }
            }
        }
    }

    /// True when the window holds `period` values and none are missing
    pub fn is_complete(&self) -> bool {
        self.values.len() == self.period && self.missing == 0
    }

    /// Mean of the window, `None` until the window is complete
    pub fn mean(&self) -> Option<f64> {
        if !self.is_complete() {
            return None;
        }
        Some(self.sum / self.period as f64)
    }

    /// Maximum of the window, `None` until the window is complete
    pub fn max(&self) -> Option<f64> {
        if !self.is_complete() {
            return None;
        }
        self.values.iter().copied().reduce(f64::max)
    }
}

/// Shift a series forward by `periods` positions, filling the head with `NaN`
///
/// `shift(x, k)[i] == x[i - k]`, so the value at `i` is the observation
/// `k` steps in the past.
pub fn shift(series: &[f64], periods: usize) -> Vec<f64> {
    (0..series.len())
        .map(|i| if i >= periods { series[i - periods] } else { f64::NAN })
        .collect()
}

/// Shift a series backward by `periods` positions, filling the tail with `NaN`
///
/// `lead(x, k)[i] == x[i + k]`. Used to build future targets, never features.
pub fn lead(series: &[f64], periods: usize) -> Vec<f64> {
    (0..series.len())
        .map(|i| series.get(i + periods).copied().unwrap_or(f64::NAN))
        .collect()
}

/// Trailing rolling mean; `NaN` until a full window without gaps is available
pub fn rolling_mean(series: &[f64], window: usize) -> Result<Vec<f64>> {
    let mut rolling = RollingWindow::new(window)?;
    Ok(series
        .iter()
        .map(|&value| {
            rolling.update(value);
            rolling.mean().unwrap_or(f64::NAN)
        })
        .collect())
}

/// Trailing rolling maximum; `NaN` until a full window without gaps is available
pub fn rolling_max(series: &[f64], window: usize) -> Result<Vec<f64>> {
    let mut rolling = RollingWindow::new(window)?;
    Ok(series
        .iter()
        .map(|&value| {
            rolling.update(value);
            rolling.max().unwrap_or(f64::NAN)
        })
        .collect())
}

/// Exponentially weighted moving average with bias-adjusted weights
///
/// The weight of the observation `j` steps back is `(1 - alpha)^j`,
/// normalised by the sum of weights of the observed values. Missing values
/// still age the weights but contribute nothing. The output is `NaN` until
/// the first observed value.
pub fn ewma(series: &[f64], alpha: f64) -> Result<Vec<f64>> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(MathError::InvalidInput(format!(
            "Alpha must be in (0, 1], got {}",
            alpha
        )));
    }

    let decay = 1.0 - alpha;
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    Ok(series
        .iter()
        .map(|&value| {
            numerator *= decay;
            denominator *= decay;
            if !value.is_nan() {
                numerator += value;
                denominator += 1.0;
            }
            if denominator > 0.0 {
                numerator / denominator
            } else {
                f64::NAN
            }
        })
        .collect())
}

/// Expanding mean over the observed values up to and including each index
pub fn expanding_mean(series: &[f64]) -> Vec<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    series
        .iter()
        .map(|&value| {
            if !value.is_nan() {
                sum += value;
                count += 1;
            }
            if count > 0 {
                sum / count as f64
            } else {
                f64::NAN
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn shift_moves_values_into_the_future() {
        let shifted = shift(&[1.0, 2.0, 3.0, 4.0], 2);
        assert!(shifted[0].is_nan());
        assert!(shifted[1].is_nan());
        assert_eq!(shifted[2], 1.0);
        assert_eq!(shifted[3], 2.0);
    }

    #[test]
    fn lead_pulls_values_from_the_future() {
        let led = lead(&[1.0, 2.0, 3.0], 1);
        assert_eq!(led[0], 2.0);
        assert_eq!(led[1], 3.0);
        assert!(led[2].is_nan());
    }

    #[test]
    fn rolling_mean_requires_full_window() {
        let means = rolling_mean(&[f64::NAN, 2.0, 4.0, 6.0], 2).unwrap();
        assert!(means[0].is_nan());
        assert!(means[1].is_nan());
        assert_relative_eq!(means[2], 3.0);
        assert_relative_eq!(means[3], 5.0);
    }

    #[test]
    fn rolling_max_tracks_window() {
        let maxima = rolling_max(&[3.0, 1.0, 2.0, 0.5], 2).unwrap();
        assert!(maxima[0].is_nan());
        assert_eq!(maxima[1], 3.0);
        assert_eq!(maxima[2], 2.0);
        assert_eq!(maxima[3], 2.0);
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(rolling_mean(&[1.0], 0).is_err());
        assert!(RollingWindow::new(0).is_err());
    }

    #[test]
    fn ewma_uses_adjusted_weights() {
        // alpha = 0.5: second value = (2 + 0.5 * 1) / (1 + 0.5)
        let smoothed = ewma(&[f64::NAN, 1.0, 2.0], 0.5).unwrap();
        assert!(smoothed[0].is_nan());
        assert_relative_eq!(smoothed[1], 1.0);
        assert_relative_eq!(smoothed[2], 2.5 / 1.5);
    }

    #[test]
    fn ewma_rejects_bad_alpha() {
        assert!(ewma(&[1.0], 0.0).is_err());
        assert!(ewma(&[1.0], 1.5).is_err());
    }

    #[test]
    fn expanding_mean_includes_current() {
        let means = expanding_mean(&[2.0, 4.0, f64::NAN, 6.0]);
        assert_relative_eq!(means[0], 2.0);
        assert_relative_eq!(means[1], 3.0);
        assert_relative_eq!(means[2], 3.0);
        assert_relative_eq!(means[3], 4.0);
    }
}
