//! Loss functions for gradient boosting

use serde::{Deserialize, Serialize};

/// Training objective of a boosted regressor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Objective {
    /// Squared error with identity link
    SquaredError,
    /// Poisson deviance with log link, for non-negative counts
    Poisson,
    /// Tweedie deviance with log link, for skewed non-negative targets
    Tweedie { variance_power: f64 },
}

impl Objective {
    /// True when the model margin is on the log scale
    pub fn uses_log_link(&self) -> bool {
        !matches!(self, Objective::SquaredError)
    }

    /// Leaf-value clamp applied before shrinkage when none is configured
    pub(crate) fn default_max_delta_step(&self) -> f64 {
        match self {
            Objective::Poisson => 0.7,
            _ => 0.0,
        }
    }

    /// Initial margin shared by every row
    pub(crate) fn base_score(&self, targets: &[f64]) -> f64 {
        let mean = targets.iter().sum::<f64>() / targets.len().max(1) as f64;
        if self.uses_log_link() {
            mean.max(1e-6).ln()
        } else {
            mean
        }
    }

    /// First and second derivative of the loss with respect to the margin
    pub(crate) fn gradient(&self, margin: f64, target: f64) -> (f64, f64) {
        match *self {
            Objective::SquaredError => (margin - target, 1.0),
            Objective::Poisson => {
                let mu = margin.exp();
                (mu - target, mu.max(1e-6))
            }
            Objective::Tweedie { variance_power: rho } => {
                let a = ((1.0 - rho) * margin).exp();
                let b = ((2.0 - rho) * margin).exp();
                let grad = -target * a + b;
                let hess = -(1.0 - rho) * target * a + (2.0 - rho) * b;
                (grad, hess.max(1e-6))
            }
        }
    }

    /// Map a raw margin to the prediction scale
    pub fn transform(&self, margin: f64) -> f64 {
        if self.uses_log_link() {
            margin.exp()
        } else {
            margin
        }
    }

    /// Check the objective's own parameters
    pub(crate) fn validate(&self) -> Result<(), String> {
        match *self {
            Objective::Tweedie { variance_power } if !(1.0..2.0).contains(&variance_power) => {
                Err(format!(
                    "Tweedie variance power must be in [1, 2), got {}",
                    variance_power
                ))
            }
            _ => Ok(()),
        }
    }
}
