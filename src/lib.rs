//! # Demand Sense
//!
//! Workspace facade for the demand forecasting crates.
//!
//! - [`demand_math`]: accuracy metrics, series window operators and
//!   calendar encodings
//! - [`demand_forecast`]: imputation, feature engineering, forecasting,
//!   lead-time prediction and the training pipeline
//!
//! ## Example
//!
//! ```
//! use demand_sense_workspace::demand_math::wmape;
//!
//! let error = wmape(&[10.0, 20.0], &[12.0, 18.0]).unwrap();
//! assert!((error - 4.0 / 30.0).abs() < 1e-12);
//! ```

pub use demand_forecast;
pub use demand_math;

/// Version of the workspace facade
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facade_exposes_both_crates() {
        assert_eq!(demand_forecast::NAME, "demand_forecast");
        assert!(demand_math::rmse(&[1.0], &[1.0]).is_ok());
        assert!(!VERSION.is_empty());
    }
}
