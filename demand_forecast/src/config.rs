//! Pipeline configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. A partially specified `[imputer]`, `[forecaster]` or
//! `[lead_time]` table fills its missing keys from [`BoostingParams::default`].

use crate::boosting::BoostingParams;
use crate::error::{ForecastError, Result};
use crate::features::FeatureConfig;
use crate::forecaster::Horizon;
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Forecast horizons in days; each must be 1, 7 or 14
    pub horizons: Vec<Horizon>,
    /// Trailing days held out for evaluation
    pub holdout_days: i64,
    /// Segments with fewer scored rows are left out of the metrics
    pub min_holdout_rows: usize,
    /// Deadline for interactive predictions
    pub predict_timeout_ms: u64,
    /// Attach per-feature explanations to predictions
    pub explain: bool,
    pub imputer: BoostingParams,
    pub forecaster: BoostingParams,
    pub lead_time: BoostingParams,
    pub features: FeatureConfig,
    pub log: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            horizons: Horizon::ALL.to_vec(),
            holdout_days: 28,
            min_holdout_rows: 1,
            predict_timeout_ms: 2_000,
            explain: true,
            imputer: BoostingParams {
                n_estimators: 500,
                max_depth: 10,
                learning_rate: 0.05,
                ..BoostingParams::default()
            },
            forecaster: BoostingParams {
                n_estimators: 1000,
                max_depth: 8,
                learning_rate: 0.05,
                subsample: 0.8,
                ..BoostingParams::default()
            },
            lead_time: BoostingParams {
                n_estimators: 500,
                max_depth: 6,
                learning_rate: 0.1,
                ..BoostingParams::default()
            },
            features: FeatureConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.horizons.is_empty() {
            return Err(ForecastError::ConfigError(
                "at least one horizon must be configured".to_string(),
            ));
        }
        let mut seen = self.horizons.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != self.horizons.len() {
            return Err(ForecastError::ConfigError(
                "horizons must not repeat".to_string(),
            ));
        }
        if self.holdout_days <= 0 {
            return Err(ForecastError::ConfigError(format!(
                "holdout_days must be positive, got {}",
                self.holdout_days
            )));
        }
        if self.predict_timeout_ms == 0 {
            return Err(ForecastError::ConfigError(
                "predict_timeout_ms must be positive".to_string(),
            ));
        }

        for (section, params) in [
            ("imputer", &self.imputer),
            ("forecaster", &self.forecaster),
            ("lead_time", &self.lead_time),
        ] {
            params
                .validate()
                .map_err(|e| ForecastError::ConfigError(format!("[{}] {}", section, e)))?;
        }
        self.features
            .validate()
            .map_err(|e| ForecastError::ConfigError(format!("[features] {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.horizons, vec![Horizon::Day1, Horizon::Day7, Horizon::Day14]);
    }

    #[test]
    fn partial_sections_override() {
        let config = PipelineConfig::from_toml_str(
            r#"
            horizons = [1, 7]
            holdout_days = 14

            [forecaster]
            n_estimators = 50

            [log]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.horizons, vec![Horizon::Day1, Horizon::Day7]);
        assert_eq!(config.holdout_days, 14);
        assert_eq!(config.forecaster.n_estimators, 50);
        assert_eq!(config.log.format, crate::logging::LogFormat::Json);
    }

    #[test]
    fn unsupported_horizon_is_rejected() {
        let err = PipelineConfig::from_toml_str("horizons = [3]").unwrap_err();
        assert!(matches!(err, ForecastError::ConfigError(_)));
    }

    #[test]
    fn invalid_learning_rate_is_rejected() {
        let err = PipelineConfig::from_toml_str("[lead_time]\nlearning_rate = 1.5").unwrap_err();
        assert!(err.to_string().contains("lead_time"));
    }
}
