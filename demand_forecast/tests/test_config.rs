use demand_forecast::logging::LogFormat;
use demand_forecast::{ForecastError, Horizon, PipelineConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
horizons = [1, 14]
holdout_days = 21
explain = false

[forecaster]
n_estimators = 200

[features]
lags = [1, 7]

[log]
level = "debug"
format = "json"
"#
    )
    .unwrap();

    let config = PipelineConfig::load(file.path()).unwrap();
    assert_eq!(config.horizons, vec![Horizon::Day1, Horizon::Day14]);
    assert_eq!(config.holdout_days, 21);
    assert!(!config.explain);
    assert_eq!(config.forecaster.n_estimators, 200);
    assert_eq!(config.features.lags, vec![1, 7]);
    assert_eq!(config.log.format, LogFormat::Json);
    // untouched sections keep their defaults
    assert_eq!(config.imputer, PipelineConfig::default().imputer);
}

#[test]
fn test_missing_file() {
    let result = PipelineConfig::load("/nonexistent/pipeline.toml");
    assert!(matches!(result, Err(ForecastError::IoError(_))));
}

#[rstest]
#[case("horizons = []", "horizon")]
#[case("horizons = [1, 1]", "repeat")]
#[case("horizons = [3]", "")]
#[case("holdout_days = 0", "holdout_days")]
#[case("predict_timeout_ms = 0", "predict_timeout_ms")]
#[case("[imputer]\nlearning_rate = 0.0", "[imputer]")]
#[case("[lead_time]\nsubsample = 1.5", "[lead_time]")]
#[case("[features]\nlags = [0]", "[features]")]
fn test_invalid_documents(#[case] document: &str, #[case] fragment: &str) {
    match PipelineConfig::from_toml_str(document) {
        Err(ForecastError::ConfigError(message)) => assert!(
            message.contains(fragment),
            "'{}' does not mention '{}'",
            message,
            fragment
        ),
        other => panic!("expected a config error, got {:?}", other),
    }
}
