use demand_forecast::data::{Context, FeatureValue};
use demand_forecast::features::{FeatureConfig, FeatureTable};
use demand_forecast::{ForecastError, Horizon, ModelArtifact, MultiHorizonForecaster};
use pretty_assertions::assert_eq;

mod common;

fn forecaster() -> MultiHorizonForecaster {
    MultiHorizonForecaster::new(
        Horizon::ALL.to_vec(),
        common::fast_params(),
        FeatureConfig::default(),
        true,
    )
    .unwrap()
}

fn table(seed: u64) -> FeatureTable {
    let dataset = common::synthetic(2, 2, 90, seed);
    forecaster().engineer().build(&dataset).unwrap()
}

fn trained() -> (MultiHorizonForecaster, FeatureTable) {
    let table = table(11);
    let mut model = forecaster();
    model.train(&table).unwrap();
    (model, table)
}

#[test]
fn test_every_horizon_is_trained() {
    let (model, table) = trained();
    assert_eq!(model.trained_horizons(), Horizon::ALL.to_vec());

    let artifact = model.artifact(Horizon::Day7).unwrap();
    assert_eq!(
        artifact.feature_names().to_vec(),
        MultiHorizonForecaster::feature_names(&table)
    );
    assert!(artifact.encoders().contains("store_id"));
}

#[test]
fn test_encoders_are_shared_across_horizons() {
    let (model, _) = trained();
    let first = model.artifact(Horizon::Day1).unwrap().encoders();
    for horizon in [Horizon::Day7, Horizon::Day14] {
        assert_eq!(model.artifact(horizon).unwrap().encoders(), first);
    }
}

#[test]
fn test_predict_is_idempotent() {
    let (model, table) = trained();
    let row = table.latest_row("S1", "P2").unwrap();
    let features = model.artifact(Horizon::Day1).unwrap().feature_names().to_vec();
    let context = table.context(row, &features);

    let first = model.predict(&context, Horizon::Day1).unwrap();
    let second = model.predict(&context, Horizon::Day1).unwrap();
    assert_eq!(first, second);
    assert!(first.value >= 0.0);

    let explanation = first.explanation.unwrap();
    assert!(!explanation.attributions.is_empty());
}

#[test]
fn test_horizon_isolation() {
    let (mut model, _) = trained();
    let day1: ModelArtifact = model.artifact(Horizon::Day1).unwrap().clone();
    let day14: ModelArtifact = model.artifact(Horizon::Day14).unwrap().clone();
    let day7_before = model.artifact(Horizon::Day7).unwrap().clone();

    model.train_horizon(&table(99), Horizon::Day7).unwrap();

    assert_eq!(model.artifact(Horizon::Day1).unwrap(), &day1);
    assert_eq!(model.artifact(Horizon::Day14).unwrap(), &day14);
    assert_ne!(model.artifact(Horizon::Day7).unwrap(), &day7_before);
}

#[test]
fn test_missing_features_are_zero_filled() {
    let (model, _) = trained();
    let sparse = common::identity_context("S1", "P1");

    let mut zeros: Context = sparse.clone();
    for name in model.artifact(Horizon::Day1).unwrap().feature_names() {
        zeros
            .entry(name.clone())
            .or_insert(FeatureValue::Number(0.0));
    }

    let filled = model.predict(&sparse, Horizon::Day1).unwrap();
    let explicit = model.predict(&zeros, Horizon::Day1).unwrap();
    assert_eq!(filled.value, explicit.value);
    assert!(filled.value.is_finite());
}

#[test]
fn test_identity_fields_are_mandatory() {
    let (model, _) = trained();
    let mut context = common::identity_context("S1", "P1");
    context.remove("sku_id");

    let err = model.predict(&context, Horizon::Day1).unwrap_err();
    assert!(matches!(err, ForecastError::InvalidParameter(_)));
}

#[test]
fn test_unconfigured_horizon() {
    let table = table(11);
    let mut model = MultiHorizonForecaster::new(
        vec![Horizon::Day1],
        common::fast_params(),
        FeatureConfig::default(),
        false,
    )
    .unwrap();
    model.train(&table).unwrap();

    let context = common::identity_context("S1", "P1");
    assert!(model.predict(&context, Horizon::Day1).is_ok());
    assert!(matches!(
        model.predict(&context, Horizon::Day14),
        Err(ForecastError::ModelNotAvailable(14))
    ));
    assert!(model.train_horizon(&table, Horizon::Day7).is_err());
}

#[test]
fn test_artifact_json_round_trip() {
    let (model, table) = trained();
    let artifact = model.artifact(Horizon::Day14).unwrap();
    let restored = ModelArtifact::from_json(&artifact.to_json().unwrap()).unwrap();

    let row = table.latest_row("S2", "P1").unwrap();
    let context = table.context(row, artifact.feature_names());
    assert!((restored.predict(&context) - artifact.predict(&context)).abs() < 1e-9);
    assert_eq!(restored.feature_names(), artifact.feature_names());
}

#[test]
fn test_holdout_scoring_uses_complete_rows() {
    let (model, table) = trained();
    let scored = model.score(&table, Horizon::Day14).unwrap();

    // the last 14 days of each series have no target
    assert!(!scored.is_empty());
    assert!(scored.len() <= 4 * (90 - 14));
    assert_eq!(scored.actual.len(), scored.predicted.len());
    assert!(scored.predicted.iter().all(|p| *p >= 0.0));
}

#[test]
fn test_new_sku_next_to_a_long_history_is_learned() {
    let sales: Vec<f64> = (0..400).map(|i| 5.0 + (i % 7) as f64).collect();
    let mut rows = common::series("S1", "P1", &sales);
    let mut late = common::series("S1", "P2", &sales[..100]);
    for row in &mut late {
        row.date += chrono::Duration::days(300);
    }
    rows.extend(late);

    let mut model = forecaster();
    let table = model
        .engineer()
        .build(&demand_forecast::Dataset::from_rows(rows))
        .unwrap();
    assert_eq!(table.optional_columns(), ["lag_364".to_string()]);
    model.train(&table).unwrap();

    // P1 alone has at most 399 rows with a next-day target
    let scored = model.score(&table, Horizon::Day1).unwrap();
    assert!(scored.len() > 400);
}
