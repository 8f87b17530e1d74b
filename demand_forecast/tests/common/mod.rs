#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use demand_forecast::boosting::BoostingParams;
use demand_forecast::data::{Context, Dataset, FeatureValue, Observation};
use demand_forecast::synthetic::{generate_dataset, SyntheticConfig};
use demand_forecast::PipelineConfig;

/// Small ensembles so tests stay quick
pub fn fast_params() -> BoostingParams {
    BoostingParams {
        n_estimators: 30,
        max_depth: 3,
        learning_rate: 0.3,
        max_bins: 32,
        ..BoostingParams::default()
    }
}

pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        holdout_days: 14,
        predict_timeout_ms: 10_000,
        imputer: fast_params(),
        forecaster: fast_params(),
        lead_time: fast_params(),
        ..PipelineConfig::default()
    }
}

pub fn synthetic(stores: usize, skus: usize, days: usize, seed: u64) -> Dataset {
    generate_dataset(&SyntheticConfig {
        stores,
        skus,
        days,
        seed,
        ..SyntheticConfig::default()
    })
    .unwrap()
}

pub fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(offset)
}

/// One daily series with the given sales
pub fn series(store: &str, sku: &str, sales: &[f64]) -> Vec<Observation> {
    sales
        .iter()
        .enumerate()
        .map(|(i, units)| {
            let mut row = Observation::new(day(i as i64), store, sku);
            row.units_sold = *units;
            row.list_price = 2.5;
            row.category = "dairy".to_string();
            row.lead_time_days = Some(3.0);
            row
        })
        .collect()
}

pub fn identity_context(store: &str, sku: &str) -> Context {
    let mut context = Context::new();
    context.insert("store_id".to_string(), FeatureValue::from(store));
    context.insert("sku_id".to_string(), FeatureValue::from(sku));
    context
}
