//! Censored demand imputation
//!
//! Sales on stock-out days only bound demand from below. A count model is
//! fit on in-stock days and its prediction replaces the observed sales on
//! stock-out days whenever it is larger.

use crate::artifact::{fit_encoders, MissingFeatures, ModelArtifact, TargetTransform};
use crate::boosting::{BoostingParams, Objective};
use crate::data::{Dataset, Observation};
use crate::error::Result;
use serde::{Deserialize, Serialize};

pub const IMPUTER_FEATURES: [&str; 15] = [
    "year",
    "month",
    "day",
    "weekday",
    "is_weekend",
    "is_holiday",
    "temperature",
    "list_price",
    "discount_pct",
    "promo_flag",
    "store_id",
    "sku_id",
    "category",
    "brand",
    "stock_opening",
];

/// Outcome of one imputation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImputationSummary {
    pub in_stock_rows: usize,
    pub censored_rows: usize,
    /// Censored rows whose adjusted demand exceeds observed sales
    pub raised_rows: usize,
    /// Total demand added on censored rows
    pub recovered_units: f64,
}

#[derive(Debug, Clone)]
pub struct CensoredDemandImputer {
    params: BoostingParams,
    model: Option<ModelArtifact>,
}

impl CensoredDemandImputer {
    pub fn new(params: BoostingParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params, model: None })
    }

    /// Fill `adjusted_demand` on every row of `dataset`
    ///
    /// In-stock rows get their observed sales; stock-out rows get
    /// `max(predicted, units_sold)`. Raw sales and stock-out flags are left
    /// unchanged.
    pub fn train_and_impute(&mut self, dataset: &mut Dataset) -> Result<ImputationSummary> {
        dataset.require_columns(&["units_sold", "stock_out_flag"])?;
        tracing::info!(rows = dataset.len(), "Censored demand imputation started");

        let in_stock: Vec<Observation> = dataset
            .rows()
            .iter()
            .filter(|r| !r.stock_out_flag)
            .cloned()
            .collect();
        let censored = dataset.len() - in_stock.len();

        let mut summary = ImputationSummary {
            in_stock_rows: in_stock.len(),
            censored_rows: censored,
            ..ImputationSummary::default()
        };

        if censored == 0 {
            for row in dataset.rows_mut() {
                row.adjusted_demand = Some(row.units_sold);
            }
            tracing::info!("No stock-out rows; adjusted demand equals observed sales");
            return Ok(summary);
        }

        let features: Vec<String> = IMPUTER_FEATURES.iter().map(|s| s.to_string()).collect();
        let targets: Vec<f64> = in_stock.iter().map(|r| r.units_sold).collect();
        let encoders = fit_encoders(&in_stock, &features);
        let model = ModelArtifact::fit(
            &in_stock,
            &targets,
            features,
            encoders,
            Objective::Poisson,
            TargetTransform::Identity,
            &self.params,
            MissingFeatures::Keep,
        )?;

        let stock_out: Vec<Observation> = dataset
            .rows()
            .iter()
            .filter(|r| r.stock_out_flag)
            .cloned()
            .collect();
        let mut latent = model.predict_batch(&stock_out).into_iter();

        for row in dataset.rows_mut() {
            if !row.stock_out_flag {
                row.adjusted_demand = Some(row.units_sold);
                continue;
            }
            let predicted = latent.next().unwrap_or(row.units_sold);
            let adjusted = if predicted.is_finite() {
                predicted.max(row.units_sold)
            } else {
                row.units_sold
            };
            if adjusted > row.units_sold {
                summary.raised_rows += 1;
                summary.recovered_units += adjusted - row.units_sold;
            }
            row.adjusted_demand = Some(adjusted);
        }

        tracing::info!(
            censored = summary.censored_rows,
            raised = summary.raised_rows,
            recovered_units = summary.recovered_units,
            "Censored demand imputation finished"
        );
        self.model = Some(model);
        Ok(summary)
    }

    /// Latent demand model from the last pass with stock-outs
    pub fn artifact(&self) -> Option<&ModelArtifact> {
        self.model.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn params() -> BoostingParams {
        BoostingParams {
            n_estimators: 30,
            max_depth: 3,
            ..BoostingParams::default()
        }
    }

    #[test]
    fn missing_stock_out_column_is_a_precondition_error() {
        let columns: BTreeSet<String> = ["date", "store_id", "sku_id", "units_sold"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut dataset = Dataset::with_columns(Vec::new(), columns);
        let err = CensoredDemandImputer::new(params())
            .unwrap()
            .train_and_impute(&mut dataset)
            .unwrap_err();
        assert!(err.is_precondition());
        assert!(matches!(err, ForecastError::MissingColumn(c) if c == "stock_out_flag"));
    }

    #[test]
    fn no_stock_outs_copies_sales() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows = (0..5)
            .map(|i| {
                let mut row = Observation::new(start + chrono::Duration::days(i), "S1", "P1");
                row.units_sold = i as f64;
                row
            })
            .collect();
        let mut dataset = Dataset::from_rows(rows);
        let summary = CensoredDemandImputer::new(params())
            .unwrap()
            .train_and_impute(&mut dataset)
            .unwrap();
        assert_eq!(summary.censored_rows, 0);
        assert!(dataset.rows().iter().all(|r| r.adjusted_demand == Some(r.units_sold)));
    }
}
