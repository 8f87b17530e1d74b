//! Temporal feature engineering
//!
//! Rows are ordered by (store, SKU, date) and every windowed feature is
//! computed inside one (store, SKU) series from values strictly before the
//! current row. Lag and window offsets are positional within the series.

use crate::artifact::FeatureSource;
use crate::data::{Context, Dataset, FeatureValue, Observation};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use demand_math::{cyclical_encode, ewma, expanding_mean, lead, rolling_max, rolling_mean, shift};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ops::Range;

/// Calendar encodings added to every table
pub const CYCLICAL_COLUMNS: [&str; 4] = ["month_sin", "month_cos", "weekday_sin", "weekday_cos"];

/// Windowed feature settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Demand lags in rows
    pub lags: Vec<usize>,
    /// Yearly lag, added only for long histories
    pub yearly_lag: usize,
    /// A series must span more days than this to get the yearly lag
    pub yearly_lag_min_span_days: i64,
    pub rolling_mean_windows: Vec<usize>,
    pub rolling_max_windows: Vec<usize>,
    pub ewma_alphas: Vec<f64>,
    /// Short and long rolling-mean windows compared by the momentum feature
    pub momentum_windows: (usize, usize),
    pub momentum_epsilon: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lags: vec![1, 2, 3, 7, 14, 21, 28],
            yearly_lag: 364,
            yearly_lag_min_span_days: 370,
            rolling_mean_windows: vec![3, 7, 14, 30],
            rolling_max_windows: vec![7, 14, 30],
            ewma_alphas: vec![0.1, 0.3],
            momentum_windows: (7, 14),
            momentum_epsilon: 1e-6,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lags.is_empty() || self.lags.contains(&0) {
            return Err(ForecastError::InvalidParameter(
                "lags must be a non-empty list of positive offsets".to_string(),
            ));
        }
        let mut windows = self.rolling_mean_windows.iter().chain(&self.rolling_max_windows);
        if windows.any(|w| *w == 0) {
            return Err(ForecastError::InvalidParameter(
                "rolling windows must be positive".to_string(),
            ));
        }
        if let Some(alpha) = self.ewma_alphas.iter().find(|a| !(**a > 0.0 && **a <= 1.0)) {
            return Err(ForecastError::InvalidParameter(format!(
                "ewma alpha must be in (0, 1], got {}",
                alpha
            )));
        }
        let (short, long) = self.momentum_windows;
        if !self.rolling_mean_windows.contains(&short) || !self.rolling_mean_windows.contains(&long) {
            return Err(ForecastError::InvalidParameter(format!(
                "momentum windows ({}, {}) must be rolling mean windows",
                short, long
            )));
        }
        let names = self.generated_names(true);
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        if unique.len() != names.len() {
            return Err(ForecastError::InvalidParameter(
                "feature settings produce duplicate column names".to_string(),
            ));
        }
        Ok(())
    }

    /// Names of the generated columns in creation order
    pub fn generated_names(&self, yearly: bool) -> Vec<String> {
        let mut names: Vec<String> = self.lag_offsets(yearly).iter().map(|l| format!("lag_{}", l)).collect();
        names.extend(self.rolling_mean_windows.iter().map(|w| format!("rolling_mean_{}", w)));
        names.extend(self.rolling_max_windows.iter().map(|w| format!("rolling_max_{}", w)));
        names.extend(self.ewma_alphas.iter().map(|a| ewma_name(*a)));
        names.push("promo_weekend".to_string());
        names.push("price_ratio".to_string());
        names.push(format!("momentum_{}_{}", self.momentum_windows.0, self.momentum_windows.1));
        names
    }

    /// Column of the yearly lag when it is not one of the regular lags
    pub fn yearly_lag_name(&self) -> Option<String> {
        (!self.lags.contains(&self.yearly_lag)).then(|| format!("lag_{}", self.yearly_lag))
    }

    fn lag_offsets(&self, yearly: bool) -> Vec<usize> {
        let mut lags = self.lags.clone();
        if yearly && !lags.contains(&self.yearly_lag) {
            lags.push(self.yearly_lag);
        }
        lags
    }
}

/// `0.1 -> ewma_1`, `0.3 -> ewma_3`, `0.05 -> ewma_05`
fn ewma_name(alpha: f64) -> String {
    let digits = alpha.to_string();
    format!("ewma_{}", digits.trim_start_matches("0.").replace('.', "_"))
}

/// Builds [`FeatureTable`]s from datasets
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer {
    config: FeatureConfig,
}

impl FeatureEngineer {
    pub fn new(config: FeatureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Sort rows and derive every calendar, lag, window and interaction column
    ///
    /// The demand series is `adjusted_demand`, falling back to `units_sold`
    /// for rows that were never imputed. A repeated (date, store, SKU) key
    /// would put a same-day value into the lags and is rejected.
    pub fn build(&self, dataset: &Dataset) -> Result<FeatureTable> {
        dataset.require_unique_keys()?;
        let mut rows = dataset.rows().to_vec();
        rows.sort_by(|a, b| {
            (a.store_id.as_str(), a.sku_id.as_str(), a.date).cmp(&(b.store_id.as_str(), b.sku_id.as_str(), b.date))
        });

        let groups = series_ranges(&rows);
        let long: Vec<bool> = groups.iter().map(|range| self.spans_year(&rows[range.clone()])).collect();
        let yearly = long.contains(&true);
        let generated = self.config.generated_names(yearly);
        let optional: Vec<String> = self.config.yearly_lag_name().filter(|_| yearly).into_iter().collect();

        let per_group: Vec<Vec<Vec<f64>>> = groups
            .par_iter()
            .zip(&long)
            .map(|(range, &spans)| self.series_columns(&rows[range.clone()], yearly, spans))
            .collect::<Result<_>>()?;

        let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (i, name) in generated.iter().enumerate() {
            let values = per_group.iter().flat_map(|group| group[i].iter().copied()).collect();
            columns.insert(name.clone(), values);
        }

        let mut cyclical = vec![Vec::with_capacity(rows.len()); CYCLICAL_COLUMNS.len()];
        for row in &rows {
            let (month_sin, month_cos) = cyclical_encode(row.numeric("month").unwrap_or(0.0), 12.0);
            let (weekday_sin, weekday_cos) = cyclical_encode(row.weekday() as f64, 7.0);
            for (column, value) in cyclical.iter_mut().zip([month_sin, month_cos, weekday_sin, weekday_cos]) {
                column.push(value);
            }
        }
        for (name, values) in CYCLICAL_COLUMNS.iter().zip(cyclical) {
            columns.insert(name.to_string(), values);
        }

        tracing::debug!(
            rows = rows.len(),
            series = groups.len(),
            yearly_series = long.iter().filter(|l| **l).count(),
            "Built feature table"
        );

        Ok(FeatureTable {
            rows,
            columns,
            generated,
            optional,
        })
    }

    /// Whether one sorted series is long enough for the yearly lag
    fn spans_year(&self, rows: &[Observation]) -> bool {
        match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => (last.date - first.date).num_days() > self.config.yearly_lag_min_span_days,
            _ => false,
        }
    }

    /// Generated columns of one (store, SKU) series, in `generated_names` order
    ///
    /// With `yearly` set the table carries the yearly lag column; it holds
    /// values only for `long` series and is `NaN` elsewhere.
    fn series_columns(&self, rows: &[Observation], yearly: bool, long: bool) -> Result<Vec<Vec<f64>>> {
        let demand: Vec<f64> = rows.iter().map(demand_of).collect();
        let previous = shift(&demand, 1);
        let mut out = Vec::new();

        for lag in self.config.lag_offsets(yearly) {
            let short_yearly = lag == self.config.yearly_lag && !self.config.lags.contains(&lag) && !long;
            if short_yearly {
                out.push(vec![f64::NAN; rows.len()]);
            } else {
                out.push(shift(&demand, lag));
            }
        }

        let mut means = BTreeMap::new();
        for &window in &self.config.rolling_mean_windows {
            let values = rolling_mean(&previous, window)?;
            means.insert(window, values.clone());
            out.push(values);
        }
        for &window in &self.config.rolling_max_windows {
            out.push(rolling_max(&previous, window)?);
        }
        for &alpha in &self.config.ewma_alphas {
            out.push(ewma(&previous, alpha)?);
        }

        out.push(
            rows.iter()
                .map(|r| if r.promo_flag && r.is_weekend { 1.0 } else { 0.0 })
                .collect(),
        );

        let prices: Vec<f64> = rows.iter().map(|r| r.list_price).collect();
        out.push(
            prices
                .iter()
                .zip(expanding_mean(&prices))
                .map(|(price, mean)| if mean == 0.0 { 1.0 } else { price / mean })
                .collect(),
        );

        let (short, long) = self.config.momentum_windows;
        let eps = self.config.momentum_epsilon;
        let momentum = match (means.get(&short), means.get(&long)) {
            (Some(s), Some(l)) => s.iter().zip(l).map(|(s, l)| s / (l + eps)).collect(),
            _ => vec![f64::NAN; rows.len()],
        };
        out.push(momentum);

        Ok(out)
    }
}

fn demand_of(row: &Observation) -> f64 {
    row.adjusted_demand.unwrap_or(row.units_sold)
}

/// Contiguous index ranges sharing one (store, SKU) key
fn series_ranges(rows: &[Observation]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for i in 1..=rows.len() {
        let boundary = i == rows.len()
            || rows[i].store_id != rows[start].store_id
            || rows[i].sku_id != rows[start].sku_id;
        if boundary {
            if start < i {
                ranges.push(start..i);
            }
            start = i;
        }
    }
    ranges
}

/// Observations sorted by (store, SKU, date) plus their derived columns
#[derive(Debug, Clone)]
pub struct FeatureTable {
    rows: Vec<Observation>,
    columns: BTreeMap<String, Vec<f64>>,
    generated: Vec<String>,
    optional: Vec<String>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    /// Lag, window and interaction columns created by the engineer
    pub fn generated_columns(&self) -> &[String] {
        &self.generated
    }

    /// Generated columns that may be missing on complete rows
    ///
    /// The yearly lag only exists for series spanning more than a year, so
    /// training keeps rows where it is `NaN`.
    pub fn optional_columns(&self) -> &[String] {
        &self.optional
    }

    /// A derived column by name
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Feature value of one row: derived columns first, then raw fields
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        match self.columns.get(name) {
            Some(values) => Some(values[row]),
            None => self.rows[row].numeric(name),
        }
    }

    pub fn row(&self, index: usize) -> TableRow<'_> {
        TableRow { table: self, index }
    }

    /// Every row as a feature source
    pub fn table_rows(&self) -> Vec<TableRow<'_>> {
        (0..self.len()).map(|index| self.row(index)).collect()
    }

    /// Demand `horizon` rows ahead within each series, `NaN` past its end
    pub fn target(&self, horizon: usize) -> Vec<f64> {
        series_ranges(&self.rows)
            .into_iter()
            .flat_map(|range| {
                let demand: Vec<f64> = self.rows[range].iter().map(demand_of).collect();
                lead(&demand, horizon)
            })
            .collect()
    }

    /// Rows dated before `cutoff` and rows on or after it
    ///
    /// Derived columns are kept as computed on the full table, so the later
    /// partition still sees lag history from before the cutoff.
    pub fn split_at_date(&self, cutoff: NaiveDate) -> (FeatureTable, FeatureTable) {
        let (before, after): (Vec<usize>, Vec<usize>) = (0..self.len()).partition(|&i| self.rows[i].date < cutoff);
        (self.select(&before), self.select(&after))
    }

    fn select(&self, indices: &[usize]) -> FeatureTable {
        FeatureTable {
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| (name.clone(), indices.iter().map(|&i| values[i]).collect()))
                .collect(),
            generated: self.generated.clone(),
            optional: self.optional.clone(),
        }
    }

    /// Prediction context holding the named features of one row
    pub fn context(&self, row: usize, features: &[String]) -> Context {
        let source = self.row(row);
        features
            .iter()
            .filter_map(|name| {
                let value = match source.label(name) {
                    Some(label) => FeatureValue::Text(label.into_owned()),
                    None => FeatureValue::Number(source.numeric(name)?),
                };
                Some((name.clone(), value))
            })
            .collect()
    }

    /// Index of the latest row of a (store, SKU) series
    pub fn latest_row(&self, store_id: &str, sku_id: &str) -> Option<usize> {
        self.rows
            .iter()
            .rposition(|r| r.store_id == store_id && r.sku_id == sku_id)
    }
}

/// One row of a [`FeatureTable`]
#[derive(Debug, Clone, Copy)]
pub struct TableRow<'a> {
    table: &'a FeatureTable,
    index: usize,
}

impl FeatureSource for TableRow<'_> {
    fn numeric(&self, name: &str) -> Option<f64> {
        self.table.value(self.index, name)
    }

    fn label(&self, name: &str) -> Option<Cow<'_, str>> {
        self.table.rows[self.index].categorical(name).map(Cow::Borrowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(store: &str, demand: &[f64]) -> Vec<Observation> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        demand
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let mut row = Observation::new(start + chrono::Duration::days(i as i64), store, "P1");
                row.units_sold = *d;
                row.list_price = 2.0;
                row
            })
            .collect()
    }

    #[test]
    fn lags_stay_inside_each_series() {
        let mut rows = series("S2", &[10.0, 11.0, 12.0]);
        rows.extend(series("S1", &[1.0, 2.0, 3.0]));
        let table = FeatureEngineer::default().build(&Dataset::from_rows(rows)).unwrap();

        let lag = table.column("lag_1").unwrap();
        assert_eq!(table.rows()[0].store_id, "S1");
        assert!(lag[0].is_nan());
        assert_eq!(lag[1], 1.0);
        assert!(lag[3].is_nan());
        assert_eq!(lag[4], 10.0);
    }

    #[test]
    fn rolling_mean_excludes_current_row() {
        let demand: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let table = FeatureEngineer::default().build(&Dataset::from_rows(series("S1", &demand))).unwrap();
        let mean = table.column("rolling_mean_3").unwrap();
        assert!(mean[2].is_nan());
        assert_eq!(mean[3], 2.0);
        assert_eq!(table.column("rolling_max_7").unwrap()[7], 7.0);
    }

    #[test]
    fn yearly_lag_needs_a_long_span() {
        let short = FeatureEngineer::default()
            .build(&Dataset::from_rows(series("S1", &[1.0; 100])))
            .unwrap();
        assert!(!short.generated_columns().contains(&"lag_364".to_string()));

        let long = FeatureEngineer::default()
            .build(&Dataset::from_rows(series("S1", &[1.0; 400])))
            .unwrap();
        assert!(long.generated_columns().contains(&"lag_364".to_string()));
    }

    #[test]
    fn yearly_lag_is_per_series() {
        let mut rows = series("S1", &[2.0; 400]);
        let mut late = series("S2", &[3.0; 100]);
        for row in &mut late {
            row.date += chrono::Duration::days(300);
        }
        rows.extend(late);
        let table = FeatureEngineer::default().build(&Dataset::from_rows(rows)).unwrap();

        assert_eq!(table.optional_columns(), ["lag_364".to_string()]);
        let lag = table.column("lag_364").unwrap();
        assert!(lag[363].is_nan());
        assert_eq!(lag[364], 2.0);
        assert!(lag[400..].iter().all(|v| v.is_nan()));
        // regular lags still fill the short series
        assert_eq!(table.column("lag_1").unwrap()[401], 3.0);
    }

    #[test]
    fn target_leads_within_series() {
        let mut rows = series("S1", &[1.0, 2.0, 3.0]);
        rows.extend(series("S2", &[7.0, 8.0]));
        let table = FeatureEngineer::default().build(&Dataset::from_rows(rows)).unwrap();
        let target = table.target(1);
        assert_eq!(target[0], 2.0);
        assert!(target[2].is_nan());
        assert_eq!(target[3], 8.0);
        assert!(target[4].is_nan());
    }

    #[test]
    fn interactions() {
        let mut rows = series("S1", &[1.0; 16]);
        rows[15].list_price = 4.0;
        let table = FeatureEngineer::default().build(&Dataset::from_rows(rows)).unwrap();
        let ratio = table.column("price_ratio").unwrap();
        assert_eq!(ratio[0], 1.0);
        assert!(ratio[15] > 1.0);
        assert!((table.column("momentum_7_14").unwrap()[15] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn ewma_names() {
        assert_eq!(ewma_name(0.1), "ewma_1");
        assert_eq!(ewma_name(0.3), "ewma_3");
        assert_eq!(ewma_name(0.05), "ewma_05");
    }

    #[test]
    fn split_keeps_history() {
        let demand: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let table = FeatureEngineer::default().build(&Dataset::from_rows(series("S1", &demand))).unwrap();
        let cutoff = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        let (train, test) = table.split_at_date(cutoff);
        assert_eq!(train.len(), 5);
        assert_eq!(test.column("lag_1").unwrap()[0], 5.0);
    }
}
