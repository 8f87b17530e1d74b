//! Sales observations and their loaders
//!
//! One [`Observation`] is a (date, store, SKU) row of the sales fact table.
//! Calendar fields are derived from the date so they can never disagree with
//! it. Tables are read through polars and converted into typed rows.

use crate::error::{ForecastError, Result};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::File;
use std::path::Path;

/// Columns that must be present in every raw dataset
pub const REQUIRED_COLUMNS: [&str; 5] = ["date", "store_id", "sku_id", "units_sold", "stock_out_flag"];

/// Text-valued attributes of an observation
pub const CATEGORICAL_FIELDS: [&str; 10] = [
    "store_id",
    "sku_id",
    "category",
    "brand",
    "country",
    "city",
    "channel",
    "sku_name",
    "subcategory",
    "supplier_id",
];

const NUMERIC_SOURCE_FIELDS: [&str; 15] = [
    "is_weekend",
    "is_holiday",
    "temperature",
    "rain_mm",
    "list_price",
    "discount_pct",
    "promo_flag",
    "stock_opening",
    "stock_on_hand",
    "stock_out_flag",
    "latitude",
    "longitude",
    "units_sold",
    "lead_time_days",
    "adjusted_demand",
];

/// A single feature value supplied at prediction time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl FeatureValue {
    /// Numeric view; text is parsed, flags map to 0/1
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(v) => Some(*v),
            FeatureValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            FeatureValue::Text(s) => parse_number(s),
        }
    }

    /// Label view used for categorical encoding
    pub fn as_label(&self) -> String {
        match self {
            FeatureValue::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => {
                format!("{}", *v as i64)
            }
            FeatureValue::Number(v) => v.to_string(),
            FeatureValue::Flag(b) => b.to_string(),
            FeatureValue::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Text(value)
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Flag(value)
    }
}

/// Prediction input: feature name to value
pub type Context = BTreeMap<String, FeatureValue>;

fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => Some(1.0),
        "false" => Some(0.0),
        _ => trimmed.parse::<f64>().ok(),
    }
}

/// One (date, store, SKU) row of the sales fact table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub store_id: String,
    pub sku_id: String,
    pub category: String,
    pub brand: String,
    pub country: String,
    pub city: String,
    pub channel: String,
    pub sku_name: String,
    pub subcategory: String,
    pub supplier_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_weekend: bool,
    pub is_holiday: bool,
    pub temperature: f64,
    pub rain_mm: f64,
    pub list_price: f64,
    pub discount_pct: f64,
    pub promo_flag: bool,
    pub stock_opening: f64,
    pub stock_on_hand: f64,
    pub stock_out_flag: bool,
    pub units_sold: f64,
    pub lead_time_days: Option<f64>,
    /// Latent demand estimate; filled by the imputer
    pub adjusted_demand: Option<f64>,
}

impl Observation {
    /// Create a row with empty attributes and zero sales
    pub fn new(date: NaiveDate, store_id: impl Into<String>, sku_id: impl Into<String>) -> Self {
        Self {
            date,
            store_id: store_id.into(),
            sku_id: sku_id.into(),
            category: String::new(),
            brand: String::new(),
            country: String::new(),
            city: String::new(),
            channel: String::new(),
            sku_name: String::new(),
            subcategory: String::new(),
            supplier_id: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            is_weekend: date.weekday().num_days_from_monday() >= 5,
            is_holiday: false,
            temperature: 0.0,
            rain_mm: 0.0,
            list_price: 0.0,
            discount_pct: 0.0,
            promo_flag: false,
            stock_opening: 0.0,
            stock_on_hand: 0.0,
            stock_out_flag: false,
            units_sold: 0.0,
            lead_time_days: None,
            adjusted_demand: None,
        }
    }

    /// Day of week with Monday = 0
    pub fn weekday(&self) -> u32 {
        self.date.weekday().num_days_from_monday()
    }

    /// Numeric attribute by column name, including derived calendar fields
    pub fn numeric(&self, name: &str) -> Option<f64> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let value = match name {
            "year" => self.date.year() as f64,
            "month" => self.date.month() as f64,
            "day" => self.date.day() as f64,
            "weekday" => self.weekday() as f64,
            "weekofyear" => self.date.iso_week().week() as f64,
            "dayofyear" => self.date.ordinal() as f64,
            "is_weekend" => flag(self.is_weekend),
            "is_holiday" => flag(self.is_holiday),
            "temperature" => self.temperature,
            "rain_mm" => self.rain_mm,
            "list_price" => self.list_price,
            "discount_pct" => self.discount_pct,
            "promo_flag" => flag(self.promo_flag),
            "stock_opening" => self.stock_opening,
            "stock_on_hand" => self.stock_on_hand,
            "stock_out_flag" => flag(self.stock_out_flag),
            "latitude" => self.latitude,
            "longitude" => self.longitude,
            "units_sold" => self.units_sold,
            "lead_time_days" => return self.lead_time_days,
            "adjusted_demand" => return self.adjusted_demand,
            _ => return None,
        };
        Some(value)
    }

    /// Categorical attribute by column name
    pub fn categorical(&self, name: &str) -> Option<&str> {
        let value = match name {
            "store_id" => &self.store_id,
            "sku_id" => &self.sku_id,
            "category" => &self.category,
            "brand" => &self.brand,
            "country" => &self.country,
            "city" => &self.city,
            "channel" => &self.channel,
            "sku_name" => &self.sku_name,
            "subcategory" => &self.subcategory,
            "supplier_id" => &self.supplier_id,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Build a prediction context from the named fields of this row
    pub fn context(&self, fields: &[&str]) -> Context {
        fields
            .iter()
            .filter_map(|&name| {
                let value = match self.categorical(name) {
                    Some(label) => FeatureValue::Text(label.to_string()),
                    None => FeatureValue::Number(self.numeric(name)?),
                };
                Some((name.to_string(), value))
            })
            .collect()
    }
}

/// A set of observations plus the source columns they were read from
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    rows: Vec<Observation>,
    columns: BTreeSet<String>,
}

impl Dataset {
    /// Wrap in-memory rows; every column counts as present
    pub fn from_rows(rows: Vec<Observation>) -> Self {
        let columns = std::iter::once("date")
            .chain(CATEGORICAL_FIELDS)
            .chain(NUMERIC_SOURCE_FIELDS)
            .map(str::to_string)
            .collect();
        Self { rows, columns }
    }

    /// Wrap rows read from a table that carried only `columns`
    pub fn with_columns(rows: Vec<Observation>, columns: BTreeSet<String>) -> Self {
        Self { rows, columns }
    }

    /// Fail with the first column of `required` that the source lacked
    pub fn require_columns(&self, required: &[&str]) -> Result<()> {
        match required.iter().find(|c| !self.columns.contains(**c)) {
            Some(missing) => Err(ForecastError::MissingColumn(missing.to_string())),
            None => Ok(()),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    /// Fail on the first row repeating an earlier (date, store, SKU) key
    pub fn require_unique_keys(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.rows.len());
        for (row, obs) in self.rows.iter().enumerate() {
            if !seen.insert((obs.date, obs.store_id.as_str(), obs.sku_id.as_str())) {
                return Err(ForecastError::DuplicateKey {
                    row,
                    date: obs.date,
                    store_id: obs.store_id.clone(),
                    sku_id: obs.sku_id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Observation] {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<Observation> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn min_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).min()
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).max()
    }

    /// Split into rows dated before `cutoff` and rows on or after it
    pub fn split_at_date(&self, cutoff: NaiveDate) -> (Dataset, Dataset) {
        let (before, after): (Vec<_>, Vec<_>) =
            self.rows.iter().cloned().partition(|r| r.date < cutoff);
        (
            Dataset::with_columns(before, self.columns.clone()),
            Dataset::with_columns(after, self.columns.clone()),
        )
    }

    /// Export identity, sales and adjusted demand columns
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let dates: Vec<String> = self.rows.iter().map(|r| r.date.to_string()).collect();
        let stores: Vec<String> = self.rows.iter().map(|r| r.store_id.clone()).collect();
        let skus: Vec<String> = self.rows.iter().map(|r| r.sku_id.clone()).collect();
        let units: Vec<f64> = self.rows.iter().map(|r| r.units_sold).collect();
        let stock_out: Vec<bool> = self.rows.iter().map(|r| r.stock_out_flag).collect();
        let adjusted: Vec<Option<f64>> = self.rows.iter().map(|r| r.adjusted_demand).collect();

        let df = DataFrame::new(vec![
            Series::new("date", dates),
            Series::new("store_id", stores),
            Series::new("sku_id", skus),
            Series::new("units_sold", units),
            Series::new("stock_out_flag", stock_out),
            Series::new("adjusted_demand", adjusted),
        ])?;
        Ok(df)
    }
}

/// Data loader for sales fact tables
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load observations from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Dataset> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;

        Self::from_dataframe(&df)
    }

    /// Convert a DataFrame into typed observations
    pub fn from_dataframe(df: &DataFrame) -> Result<Dataset> {
        let columns: BTreeSet<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        for required in REQUIRED_COLUMNS {
            if !columns.contains(required) {
                return Err(ForecastError::MissingColumn(required.to_string()));
            }
        }

        let height = df.height();
        let dates = Self::date_column(df, "date")?;

        let mut text: BTreeMap<&str, Vec<Option<String>>> = BTreeMap::new();
        for name in CATEGORICAL_FIELDS {
            text.insert(name, Self::text_column(df, name, height)?);
        }
        let mut numbers: BTreeMap<&str, Vec<Option<f64>>> = BTreeMap::new();
        for name in NUMERIC_SOURCE_FIELDS {
            numbers.insert(name, Self::numeric_column(df, name, height)?);
        }

        let label = |name: &str, row: usize| -> String {
            text.get(name)
                .and_then(|col| col[row].clone())
                .unwrap_or_default()
        };
        let number = |name: &str, row: usize| -> Option<f64> {
            numbers.get(name).and_then(|col| col[row])
        };

        let mut rows = Vec::with_capacity(height);
        for (i, date) in dates.into_iter().enumerate() {
            let units_sold = number("units_sold", i).ok_or_else(|| {
                ForecastError::DataError(format!("units_sold is missing in row {}", i))
            })?;
            let stock_out = number("stock_out_flag", i).ok_or_else(|| {
                ForecastError::DataError(format!("stock_out_flag is missing in row {}", i))
            })?;

            let mut row = Observation::new(date, label("store_id", i), label("sku_id", i));
            row.category = label("category", i);
            row.brand = label("brand", i);
            row.country = label("country", i);
            row.city = label("city", i);
            row.channel = label("channel", i);
            row.sku_name = label("sku_name", i);
            row.subcategory = label("subcategory", i);
            row.supplier_id = label("supplier_id", i);
            row.latitude = number("latitude", i).unwrap_or(0.0);
            row.longitude = number("longitude", i).unwrap_or(0.0);
            if let Some(weekend) = number("is_weekend", i) {
                row.is_weekend = weekend != 0.0;
            }
            row.is_holiday = number("is_holiday", i).unwrap_or(0.0) != 0.0;
            row.temperature = number("temperature", i).unwrap_or(0.0);
            row.rain_mm = number("rain_mm", i).unwrap_or(0.0);
            row.list_price = number("list_price", i).unwrap_or(0.0);
            row.discount_pct = number("discount_pct", i).unwrap_or(0.0);
            row.promo_flag = number("promo_flag", i).unwrap_or(0.0) != 0.0;
            row.stock_opening = number("stock_opening", i).unwrap_or(0.0);
            row.stock_on_hand = number("stock_on_hand", i).unwrap_or(0.0);
            row.stock_out_flag = stock_out != 0.0;
            row.units_sold = units_sold;
            row.lead_time_days = number("lead_time_days", i);
            row.adjusted_demand = number("adjusted_demand", i);
            rows.push(row);
        }

        let dataset = Dataset::with_columns(rows, columns);
        dataset.require_unique_keys()?;
        Ok(dataset)
    }

    fn date_column(df: &DataFrame, name: &str) -> Result<Vec<NaiveDate>> {
        let series = df.column(name)?;
        let as_text = series.cast(&DataType::Utf8)?;
        as_text
            .utf8()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                let raw = value.unwrap_or_default();
                raw.get(..10)
                    .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
                    .ok_or_else(|| ForecastError::InvalidDate {
                        row,
                        value: raw.to_string(),
                    })
            })
            .collect()
    }

    fn text_column(df: &DataFrame, name: &str, height: usize) -> Result<Vec<Option<String>>> {
        let Ok(series) = df.column(name) else {
            return Ok(vec![None; height]);
        };
        let as_text = series.cast(&DataType::Utf8)?;
        let values = as_text
            .utf8()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect();
        Ok(values)
    }

    fn numeric_column(df: &DataFrame, name: &str, height: usize) -> Result<Vec<Option<f64>>> {
        let Ok(series) = df.column(name) else {
            return Ok(vec![None; height]);
        };

        match series.dtype() {
            DataType::Utf8 => Ok(series
                .utf8()?
                .into_iter()
                .map(|v| v.and_then(parse_number))
                .collect()),
            DataType::Boolean => Ok(series
                .bool()?
                .into_iter()
                .map(|v| v.map(|b| if b { 1.0 } else { 0.0 }))
                .collect()),
            _ => {
                let as_float = series.cast(&DataType::Float64)?;
                let values = as_float.f64()?.into_iter().collect();
                Ok(values)
            }
        }
    }
}
