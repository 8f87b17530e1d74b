//! Seeded synthetic sales data
//!
//! Generates daily rows for a grid of stores and SKUs with weekly
//! seasonality, promotions, Poisson noise, censored stock-out days and
//! supplier lead times. The same config always produces the same rows.

use crate::data::{Dataset, Observation};
use crate::error::{ForecastError, Result};
use chrono::{Datelike, Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};
use serde::{Deserialize, Serialize};

const CATEGORIES: [(&str, &str); 3] = [
    ("beverages", "soft drinks"),
    ("dairy", "yogurt"),
    ("snacks", "chips"),
];
const CITIES: [(&str, f64, f64); 3] = [
    ("Lisbon", 38.72, -9.14),
    ("Porto", 41.15, -8.61),
    ("Braga", 41.55, -8.42),
];
const CHANNELS: [&str; 2] = ["hypermarket", "convenience"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub stores: usize,
    pub skus: usize,
    pub days: usize,
    pub start_date: NaiveDate,
    /// Probability that a day is a stock-out
    pub stock_out_rate: f64,
    /// Probability that a day runs a promotion
    pub promo_rate: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            stores: 2,
            skus: 3,
            days: 120,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            stock_out_rate: 0.05,
            promo_rate: 0.1,
            seed: 7,
        }
    }
}

fn invalid<E: std::fmt::Display>(err: E) -> ForecastError {
    ForecastError::InvalidParameter(err.to_string())
}

/// Generate a dataset following `config`
pub fn generate_dataset(config: &SyntheticConfig) -> Result<Dataset> {
    for (name, rate) in [("stock_out_rate", config.stock_out_rate), ("promo_rate", config.promo_rate)] {
        if !(0.0..=1.0).contains(&rate) {
            return Err(ForecastError::InvalidParameter(format!(
                "{} must be in [0, 1], got {}",
                name, rate
            )));
        }
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let base_demand: Vec<f64> = (0..config.skus).map(|_| rng.gen_range(4.0..30.0)).collect();
    let base_price: Vec<f64> = (0..config.skus).map(|_| rng.gen_range(0.8..6.0)).collect();
    let store_scale: Vec<f64> = (0..config.stores).map(|_| rng.gen_range(0.7..1.4)).collect();
    let supplier_lead: Vec<f64> = (0..config.skus).map(|_| rng.gen_range(2.0..9.0)).collect();
    let lead_noise = Normal::new(0.0, 0.8).map_err(invalid)?;
    let weather = Normal::new(0.0, 3.0).map_err(invalid)?;

    let mut rows = Vec::with_capacity(config.stores * config.skus * config.days);
    for day in 0..config.days {
        let date = config.start_date + Duration::days(day as i64);
        let season = (2.0 * std::f64::consts::PI * date.ordinal() as f64 / 365.0).sin();
        let temperature = 16.0 + 8.0 * season + weather.sample(&mut rng);
        let rain_mm = if rng.gen_bool(0.3) { rng.gen_range(0.5..20.0) } else { 0.0 };
        let is_holiday = (date.month(), date.day()) == (1, 1) || (date.month(), date.day()) == (12, 25);

        for store in 0..config.stores {
            let (city, latitude, longitude) = CITIES[store % CITIES.len()];
            for sku in 0..config.skus {
                let (category, subcategory) = CATEGORIES[sku % CATEGORIES.len()];
                let mut row = Observation::new(date, format!("S{}", store + 1), format!("P{}", sku + 1));
                row.category = category.to_string();
                row.subcategory = subcategory.to_string();
                row.brand = format!("BR{}", sku % 2 + 1);
                row.sku_name = format!("{} {}", subcategory, sku + 1);
                row.supplier_id = format!("SUP{}", sku % 2 + 1);
                row.country = "PT".to_string();
                row.city = city.to_string();
                row.channel = CHANNELS[store % CHANNELS.len()].to_string();
                row.latitude = latitude;
                row.longitude = longitude;
                row.is_holiday = is_holiday;
                row.temperature = temperature;
                row.rain_mm = rain_mm;

                row.promo_flag = rng.gen_bool(config.promo_rate);
                row.discount_pct = if row.promo_flag { rng.gen_range(0.1..0.35) } else { 0.0 };
                row.list_price = base_price[sku];

                let weekly = if row.is_weekend { 1.35 } else { 1.0 };
                let promo = 1.0 + 2.0 * row.discount_pct;
                let holiday = if is_holiday { 0.6 } else { 1.0 };
                let mean = base_demand[sku] * store_scale[store] * weekly * promo * holiday
                    * (1.0 + 0.1 * season);
                let latent = Poisson::new(mean.max(0.1)).map_err(invalid)?.sample(&mut rng);

                row.stock_opening = (latent * rng.gen_range(0.9..1.6)).round();
                row.stock_out_flag = rng.gen_bool(config.stock_out_rate);
                if row.stock_out_flag {
                    row.units_sold = (latent * rng.gen_range(0.2..0.8)).floor();
                    row.stock_on_hand = 0.0;
                } else {
                    row.units_sold = latent;
                    row.stock_on_hand = (row.stock_opening - latent).max(0.0);
                }

                let lead = supplier_lead[sku] + 0.5 * rain_mm.min(10.0) / 10.0 + lead_noise.sample(&mut rng);
                row.lead_time_days = Some(lead.round().max(1.0));
                rows.push(row);
            }
        }
    }

    Ok(Dataset::from_rows(rows))
}
