use demand_forecast::data::Dataset;
use demand_forecast::encoder::{CategoricalEncoder, UNSEEN_CODE};
use demand_forecast::features::{FeatureEngineer, FeatureTable};
use demand_forecast::ForecastError;
use proptest::prelude::*;

mod common;

fn same(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

fn generated_row(table: &FeatureTable, row: usize) -> Vec<f64> {
    table
        .generated_columns()
        .iter()
        .map(|name| table.value(row, name).unwrap())
        .collect()
}

#[test]
fn test_generated_columns() {
    let table = FeatureEngineer::default()
        .build(&Dataset::from_rows(common::series("S1", "P1", &[5.0; 60])))
        .unwrap();

    let expected = [
        "lag_1",
        "lag_28",
        "rolling_mean_30",
        "rolling_max_7",
        "ewma_1",
        "ewma_3",
        "promo_weekend",
        "price_ratio",
        "momentum_7_14",
    ];
    for name in expected {
        assert!(
            table.generated_columns().iter().any(|c| c == name),
            "missing {}",
            name
        );
    }
    for name in ["month_sin", "weekday_cos"] {
        assert!(table.column(name).is_some());
    }
}

#[test]
fn test_adjusted_demand_drives_features() {
    let mut rows = common::series("S1", "P1", &[2.0; 10]);
    rows[4].adjusted_demand = Some(9.0);
    let table = FeatureEngineer::default().build(&Dataset::from_rows(rows)).unwrap();
    assert_eq!(table.column("lag_1").unwrap()[5], 9.0);
}

#[test]
fn test_repeated_day_is_rejected() {
    let mut rows = common::series("S1", "P1", &[5.0; 40]);
    let mut repeat = rows[20].clone();
    repeat.units_sold = 99.0;
    rows.push(repeat);

    let err = FeatureEngineer::default()
        .build(&Dataset::from_rows(rows))
        .unwrap_err();
    assert!(matches!(err, ForecastError::DuplicateKey { row: 40, .. }));
}

#[test]
fn test_short_series_keep_regular_lags_next_to_a_long_one() {
    let sales: Vec<f64> = (0..400).map(|i| (i % 7) as f64 + 3.0).collect();
    let mut rows = common::series("S1", "P1", &sales);
    let mut late = common::series("S1", "P2", &sales[..100]);
    for row in &mut late {
        row.date += chrono::Duration::days(300);
    }
    rows.extend(late);

    let table = FeatureEngineer::default().build(&Dataset::from_rows(rows)).unwrap();
    let p2: Vec<usize> = (0..table.len()).filter(|&i| table.rows()[i].sku_id == "P2").collect();
    assert_eq!(p2.len(), 100);

    let complete = p2
        .iter()
        .filter(|&&i| {
            table
                .generated_columns()
                .iter()
                .filter(|name| !table.optional_columns().contains(name))
                .all(|name| !table.value(i, name).unwrap().is_nan())
        })
        .count();
    assert_eq!(complete, 70);
    assert!(p2.iter().all(|&i| table.value(i, "lag_364").unwrap().is_nan()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Rewriting or reordering rows after day `cut` never changes features at `cut`
    #[test]
    fn prop_no_look_ahead(
        sales in prop::collection::vec(0.0f64..50.0, 40..80),
        future in prop::collection::vec(0.0f64..500.0, 80),
        cut_fraction in 0.0f64..1.0,
        reverse in any::<bool>(),
    ) {
        let cut = ((sales.len() - 1) as f64 * cut_fraction) as usize;
        let engineer = FeatureEngineer::default();

        let mut other = common::series("S2", "P1", &sales);
        let mut rows = common::series("S1", "P1", &sales);
        rows.append(&mut other);
        let baseline = engineer.build(&Dataset::from_rows(rows.clone())).unwrap();

        for (i, row) in rows.iter_mut().enumerate() {
            let position = i % sales.len();
            if position > cut {
                row.units_sold = future[position];
                row.list_price = 1.0 + future[position];
            }
        }
        if reverse {
            rows.reverse();
        }
        let changed = engineer.build(&Dataset::from_rows(rows)).unwrap();

        // S1 rows come first after sorting
        let before = generated_row(&baseline, cut);
        let after = generated_row(&changed, cut);
        prop_assert!(before.iter().zip(&after).all(|(a, b)| same(*a, *b)));
    }

    #[test]
    fn prop_encoder_round_trip(
        labels in prop::collection::vec("[a-z]{1,6}", 1..20),
        unseen in "[A-Z]{1,6}",
    ) {
        let encoder = CategoricalEncoder::fit(&labels);
        for label in &labels {
            let code = encoder.transform(label);
            prop_assert!(code >= 0);
            prop_assert_eq!(encoder.inverse(code), Some(label.as_str()));
        }
        prop_assert_eq!(encoder.transform(&unseen), UNSEEN_CODE);
    }
}
