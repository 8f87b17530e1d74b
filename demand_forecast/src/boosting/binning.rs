//! Quantile binning of feature columns

use super::FeatureMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-feature split thresholds learned from the training matrix
///
/// A value lands in bin `b` when it is greater than the first `b`
/// thresholds and not greater than the rest. `NaN` always lands in the
/// last bin, which sits to the right of every threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BinMapper {
    thresholds: Vec<Vec<f64>>,
}

impl BinMapper {
    pub(crate) fn fit(matrix: &FeatureMatrix, max_bins: usize) -> Self {
        let thresholds = (0..matrix.n_cols())
            .into_par_iter()
            .map(|col| {
                let mut values: Vec<f64> = (0..matrix.n_rows())
                    .map(|row| matrix.get(row, col))
                    .filter(|v| !v.is_nan())
                    .collect();
                values.sort_by(f64::total_cmp);
                feature_thresholds(&values, max_bins)
            })
            .collect();

        Self { thresholds }
    }

    /// Number of candidate split points for a feature
    pub(crate) fn n_thresholds(&self, feature: usize) -> usize {
        self.thresholds[feature].len()
    }

    pub(crate) fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.thresholds[feature][bin]
    }

    pub(crate) fn bin(&self, feature: usize, value: f64) -> u16 {
        let thresholds = &self.thresholds[feature];
        if value.is_nan() {
            return thresholds.len() as u16;
        }
        thresholds.partition_point(|t| *t < value) as u16
    }

    /// Bin every cell of the matrix, row-major
    pub(crate) fn bin_matrix(&self, matrix: &FeatureMatrix) -> BinnedMatrix {
        let n_cols = matrix.n_cols();
        let mut data = vec![0u16; matrix.n_rows() * n_cols];
        data.par_chunks_mut(n_cols.max(1))
            .enumerate()
            .for_each(|(row, chunk)| {
                for (col, cell) in chunk.iter_mut().enumerate() {
                    *cell = self.bin(col, matrix.get(row, col));
                }
            });
        BinnedMatrix { data, n_cols }
    }
}

fn feature_thresholds(sorted: &[f64], max_bins: usize) -> Vec<f64> {
    let mut uniques = sorted.to_vec();
    uniques.dedup();
    if uniques.len() < 2 {
        return Vec::new();
    }

    if uniques.len() <= max_bins {
        return uniques.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    }

    let max_value = uniques[uniques.len() - 1];
    let mut thresholds: Vec<f64> = (1..max_bins)
        .map(|q| sorted[q * sorted.len() / max_bins])
        .filter(|t| *t < max_value)
        .collect();
    thresholds.dedup();
    thresholds
}

/// Bin indices of a training matrix
#[derive(Debug, Clone)]
pub(crate) struct BinnedMatrix {
    data: Vec<u16>,
    n_cols: usize,
}

impl BinnedMatrix {
    #[inline]
    pub(crate) fn get(&self, row: usize, col: usize) -> usize {
        self.data[row * self.n_cols + col] as usize
    }
}
