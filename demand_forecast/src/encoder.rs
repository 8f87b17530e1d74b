//! Label encoding for categorical columns

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Code assigned to labels that were not seen during fitting
pub const UNSEEN_CODE: i64 = -1;

/// Maps the labels of one categorical column to dense integer codes
///
/// Codes follow the lexicographic order of the distinct labels, so fitting
/// the same values in any order yields the same encoder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    classes: Vec<String>,
}

impl CategoricalEncoder {
    pub fn fit<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes: Vec<String> = values.into_iter().map(|v| v.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// Code of `label`, or [`UNSEEN_CODE`]
    pub fn transform(&self, label: &str) -> i64 {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_or(UNSEEN_CODE, |i| i as i64)
    }

    /// Label of a known code
    pub fn inverse(&self, code: i64) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|i| self.classes.get(i))
            .map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// One encoder per categorical column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSet {
    encoders: BTreeMap<String, CategoricalEncoder>,
}

impl EncoderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, encoder: CategoricalEncoder) {
        self.encoders.insert(column.into(), encoder);
    }

    pub fn get(&self, column: &str) -> Option<&CategoricalEncoder> {
        self.encoders.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.encoders.contains_key(column)
    }

    /// Encode a label of `column`; unknown columns and labels give [`UNSEEN_CODE`]
    pub fn encode(&self, column: &str, label: &str) -> i64 {
        self.encoders
            .get(column)
            .map_or(UNSEEN_CODE, |e| e.transform(label))
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_sorted_order() {
        let encoder = CategoricalEncoder::fit(["beverages", "dairy", "bakery", "dairy"]);
        assert_eq!(encoder.len(), 3);
        assert_eq!(encoder.transform("bakery"), 0);
        assert_eq!(encoder.transform("dairy"), 2);
        assert_eq!(encoder.inverse(1), Some("beverages"));
    }

    #[test]
    fn unseen_values_get_the_sentinel() {
        let encoder = CategoricalEncoder::fit(["a", "b"]);
        assert_eq!(encoder.transform("zzz"), UNSEEN_CODE);
        assert_eq!(encoder.inverse(UNSEEN_CODE), None);
        assert_eq!(encoder.inverse(7), None);
    }

    #[test]
    fn encoder_set_handles_unknown_columns() {
        let mut set = EncoderSet::new();
        set.insert("store_id", CategoricalEncoder::fit(["S1", "S2"]));
        assert_eq!(set.encode("store_id", "S2"), 1);
        assert_eq!(set.encode("brand", "S2"), UNSEEN_CODE);
    }
}
