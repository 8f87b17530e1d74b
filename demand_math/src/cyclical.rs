//! Cyclical encodings for calendar fields

use std::f64::consts::PI;

/// Encode a periodic value as a point on the unit circle
///
/// Returns `(sin, cos)` of `2π · value / period`, so the last value of a
/// cycle sits next to the first one.
pub fn cyclical_encode(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * value / period;
    (angle.sin(), angle.cos())
}
