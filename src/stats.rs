//! Summary statistics over one-dimensional sample arrays.

use ndarray::ArrayView1;

/// Two-sided 99% quantile of the standard normal distribution
pub const Z_99: f64 = 2.58;

/// Arithmetic mean; `NaN` for an empty array
pub fn mean(data: ArrayView1<'_, f64>) -> f64 {
    data.sum() / data.len() as f64
}

/// Population variance (no Bessel correction)
pub fn variance(data: ArrayView1<'_, f64>) -> f64 {
    let m = mean(data);
    data.fold(0.0, |acc, &x| acc + (x - m) * (x - m)) / data.len() as f64
}

/// Population standard deviation
pub fn std(data: ArrayView1<'_, f64>) -> f64 {
    variance(data).sqrt()
}

/// The 99% confidence interval `mean ∓ 2.58·std`, assuming normality
pub fn confidence_99(data: ArrayView1<'_, f64>) -> (f64, f64) {
    let m = mean(data);
    let s = std(data);
    (m - Z_99 * s, m + Z_99 * s)
}
