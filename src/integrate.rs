//! Trapezoidal quadrature over sampled profiles.

use crate::errors::*;
use ndarray::{Array1, ArrayView1};

fn check_nodes(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
    if x.len() != y.len() {
        return Err(WhamError::ArrayLengthMismatch(y.len(), x.len()));
    }
    if x.len() < 2 {
        return Err(WhamError::Integration(format!(
            "the trapezoidal rule needs at least two nodes, got {}",
            x.len()
        )));
    }
    Ok(())
}

/// Integrate `y(x)` with the trapezoidal rule
///
/// `x` need not be increasing; a decreasing grid yields the integral with the opposite sign.
pub fn trapz(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Result<f64> {
    check_nodes(x, y)?;
    Ok((1..x.len())
        .map(|i| 0.5 * (x[i] - x[i - 1]) * (y[i] + y[i - 1]))
        .sum())
}

/// Running trapezoidal integral of `y(x)`, starting at zero at `x[0]`
pub fn cumtrapz(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
    if x.len() != y.len() {
        return Err(WhamError::ArrayLengthMismatch(y.len(), x.len()));
    }
    let mut out = Array1::zeros(x.len());
    for i in 1..x.len() {
        out[i] = out[i - 1] + 0.5 * (x[i] - x[i - 1]) * (y[i] + y[i - 1]);
    }
    Ok(out)
}

/// Weight of every node in the trapezoidal sum
///
/// Interior nodes carry half the width of the two neighbouring intervals, the end nodes half the
/// width of the single interval they bound.
pub fn node_weights(x: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = x.len();
    Array1::from_shape_fn(n, |i| {
        if n < 2 {
            0.0
        } else if i == 0 {
            0.5 * (x[1] - x[0])
        } else if i == n - 1 {
            0.5 * (x[n - 1] - x[n - 2])
        } else {
            0.5 * (x[i + 1] - x[i - 1])
        }
    })
}

/// Integrate `y(x)` and propagate the independent uncertainties `sigma` of the integrand
///
/// Returns the integral and its standard error `sqrt(Σ (w_i σ_i)²)`, with `w_i` the
/// [`node_weights`].
pub fn trapz_with_error(
    x: ArrayView1<'_, f64>,
    y: ArrayView1<'_, f64>,
    sigma: ArrayView1<'_, f64>,
) -> Result<(f64, f64)> {
    check_nodes(x, y)?;
    if sigma.len() != y.len() {
        return Err(WhamError::ArrayLengthMismatch(sigma.len(), y.len()));
    }
    let integral = trapz(x, y)?;
    let variance: f64 = node_weights(x)
        .iter()
        .zip(sigma.iter())
        .map(|(w, s)| (w * s).powi(2))
        .sum();
    Ok((integral, variance.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn linear_function_is_exact() {
        let x: Array1<f64> = Array1::linspace(0.0, 2.0, 5);
        let y = x.mapv(|v| 3.0 * v + 1.0);
        assert_abs_diff_eq!(trapz(x.view(), y.view()).unwrap(), 8.0, epsilon = 1e-12);
    }

    #[test]
    fn reversed_grid_flips_sign() {
        let x = array![2.0, 1.0, 0.0];
        let y = array![1.0, 1.0, 1.0];
        assert_abs_diff_eq!(trapz(x.view(), y.view()).unwrap(), -2.0);
    }

    #[test]
    fn one_node_is_an_error() {
        let x = array![1.0];
        assert!(matches!(
            trapz(x.view(), x.view()),
            Err(WhamError::Integration(_))
        ));
        assert!(trapz(array![0.0, 1.0].view(), x.view()).is_err());
    }

    #[test]
    fn running_integral_ends_at_total() {
        let x = array![0.0, 0.5, 1.5, 3.0];
        let y = array![1.0, 2.0, 0.0, 4.0];
        let running = cumtrapz(x.view(), y.view()).unwrap();
        assert_eq!(running[0], 0.0);
        assert_abs_diff_eq!(running[1], 0.75);
        assert_abs_diff_eq!(running[3], trapz(x.view(), y.view()).unwrap());
    }

    #[test]
    fn weights_sum_to_range() {
        let x = array![0.0, 0.1, 0.4, 1.0];
        let w = node_weights(x.view());
        assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w[0], 0.05);
        assert_abs_diff_eq!(w[1], 0.2);
        assert_abs_diff_eq!(w[3], 0.3);
    }

    #[test]
    fn uniform_error_propagation() {
        let x: Array1<f64> = Array1::linspace(0.0, 1.0, 3);
        let y = array![1.0, 1.0, 1.0];
        let sigma = array![0.2, 0.2, 0.2];
        let (value, err) = trapz_with_error(x.view(), y.view(), sigma.view()).unwrap();
        assert_abs_diff_eq!(value, 1.0);
        // weights 0.25, 0.5, 0.25
        assert_abs_diff_eq!(err, 0.2 * (0.0625_f64 + 0.25 + 0.0625).sqrt(), epsilon = 1e-12);

        let (_, none) = trapz_with_error(x.view(), y.view(), Array1::<f64>::zeros(3).view()).unwrap();
        assert_eq!(none, 0.0);
    }
}
