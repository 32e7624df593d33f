//! Cubic spline interpolation of tabulated profiles.

use crate::errors::*;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1};

/// A not-a-knot cubic spline through a set of points
///
/// With four or more knots the third derivative is continuous across the second and the
/// second-to-last knot. Three knots give the interpolating parabola and two a straight line.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Array1<f64>,
    y: Array1<f64>,
    /// Second derivative at every knot
    m: Array1<f64>,
}

impl CubicSpline {
    /// Fit the spline through `(x[i], y[i])`; `x` must be strictly increasing
    pub fn new(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(WhamError::ArrayLengthMismatch(y.len(), x.len()));
        }
        let n = x.len();
        if n < 2 {
            return Err(WhamError::Integration(format!(
                "a spline needs at least two knots, got {}",
                n
            )));
        }
        if (1..n).any(|i| !(x[i] > x[i - 1])) {
            return Err(WhamError::Integration(
                "spline knots must be strictly increasing".to_string(),
            ));
        }

        let m = match n {
            2 => Array1::zeros(2),
            3 => {
                let d0 = (y[1] - y[0]) / (x[1] - x[0]);
                let d1 = (y[2] - y[1]) / (x[2] - x[1]);
                let curvature = 2.0 * (d1 - d0) / (x[2] - x[0]);
                Array1::from_elem(3, curvature)
            }
            _ => Self::second_derivatives(x, y)?,
        };

        Ok(Self {
            x: x.to_owned(),
            y: y.to_owned(),
            m,
        })
    }

    fn second_derivatives(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        let n = x.len();
        let h: Vec<f64> = (1..n).map(|i| x[i] - x[i - 1]).collect();
        let mut a = DMatrix::<f64>::zeros(n, n);
        let mut b = DVector::<f64>::zeros(n);

        a[(0, 0)] = h[1];
        a[(0, 1)] = -(h[0] + h[1]);
        a[(0, 2)] = h[0];
        for i in 1..n - 1 {
            a[(i, i - 1)] = h[i - 1];
            a[(i, i)] = 2.0 * (h[i - 1] + h[i]);
            a[(i, i + 1)] = h[i];
            b[i] = 6.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);
        }
        a[(n - 1, n - 3)] = h[n - 2];
        a[(n - 1, n - 2)] = -(h[n - 3] + h[n - 2]);
        a[(n - 1, n - 1)] = h[n - 3];

        let m = a
            .lu()
            .solve(&b)
            .ok_or_else(|| WhamError::Integration("spline system is singular".to_string()))?;
        Ok(m.iter().copied().collect())
    }

    /// Smallest and largest knot
    pub fn range(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    /// Value of the spline at `z`, which must lie within [`CubicSpline::range`]
    pub fn eval(&self, z: f64) -> Result<f64> {
        let (min, max) = self.range();
        if !(z >= min && z <= max) {
            return Err(WhamError::Interpolation { z, min, max });
        }
        let n = self.x.len();
        // Interval [x[i], x[i + 1]] holding z; the last knot belongs to the last interval
        let i = self.x.iter().take_while(|&&k| k <= z).count().clamp(1, n - 1) - 1;

        let (x0, x1) = (self.x[i], self.x[i + 1]);
        let (m0, m1) = (self.m[i], self.m[i + 1]);
        let h = x1 - x0;
        let (left, right) = (x1 - z, z - x0);
        Ok(m0 * left.powi(3) / (6.0 * h)
            + m1 * right.powi(3) / (6.0 * h)
            + (self.y[i] / h - m0 * h / 6.0) * left
            + (self.y[i + 1] / h - m1 * h / 6.0) * right)
    }

    /// Evaluate the spline at every point of `z`
    pub fn eval_many(&self, z: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        let values = z.iter().map(|&v| self.eval(v)).collect::<Result<Vec<f64>>>()?;
        Ok(Array1::from(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn cubic_is_reproduced() {
        let x = array![0.0, 0.5, 1.5, 2.0, 3.0, 4.5];
        let f = |v: f64| v.powi(3) - 2.0 * v * v + 0.5;
        let spline = CubicSpline::new(x.view(), x.mapv(f).view()).unwrap();
        for &z in &[0.0, 0.2, 1.1, 2.7, 4.5] {
            assert_abs_diff_eq!(spline.eval(z).unwrap(), f(z), epsilon = 1e-9);
        }
    }

    #[test]
    fn knots_are_interpolated() {
        let x = array![0.0, 1.0, 2.0, 3.0, 4.0];
        let y = array![1.0, 3.0, 2.0, 5.0, 4.0];
        let spline = CubicSpline::new(x.view(), y.view()).unwrap();
        let at_knots = spline.eval_many(x.view()).unwrap();
        for (a, b) in at_knots.iter().zip(y.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn three_knots_give_a_parabola() {
        let x = array![0.0, 1.0, 3.0];
        let spline = CubicSpline::new(x.view(), x.mapv(|v| v * v).view()).unwrap();
        assert_abs_diff_eq!(spline.eval(2.0).unwrap(), 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(spline.eval(0.5).unwrap(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn two_knots_give_a_line() {
        let spline = CubicSpline::new(array![0.0, 2.0].view(), array![1.0, 5.0].view()).unwrap();
        assert_abs_diff_eq!(spline.eval(0.5).unwrap(), 2.0);
    }

    #[test]
    fn outside_range_is_an_error() {
        let spline = CubicSpline::new(array![0.0, 2.0].view(), array![1.0, 5.0].view()).unwrap();
        assert!(matches!(
            spline.eval(2.5),
            Err(WhamError::Interpolation { .. })
        ));
    }

    #[test]
    fn unordered_knots_are_rejected() {
        assert!(CubicSpline::new(array![0.0, 2.0, 1.0].view(), array![0.0, 0.0, 0.0].view())
            .is_err());
    }
}
