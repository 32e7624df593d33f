//! Non-linear least squares.

use crate::errors::*;
use nalgebra::{DMatrix, DVector};
use ndarray::ArrayView1;

/// Levenberg–Marquardt fitting of a scalar model `f(x, p)` to data points
///
/// The Jacobian is approximated by forward differences and the damping follows Marquardt's
/// scaling by the diagonal of the normal matrix.
///
/// # Examples
///
/// ```
/// use ndarray::Array1;
/// use wham_rs::fit::LevenbergMarquardt;
///
/// let x: Array1<f64> = Array1::linspace(0.0, 10.0, 50);
/// let y = x.mapv(|v| 2.0 * (-v / 3.0).exp());
/// let p = LevenbergMarquardt::default()
///     .fit(|x, p| p[0] * (-x / p[1]).exp(), x.view(), y.view(), &[1.0, 1.0])
///     .unwrap();
/// assert!((p[1] - 3.0).abs() < 1e-6);
/// ```
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(build_fn(validate = "Self::validate", name = "build_inner", private))]
pub struct LevenbergMarquardt {
    /// Give up after this many iterations
    #[builder(default = "1000")]
    max_iterations: usize,

    /// Relative change in the cost or in the parameters that counts as converged
    #[builder(default = "1.0e-8")]
    tolerance: f64,

    /// Damping of the first step
    #[builder(default = "1.0e-3")]
    initial_damping: f64,
}

impl LevenbergMarquardtBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(tolerance) = self.tolerance {
            if !(tolerance > 0.0) {
                return Err(format!("tolerance must be positive, not {}", tolerance));
            }
        }
        if let Some(damping) = self.initial_damping {
            if !(damping > 0.0) {
                return Err(format!("initial_damping must be positive, not {}", damping));
            }
        }
        Ok(())
    }

    /// Build the fitter
    pub fn build(&self) -> Result<LevenbergMarquardt> {
        Ok(self.build_inner()?)
    }
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1.0e-8,
            initial_damping: 1.0e-3,
        }
    }
}

const MAX_DAMPING: f64 = 1.0e16;

impl LevenbergMarquardt {
    /// Get a new builder for the fitter
    pub fn builder() -> LevenbergMarquardtBuilder {
        LevenbergMarquardtBuilder::default()
    }

    /// Minimise `Σ (y - f(x, p))²` over `p`, starting from `guess`
    ///
    /// Fails with [`WhamError::CurveFit`] if the cost at the guess is not finite, the parameters
    /// become non-finite, or the iteration cap is reached.
    pub fn fit<F>(
        &self,
        model: F,
        x: ArrayView1<'_, f64>,
        y: ArrayView1<'_, f64>,
        guess: &[f64],
    ) -> Result<Vec<f64>>
    where
        F: Fn(f64, &[f64]) -> f64,
    {
        if x.len() != y.len() {
            return Err(WhamError::ArrayLengthMismatch(y.len(), x.len()));
        }
        let m = x.len();
        let k = guess.len();
        if m < k {
            return Err(WhamError::CurveFit(format!(
                "{} data points cannot determine {} parameters",
                m, k
            )));
        }

        let residuals = |p: &[f64]| DVector::from_fn(m, |j, _| y[j] - model(x[j], p));
        let mut params = guess.to_vec();
        let mut r = residuals(&params);
        let mut cost = r.norm_squared();
        if !cost.is_finite() {
            return Err(WhamError::CurveFit(
                "model is not finite at the initial guess".to_string(),
            ));
        }

        let mut damping = self.initial_damping;
        for _ in 0..self.max_iterations {
            let jac = self.jacobian(&model, x, &params);
            let jt = jac.transpose();
            let normal = &jt * &jac;
            // Residuals are y - f, so the descent direction is +J^T r
            let gradient = &jt * &r;

            loop {
                let mut damped = normal.clone();
                for i in 0..k {
                    damped[(i, i)] += damping * normal[(i, i)].max(1.0e-12);
                }
                let step = match damped.lu().solve(&gradient) {
                    Some(step) => step,
                    None => {
                        damping *= 10.0;
                        if damping > MAX_DAMPING {
                            return Ok(params);
                        }
                        continue;
                    }
                };

                let trial: Vec<f64> = params.iter().zip(step.iter()).map(|(p, s)| p + s).collect();
                let trial_r = residuals(&trial);
                let trial_cost = trial_r.norm_squared();
                if trial_cost.is_finite() && trial_cost < cost {
                    let decrease = cost - trial_cost;
                    let pnorm = params.iter().map(|p| p * p).sum::<f64>().sqrt();
                    // Small changes only signal convergence for nearly undamped steps
                    let undamped = damping < 1.0;
                    params = trial;
                    r = trial_r;
                    cost = trial_cost;
                    damping = (damping / 10.0).max(1.0e-12);

                    if params.iter().any(|p| !p.is_finite()) {
                        return Err(WhamError::CurveFit("parameters diverged".to_string()));
                    }
                    if undamped
                        && (decrease <= self.tolerance * cost
                            || step.norm() <= self.tolerance * (pnorm + self.tolerance))
                    {
                        return Ok(params);
                    }
                    break;
                }

                damping *= 10.0;
                if damping > MAX_DAMPING {
                    // No step lowers the cost any more
                    return Ok(params);
                }
            }
        }

        Err(WhamError::CurveFit(format!(
            "no convergence within {} iterations",
            self.max_iterations
        )))
    }

    fn jacobian<F>(&self, model: &F, x: ArrayView1<'_, f64>, params: &[f64]) -> DMatrix<f64>
    where
        F: Fn(f64, &[f64]) -> f64,
    {
        let base: Vec<f64> = x.iter().map(|&v| model(v, params)).collect();
        let mut jac = DMatrix::zeros(x.len(), params.len());
        let mut shifted = params.to_vec();
        for c in 0..params.len() {
            let h = f64::EPSILON.sqrt() * params[c].abs().max(1.0);
            shifted[c] = params[c] + h;
            for (j, &v) in x.iter().enumerate() {
                jac[(j, c)] = (model(v, &shifted) - base[j]) / h;
            }
            shifted[c] = params[c];
        }
        jac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array1;

    #[test]
    fn exponential_decay() {
        let x: Array1<f64> = Array1::linspace(0.0, 20.0, 100);
        let y = x.mapv(|v| 0.8 * (-v / 4.0).exp());
        let p = LevenbergMarquardt::default()
            .fit(|x, p| p[0] * (-x / p[1]).exp(), x.view(), y.view(), &[10.0, 0.5])
            .unwrap();
        assert_abs_diff_eq!(p[0], 0.8, epsilon = 1e-5);
        assert_abs_diff_eq!(p[1], 4.0, epsilon = 1e-4);
    }

    #[test]
    fn straight_line() {
        let x: Array1<f64> = Array1::linspace(-1.0, 1.0, 11);
        let y = x.mapv(|v| 3.0 * v - 2.0);
        let p = LevenbergMarquardt::default()
            .fit(|x, p| p[0] * x + p[1], x.view(), y.view(), &[0.0, 0.0])
            .unwrap();
        assert_abs_diff_eq!(p[0], 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p[1], -2.0, epsilon = 1e-6);
    }

    #[test]
    fn non_finite_guess_fails() {
        let x: Array1<f64> = Array1::linspace(0.0, 1.0, 5);
        let y = Array1::<f64>::zeros(5);
        let result = LevenbergMarquardt::default().fit(
            |x, p| (x / p[0]).ln(),
            x.view(),
            y.view(),
            &[0.0],
        );
        assert!(matches!(result, Err(WhamError::CurveFit(_))));
    }

    #[test]
    fn too_few_points_fail() {
        let x: Array1<f64> = Array1::linspace(0.0, 1.0, 2);
        let result = LevenbergMarquardt::default().fit(
            |x, p| p[0] + p[1] * x + p[2] * x * x,
            x.view(),
            x.view(),
            &[0.0, 0.0, 0.0],
        );
        assert!(result.is_err());
    }

    #[test]
    fn builder_validates() {
        assert_eq!(
            LevenbergMarquardt::builder().build().unwrap(),
            LevenbergMarquardt::default()
        );
        assert!(LevenbergMarquardt::builder().tolerance(0.0).build().is_err());
    }
}
