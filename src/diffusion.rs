//! Position-dependent diffusion from the fluctuations of restrained coordinates.

use crate::errors::*;
use crate::fit::LevenbergMarquardt;
use crate::generator::{PmfGenerator, Profile};
use crate::integrate;
use crate::simulations::WindowCollection;
use crate::stats;
use ndarray::{Array1, ArrayView1};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Diffusion coefficients by the method of Woolf and Roux
///
/// For each window the coefficient is the variance of the restrained coordinate divided by its
/// correlation time. The correlation time integrates a fit to the normalized autocorrelation
/// function: first a sum of two exponentials, and if that fit fails a single exponential.
///
/// # References
///
/// 1. Woolf TB, Roux B. Conformational flexibility of o-phosphorylcholine and
/// o-phosphorylethanolamine: a molecular dynamics study of solvation effects.
/// J. Am. Chem. Soc. 116:5916-5926, 1994
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(build_fn(validate = "Self::validate", name = "build_inner", private))]
pub struct Diffusion {
    /// Time between consecutive samples
    #[builder(default = "1.0")]
    dt: f64,

    /// Starting point `[a0, a1, t0, t1]` of the fit to `a0 exp(-x/t0) + a1 exp(-x/t1)`
    #[builder(default = "[10.0, 10.0, 0.1, 0.1]")]
    double_guess: [f64; 4],

    /// Starting point `[a0, t0]` of the fallback fit to `a0 exp(-x/t0)`
    #[builder(default = "[10.0, 0.1]")]
    single_guess: [f64; 2],

    /// Least-squares options of both fits
    #[builder(default)]
    fitter: LevenbergMarquardt,
}

impl DiffusionBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(dt) = self.dt {
            if !(dt > 0.0) {
                return Err(format!("dt must be positive, not {}", dt));
            }
        }
        Ok(())
    }

    /// Build the diffusion estimator
    pub fn build(&self) -> Result<Diffusion> {
        Ok(self.build_inner()?)
    }
}

impl Default for Diffusion {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("Diffusion should not fail with default params")
    }
}

fn double_exp(x: f64, p: &[f64]) -> f64 {
    p[0] * (-x / p[2]).exp() + p[1] * (-x / p[3]).exp()
}

fn single_exp(x: f64, p: &[f64]) -> f64 {
    p[0] * (-x / p[1]).exp()
}

/// Autocorrelation function of the fluctuations of `samples`, normalized to one at lag zero
///
/// Entry `k` is `Σ_t δx_t δx_{t+k}` over the overlapping part of the series, computed with a
/// zero-padded FFT so that the correlation does not wrap around.
pub fn autocorrelation(samples: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
    let n = samples.len();
    if n < 2 {
        return Err(WhamError::InsufficientSamples {
            window: 0,
            found: n,
        });
    }
    let mean = stats::mean(samples);
    let size = (2 * n).next_power_of_two();

    let mut buffer: Vec<Complex<f64>> = samples
        .iter()
        .map(|&x| Complex::new(x - mean, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(size).process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    planner.plan_fft_inverse(size).process(&mut buffer);

    let zero = buffer[0].re;
    if !(zero > 0.0) {
        return Err(WhamError::CurveFit(
            "samples do not fluctuate, so they have no autocorrelation".to_string(),
        ));
    }
    Ok(buffer[..n].iter().map(|c| c.re / zero).collect())
}

impl Diffusion {
    /// Get a new builder for the diffusion estimator
    pub fn builder() -> DiffusionBuilder {
        DiffusionBuilder::default()
    }

    /// Time between consecutive samples
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Integrated correlation time of `samples`, in units of `dt`
    pub fn correlation_time(&self, samples: ArrayView1<'_, f64>) -> Result<f64> {
        let acf = autocorrelation(samples)?;
        let lags: Array1<f64> = (0..acf.len()).map(|k| k as f64).collect();

        let fitted = match self
            .fitter
            .fit(double_exp, lags.view(), acf.view(), &self.double_guess)
        {
            Ok(p) => lags.mapv(|x| double_exp(x, &p)),
            Err(e) => {
                log::warn!(
                    "Two-exponential fit of the autocorrelation failed ({}), using one exponential",
                    e
                );
                let p = self
                    .fitter
                    .fit(single_exp, lags.view(), acf.view(), &self.single_guess)?;
                lags.mapv(|x| single_exp(x, &p))
            }
        };

        Ok((integrate::trapz(lags.view(), fitted.view())? * self.dt).abs())
    }

    /// Variance of `samples` over their correlation time
    pub fn coefficient(&self, samples: ArrayView1<'_, f64>) -> Result<f64> {
        Ok(stats::variance(samples) / self.correlation_time(samples)?)
    }
}

impl PmfGenerator for Diffusion {
    /// Diffusion coefficient of every window, along the window centers
    fn pmf(&self, simulations: &WindowCollection) -> Result<Profile> {
        let free = simulations
            .windows()
            .iter()
            .enumerate()
            .map(|(i, w)| {
                self.coefficient(w.samples().view())
                    .map_err(|e| match e {
                        WhamError::InsufficientSamples { found, .. } => {
                            WhamError::InsufficientSamples { window: i, found }
                        }
                        e => e,
                    })
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Profile {
            z: simulations.centers(),
            free: Array1::from(free),
        })
    }
}
