use crate::errors::*;
use crate::generator::{PmfGenerator, Profile};
use crate::simulations::WindowCollection;
use ndarray::{Array1, Array2};

/// The Weighted Histogram Analysis Method for a one-dimensional reaction coordinate
///
/// `Wham` holds the iteration options and produces a PMF from any histogrammed
/// [`WindowCollection`]. The iteration itself is carried out by a [`WhamSolver`], which also
/// exposes the bias free energies and the unbiased probabilities.
///
/// # Notes
///
/// Each iteration updates, for every bin center $\xi$ and window $i$ with bias
/// $w_i(\xi) = \frac{1}{2} k_i (\xi_i - \xi)^2$ and $n_i$ histogrammed samples,
///
/// $$
///     P(\xi) = \frac{\sum_i h_i(\xi)}{\sum_i n_i e^{(F_i - w_i(\xi))/kT}}
///     \qquad
///     F_i = -kT \ln \sum_\xi e^{-w_i(\xi)/kT} P(\xi)
/// $$
///
/// and shifts $F$ so that the last window is zero. Iteration stops once no $F_i$ changes by
/// more than `tolerance`.
///
/// # References
///
/// 1. Kumar S, Rosenberg JM, Bouzida D, Swendsen RH, Kollman PA. The weighted histogram
/// analysis method for free-energy calculations on biomolecules. J. Comput. Chem.
/// 13:1011-1021, 1992
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(build_fn(validate = "Self::validate", name = "build_inner", private))]
pub struct Wham {
    /// Largest change in any bias free energy that counts as converged
    #[builder(default = "1.0e-5")]
    tolerance: f64,

    /// Stop after this many iterations, irrespective of convergence
    #[builder(default = "100000")]
    max_iterations: usize,

    /// Log every iteration at info rather than debug level
    #[builder(default = "false")]
    verbose: bool,
}

impl WhamBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(tolerance) = self.tolerance {
            if !(tolerance.is_finite() && tolerance > 0.0) {
                return Err(format!("tolerance must be positive, not {}", tolerance));
            }
        }
        if self.max_iterations == Some(0) {
            return Err("max_iterations must be at least 1".to_string());
        }
        Ok(())
    }

    /// Build the WHAM options
    pub fn build(&self) -> Result<Wham> {
        Ok(self.build_inner()?)
    }
}

impl Default for Wham {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-5,
            max_iterations: 100_000,
            verbose: false,
        }
    }
}

impl Wham {
    /// Get a new builder for the `Wham` options
    pub fn builder() -> WhamBuilder {
        WhamBuilder::default()
    }

    /// Largest change in any bias free energy that counts as converged
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Iteration cap
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// A solver for `simulations` using these options
    pub fn solver<'a>(&self, simulations: &'a WindowCollection) -> WhamSolver<'a> {
        WhamSolver::new(simulations, self.clone())
    }
}

/// Where a [`WhamSolver`] is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    /// The collection has no histograms to iterate on
    Uninitialized,
    /// Ready to iterate, or iterating
    Iterating,
    /// The bias free energies are self-consistent within the tolerance
    Converged,
    /// The iteration cap was hit first; the result may not be self-consistent
    MaxIterationsReached,
}

/// Outcome of a WHAM iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Convergence {
    /// The largest change in the bias free energies fell to the tolerance
    Converged {
        #[allow(missing_docs)]
        iterations: usize,
        #[allow(missing_docs)]
        max_error: f64,
    },
    /// The iteration cap was reached without convergence
    MaxIterationsReached {
        #[allow(missing_docs)]
        iterations: usize,
        #[allow(missing_docs)]
        max_error: f64,
    },
}

impl Convergence {
    /// Whether the iteration converged
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    /// Number of iterations performed
    pub fn iterations(&self) -> usize {
        match *self {
            Self::Converged { iterations, .. } | Self::MaxIterationsReached { iterations, .. } => {
                iterations
            }
        }
    }

    /// Largest change in a bias free energy during the final iteration
    pub fn max_error(&self) -> f64 {
        match *self {
            Self::Converged { max_error, .. } | Self::MaxIterationsReached { max_error, .. } => {
                max_error
            }
        }
    }
}

/// Everything a WHAM calculation produces
#[derive(Debug, Clone, PartialEq)]
pub struct WhamResult {
    /// Bin centers along the reaction coordinate
    pub z: Array1<f64>,
    /// `f[i]` is the bias free energy of window `i`
    pub f: Array1<f64>,
    /// `prob[b]` is the unbiased probability of bin `b`; sums to one
    pub prob: Array1<f64>,
    /// `free[b]` is the free energy of bin `b`
    pub free: Array1<f64>,
    /// How the iteration ended
    pub convergence: Convergence,
}

impl WhamResult {
    /// The free energy profile along the bin centers
    pub fn profile(&self) -> Profile {
        Profile {
            z: self.z.clone(),
            free: self.free.clone(),
        }
    }
}

/// A strategy that carries out WHAM on a histogrammed collection
///
/// The in-process [`Wham`] solver and the [`ExternalWham`](crate::external::ExternalWham)
/// program wrapper are interchangeable through this trait.
pub trait WhamBackend {
    /// Iterate to self-consistency and report the result
    fn solve(&self, simulations: &WindowCollection) -> Result<WhamResult>;
}

impl WhamBackend for Wham {
    fn solve(&self, simulations: &WindowCollection) -> Result<WhamResult> {
        let mut solver = self.solver(simulations);
        let convergence = solver.iterate()?;
        Ok(WhamResult {
            z: solver.z.clone(),
            f: solver.f.clone(),
            prob: solver.prob.clone(),
            free: solver.free.clone(),
            convergence,
        })
    }
}

impl PmfGenerator for Wham {
    fn pmf(&self, simulations: &WindowCollection) -> Result<Profile> {
        self.solver(simulations).pmf()
    }
}

/// State of a WHAM calculation on one window collection
#[derive(Debug)]
pub struct WhamSolver<'a> {
    simulations: &'a WindowCollection,
    options: Wham,
    state: SolverState,
    iterations: usize,
    z: Array1<f64>,
    f: Array1<f64>,
    prob: Array1<f64>,
    free: Array1<f64>,
}

impl<'a> WhamSolver<'a> {
    /// Prepare to solve `simulations`; all bias free energies and probabilities start at zero
    pub fn new(simulations: &'a WindowCollection, options: Wham) -> Self {
        let z = simulations.bin_centers().unwrap_or_else(|| Array1::zeros(0));
        let state = if simulations.histograms().is_some() {
            SolverState::Iterating
        } else {
            SolverState::Uninitialized
        };
        Self {
            simulations,
            options,
            state,
            iterations: 0,
            f: Array1::zeros(simulations.len()),
            prob: Array1::zeros(z.len()),
            free: Array1::zeros(z.len()),
            z,
        }
    }

    /// Where the solver is in its life
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// Number of iterations carried out by the last call to [`WhamSolver::iterate`]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Bin centers along the reaction coordinate
    pub fn z(&self) -> &Array1<f64> {
        &self.z
    }

    /// `f[i]` is the bias free energy of window `i`, relative to the last window
    pub fn f(&self) -> &Array1<f64> {
        &self.f
    }

    /// `prob[b]` is the unbiased probability of bin `b`
    pub fn prob(&self) -> &Array1<f64> {
        &self.prob
    }

    /// `free[b]` is the free energy of bin `b`, relative to the first populated bin
    pub fn free(&self) -> &Array1<f64> {
        &self.free
    }

    /// Converge the bias free energies until self-consistency
    ///
    /// Reaching the iteration cap is not an error: the last state is kept, a warning is logged
    /// and [`Convergence::MaxIterationsReached`] is returned so the caller can decide what to
    /// do with a possibly inconsistent result.
    ///
    /// Bins that no window samples end up with zero probability and an infinite free energy.
    /// `free` is therefore zero at the first populated bin, which is `free[0]` only when the
    /// first bin holds samples; otherwise `free[0]` is `+inf`.
    ///
    /// Fails with [`WhamError::NonFinite`] as soon as a bias free energy or probability stops
    /// being finite, e.g. when a window's restraint gives no weight to any bin.
    pub fn iterate(&mut self) -> Result<Convergence> {
        let simulations = self.simulations;
        let histograms = simulations.histograms().ok_or(WhamError::NotHistogrammed)?;
        let nwindows = histograms.len();
        if nwindows == 0 {
            return Err(WhamError::NoWindows);
        }
        let nbins = self.z.len();
        let kt = simulations.kt();

        let nsamples: Array1<f64> = histograms.iter().map(|h| h.sum()).collect();
        if let Some(window) = nsamples.iter().position(|&n| !(n > 0.0)) {
            return Err(WhamError::InsufficientSamples {
                window,
                found: simulations.windows()[window].len(),
            });
        }
        let mut counts = Array1::<f64>::zeros(nbins);
        for h in histograms {
            counts += h;
        }

        // boltzmann[[b, i]] = exp(-w_i(z_b)/kT) does not change between iterations
        let windows = simulations.windows();
        let z = &self.z;
        let boltzmann =
            Array2::from_shape_fn((nbins, nwindows), |(b, i)| (-windows[i].bias(z[b]) / kt).exp());

        self.state = SolverState::Iterating;
        self.iterations = 0;
        self.f = Array1::zeros(nwindows);
        self.prob = Array1::zeros(nbins);

        let convergence = loop {
            self.iterations += 1;
            let f_old = self.f.clone();
            let scale: Array1<f64> = f_old
                .iter()
                .zip(nsamples.iter())
                .map(|(&f, &n)| n * (f / kt).exp())
                .collect();

            let mut f_raw = Array1::<f64>::zeros(nwindows);
            for b in 0..nbins {
                let row = boltzmann.row(b);
                let denom = row.dot(&scale);
                self.prob[b] = if denom > 0.0 { counts[b] / denom } else { 0.0 };
                f_raw.scaled_add(self.prob[b], &row);
            }

            let mut f = f_raw.mapv(|x| -kt * x.ln());
            let reference = f[nwindows - 1];
            f -= reference;
            if f.iter().chain(self.prob.iter()).any(|x| !x.is_finite()) {
                self.f = f;
                return Err(WhamError::NonFinite {
                    iteration: self.iterations,
                });
            }

            let max_error = f
                .iter()
                .zip(f_old.iter())
                .fold(0.0_f64, |acc, (new, old)| acc.max((new - old).abs()));
            self.f = f;

            if self.options.verbose {
                log::info!("Maximum error at iteration {} is {:e}", self.iterations, max_error);
            } else {
                log::debug!("Maximum error at iteration {} is {:e}", self.iterations, max_error);
            }

            if max_error <= self.options.tolerance {
                self.state = SolverState::Converged;
                break Convergence::Converged {
                    iterations: self.iterations,
                    max_error,
                };
            }
            if self.iterations >= self.options.max_iterations {
                log::warn!(
                    "Maximum number of iterations ({}) reached without finding a solution, \
                     last maximum error {:e}",
                    self.iterations,
                    max_error
                );
                self.state = SolverState::MaxIterationsReached;
                break Convergence::MaxIterationsReached {
                    iterations: self.iterations,
                    max_error,
                };
            }
        };

        let total = self.prob.sum();
        if total > 0.0 {
            self.prob /= total;
        }
        self.free = self.prob.mapv(|p| -kt * p.ln());
        if let Some(&reference) = self.free.iter().find(|x| x.is_finite()) {
            self.free -= reference;
        }

        if convergence.is_converged() {
            log::info!("WHAM converged after {} iterations", self.iterations);
        }
        Ok(convergence)
    }

    /// Iterate, then return the free energy along the bin centers
    pub fn pmf(&mut self) -> Result<Profile> {
        self.iterate()?;
        Ok(Profile {
            z: self.z.clone(),
            free: self.free.clone(),
        })
    }
}
