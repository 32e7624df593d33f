use crate::errors::*;
use crate::simulations::WindowCollection;
use crate::units::EnergyUnit;
use crate::window::Window;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Test case of umbrella windows with normally distributed samples.
///
/// # Examples
///
/// Generate a collection of windows with default parameters.
///
/// ```
/// use wham_rs::testsystems::*;
///
/// let sims = HarmonicWindows::default().sample().unwrap();
/// assert_eq!(sims.len(), 2);
/// ```
///
/// Generate windows with specified parameters.
///
/// ```
/// use wham_rs::testsystems::*;
///
/// let sims = HarmonicWindows::builder()
///     .centers(vec![0.0, 0.5, 1.0, 1.5])
///     .weights(vec![10.0])
///     .samples_per_window(500)
///     .build()
///     .unwrap()
///     .sample()
///     .unwrap();
/// assert_eq!(sims.windows()[3].len(), 500);
/// ```
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate", name = "build_inner", private))]
pub struct HarmonicWindows {
    /// Restraint center of each window; the samples are centered on these too
    #[builder(default = "vec![0.0, 1.0]")]
    centers: Vec<f64>,

    /// Restraint stiffness of each window, or a single stiffness shared by all
    #[builder(default = "vec![5.0]")]
    weights: Vec<f64>,

    /// Standard deviation of the samples in every window
    #[builder(default = "0.2")]
    std: f64,

    /// Number of samples drawn per window
    #[builder(default = "1000")]
    samples_per_window: usize,

    /// Temperature of the collection
    #[builder(default = "300.0")]
    temperature: f64,

    /// Energy unit of the collection
    #[builder(default)]
    unit: EnergyUnit,

    /// Attach the restraint energy of every sample as its total energy
    #[builder(default = "false")]
    energies: bool,

    /// Seed of the random number generator
    #[builder(default = "42")]
    seed: u64,
}

impl HarmonicWindowsBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let (Some(centers), Some(weights)) = (&self.centers, &self.weights) {
            if weights.len() != 1 && weights.len() != centers.len() {
                return Err(format!(
                    "weights must hold one value or one per center (not {} for {} centers)",
                    weights.len(),
                    centers.len()
                ));
            }
        }
        if let Some(std) = self.std {
            if !(std >= 0.0 && std.is_finite()) {
                return Err(format!("std must be a non-negative number, not {}", std));
            }
        }

        Ok(())
    }

    /// Build the test case
    pub fn build(&self) -> Result<HarmonicWindows> {
        Ok(self.build_inner()?)
    }
}

impl HarmonicWindows {
    /// Get a new builder for the `HarmonicWindows` test case
    pub fn builder() -> HarmonicWindowsBuilder {
        HarmonicWindowsBuilder::default()
    }

    fn weight(&self, i: usize) -> f64 {
        if self.weights.len() == 1 {
            self.weights[0]
        } else {
            self.weights[i]
        }
    }

    /// Draw samples for every window
    pub fn sample(&self) -> Result<WindowCollection> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut sims = WindowCollection::new(self.temperature, self.unit);

        for (i, &center) in self.centers.iter().enumerate() {
            let normal =
                Normal::new(center, self.std).map_err(|e| WhamError::Sampling(e.to_string()))?;
            let samples: Array1<f64> = (0..self.samples_per_window)
                .map(|_| normal.sample(&mut rng))
                .collect();
            let mut window = Window::new(center, self.weight(i), samples);
            if self.energies {
                let energies = window.samples().mapv(|x| window.bias(x));
                window = window.with_energies(energies)?;
            }
            sims.add(window)?;
        }

        Ok(sims)
    }
}

impl Default for HarmonicWindows {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("HarmonicWindows should not fail with default params")
    }
}
