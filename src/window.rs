//! A single umbrella sampling window.
//!
//! Internally, irrespective of the simulation engine, lengths are in Ångström and energies in
//! the unit of the owning [`WindowCollection`](crate::simulations::WindowCollection).

use crate::errors::*;
use crate::stats;
use ndarray::{s, Array1};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::ops::Add;

/// One biased simulation, restrained near `center` by a harmonic potential of stiffness `weight`
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    center: f64,
    weight: f64,
    samples: Array1<f64>,
    /// Instantaneous total energies, parallel to `samples`
    energies: Option<Array1<f64>>,
    /// Samples set aside by [`Window::synthesize`]
    original: Option<Array1<f64>>,
}

impl Window {
    /// A window without total energies
    pub fn new(center: f64, weight: f64, samples: impl Into<Array1<f64>>) -> Self {
        Self {
            center,
            weight,
            samples: samples.into(),
            energies: None,
            original: None,
        }
    }

    /// Attach total energies; there must be one per sample
    pub fn with_energies(mut self, energies: impl Into<Array1<f64>>) -> Result<Self> {
        let energies = energies.into();
        if energies.len() != self.samples.len() {
            return Err(WhamError::ArrayLengthMismatch(
                energies.len(),
                self.samples.len(),
            ));
        }
        self.energies = Some(energies);
        Ok(self)
    }

    /// Target value of the restraint
    pub fn center(&self) -> f64 {
        self.center
    }

    /// Stiffness of the restraint, in energy per length squared
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Reaction-coordinate observations
    pub fn samples(&self) -> &Array1<f64> {
        &self.samples
    }

    /// Total-energy observations, if any
    pub fn energies(&self) -> Option<&Array1<f64>> {
        self.energies.as_ref()
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the window holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Harmonic bias energy this window's restraint exerts at `coordinate`
    pub fn bias(&self, coordinate: f64) -> f64 {
        let dx = self.center - coordinate;
        0.5 * self.weight * dx * dx
    }

    /// Discard samples at the start of the simulation
    ///
    /// With `proportional`, `n` is read as a fraction `1/n` of the samples and values below 2
    /// leave the window untouched. The first `count + 1` samples are dropped.
    pub fn skip(&mut self, n: usize, proportional: bool) {
        if let Some(count) = self.trim_count(n, proportional) {
            let from = (count + 1).min(self.len());
            self.samples = self.samples.slice(s![from..]).to_owned();
            if let Some(energies) = &mut self.energies {
                *energies = energies.slice(s![from..]).to_owned();
            }
        }
    }

    /// Discard samples at the end of the simulation, keeping the first `count + 1`
    ///
    /// `n` is read as in [`Window::skip`].
    pub fn shorten(&mut self, n: usize, proportional: bool) {
        if let Some(count) = self.trim_count(n, proportional) {
            let to = (count + 1).min(self.len());
            self.samples = self.samples.slice(s![..to]).to_owned();
            if let Some(energies) = &mut self.energies {
                *energies = energies.slice(s![..to]).to_owned();
            }
        }
    }

    fn trim_count(&self, n: usize, proportional: bool) -> Option<usize> {
        if !proportional {
            return Some(n);
        }
        if n < 2 {
            return None;
        }
        Some(self.len() / n)
    }

    /// Split the samples into `nblocks` contiguous blocks of equal length
    ///
    /// The blocks own copies of their samples; `self` is left untouched. Samples left over
    /// after the last full block are not used.
    pub fn blocks(&self, nblocks: usize) -> Vec<Window> {
        if nblocks <= 1 {
            return vec![self.clone()];
        }
        let blocklen = self.len() / nblocks;
        (0..nblocks)
            .map(|i| {
                let range = blocklen * i..blocklen * (i + 1);
                Window {
                    center: self.center,
                    weight: self.weight,
                    samples: self.samples.slice(s![range.clone()]).to_owned(),
                    energies: self
                        .energies
                        .as_ref()
                        .map(|e| e.slice(s![range]).to_owned()),
                    original: None,
                }
            })
            .collect()
    }

    /// Replace the samples by normally distributed data with the same mean and standard
    /// deviation, keeping the originals for [`Window::restore`]
    pub fn synthesize<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        if self.is_empty() {
            return Err(WhamError::InsufficientSamples {
                window: 0,
                found: 0,
            });
        }
        let mean = stats::mean(self.samples.view());
        let sigma = stats::std(self.samples.view());
        let normal = Normal::new(mean, sigma).map_err(|e| WhamError::Sampling(e.to_string()))?;
        let synthetic: Array1<f64> = (0..self.len()).map(|_| normal.sample(rng)).collect();

        let original = std::mem::replace(&mut self.samples, synthetic);
        // Synthesizing twice must not lose the real data
        if self.original.is_none() {
            self.original = Some(original);
        }
        Ok(())
    }

    /// Put back the samples set aside by [`Window::synthesize`]
    pub fn restore(&mut self) {
        if let Some(original) = self.original.take() {
            self.samples = original;
        }
    }

    /// Whether the samples are currently synthetic
    pub fn is_synthetic(&self) -> bool {
        self.original.is_some()
    }

    /// Lower limit of the 99% confidence interval of the samples
    pub fn lower(&self) -> f64 {
        stats::confidence_99(self.samples.view()).0
    }

    /// Upper limit of the 99% confidence interval of the samples
    pub fn upper(&self) -> f64 {
        stats::confidence_99(self.samples.view()).1
    }
}

/// Appends the samples of `other`; the restraint of `self` is kept
///
/// Energies survive only if both windows carry them.
impl Add for Window {
    type Output = Window;

    fn add(self, other: Window) -> Window {
        let samples = self.samples.iter().chain(other.samples.iter()).copied().collect();
        let energies = match (&self.energies, &other.energies) {
            (Some(a), Some(b)) => Some(a.iter().chain(b.iter()).copied().collect()),
            _ => None,
        };
        Window {
            center: self.center,
            weight: self.weight,
            samples,
            energies,
            original: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ramp(n: usize) -> Window {
        Window::new(1.0, 5.0, (0..n).map(|i| i as f64).collect::<Array1<f64>>())
    }

    #[test]
    fn energies_must_match_samples() {
        let w = Window::new(0.0, 1.0, array![0.0, 1.0, 2.0]);
        assert!(matches!(
            w.clone().with_energies(array![1.0, 2.0]),
            Err(WhamError::ArrayLengthMismatch(2, 3))
        ));
        assert!(w.with_energies(array![1.0, 2.0, 3.0]).is_ok());
    }

    #[test]
    fn skip_by_count_drops_one_extra() {
        let mut w = ramp(10);
        w.skip(2, false);
        assert_eq!(w.samples(), &array![3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn skip_by_proportion() {
        let mut w = ramp(10);
        w.skip(1, true);
        assert_eq!(w.len(), 10);
        w.skip(5, true);
        assert_eq!(w.samples()[0], 3.0);
        assert_eq!(w.len(), 7);
    }

    #[test]
    fn shorten_keeps_head_and_energies() {
        let mut w = ramp(10)
            .with_energies((0..10).map(|i| -(i as f64)).collect::<Array1<f64>>())
            .unwrap();
        w.shorten(4, false);
        assert_eq!(w.samples(), &array![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(w.energies().unwrap(), &array![0.0, -1.0, -2.0, -3.0, -4.0]);
    }

    #[test]
    fn blocks_leave_parent_intact() {
        let w = ramp(10);
        let blocks = w.blocks(3);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].samples(), &array![0.0, 1.0, 2.0]);
        assert_eq!(blocks[2].samples(), &array![6.0, 7.0, 8.0]);
        assert!(blocks.iter().all(|b| b.center() == 1.0 && b.weight() == 5.0));
        assert_eq!(w.len(), 10);
        assert_eq!(w.blocks(1)[0], w);
    }

    #[test]
    fn synthesize_then_restore() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples: Array1<f64> = (0..5000).map(|i| (i % 10) as f64).collect();
        let mut w = Window::new(0.0, 1.0, samples);
        let before = w.samples().clone();
        w.synthesize(&mut rng).unwrap();
        assert!(w.is_synthetic());
        assert_eq!(w.len(), before.len());
        assert_abs_diff_eq!(stats::mean(w.samples().view()), 4.5, epsilon = 0.15);
        assert_abs_diff_eq!(
            stats::std(w.samples().view()),
            stats::std(before.view()),
            epsilon = 0.15
        );
        w.synthesize(&mut rng).unwrap();
        w.restore();
        assert!(!w.is_synthetic());
        assert_eq!(w.samples(), &before);
    }

    #[test]
    fn confidence_limits() {
        let w = Window::new(0.0, 1.0, array![-1.0, 1.0]);
        assert_abs_diff_eq!(w.lower(), -2.58);
        assert_abs_diff_eq!(w.upper(), 2.58);
    }

    #[test]
    fn adding_concatenates() {
        let a = Window::new(0.5, 2.0, array![1.0, 2.0]);
        let b = Window::new(0.7, 3.0, array![3.0]);
        let both = a + b;
        assert_eq!(both.samples(), &array![1.0, 2.0, 3.0]);
        assert_eq!(both.center(), 0.5);
        assert_eq!(both.weight(), 2.0);
        assert!(both.energies().is_none());
    }

    #[test]
    fn bias_is_harmonic() {
        let w = Window::new(1.0, 4.0, array![0.0]);
        assert_abs_diff_eq!(w.bias(1.0), 0.0);
        assert_abs_diff_eq!(w.bias(0.5), 0.5);
        assert_abs_diff_eq!(w.bias(3.0), 8.0);
    }
}
