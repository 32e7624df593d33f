//! The z-constraint method: free energy by integrating the mean constraint force.
//!
//! The windows of the collection hold constraint forces rather than positions; their centers are
//! the constrained values of the reaction coordinate.

use crate::diffusion::Diffusion;
use crate::errors::*;
use crate::generator::{PmfGenerator, Profile};
use crate::integrate;
use crate::simulations::WindowCollection;
use crate::stats;
use ndarray::Array1;

/// What [`ZConst`] reports along the constrained coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZConstOutput {
    /// The potential of mean force
    Pmf,
    /// The local resistance to permeation, `exp(PMF/kT) / D`
    Resistance,
}

impl Default for ZConstOutput {
    fn default() -> Self {
        Self::Pmf
    }
}

/// Z-constraint profiles
///
/// The PMF at center `i` is the trapezoidal integral of the mean constraint force from the last
/// center down to center `i`, so it is zero at the last center.
///
/// For the resistance the local diffusion coefficient follows from the fluctuations of the
/// constraint force, `D = (kT)² / (var(F) τ_F)`, with `τ_F` the correlation time that the
/// [`Diffusion`] estimator computes for the force series.
#[derive(Builder, Debug, Clone, PartialEq, Default)]
#[builder(build_fn(name = "build_inner", private))]
pub struct ZConst {
    /// Profile to report
    #[builder(default)]
    output: ZConstOutput,

    /// Correlation time options of the force series
    #[builder(default)]
    diffusion: Diffusion,
}

impl ZConstBuilder {
    /// Build the z-constraint options
    pub fn build(&self) -> Result<ZConst> {
        Ok(self.build_inner()?)
    }
}

impl ZConst {
    /// Get a new builder for the z-constraint options
    pub fn builder() -> ZConstBuilder {
        ZConstBuilder::default()
    }

    /// Mean constraint force of every window
    pub fn mean_forces(simulations: &WindowCollection) -> Result<Array1<f64>> {
        simulations
            .windows()
            .iter()
            .enumerate()
            .map(|(window, w)| {
                if w.is_empty() {
                    Err(WhamError::InsufficientSamples { window, found: 0 })
                } else {
                    Ok(stats::mean(w.samples().view()))
                }
            })
            .collect()
    }

    /// Free energy along the window centers
    pub fn free_energy(&self, simulations: &WindowCollection) -> Result<Array1<f64>> {
        let mut forces = Self::mean_forces(simulations)?.to_vec();
        let mut centers = simulations.centers().to_vec();
        forces.reverse();
        centers.reverse();
        let mut pmf = integrate::cumtrapz(
            Array1::from(centers).view(),
            Array1::from(forces).view(),
        )?
        .to_vec();
        pmf.reverse();
        Ok(Array1::from(pmf))
    }

    /// Local diffusion coefficient of every window from its force fluctuations
    pub fn diffusion(&self, simulations: &WindowCollection) -> Result<Array1<f64>> {
        let kt = simulations.kt();
        simulations
            .windows()
            .iter()
            .map(|w| -> Result<f64> {
                let samples = w.samples().view();
                let friction = stats::variance(samples) * self.diffusion.correlation_time(samples)?;
                Ok(kt * kt / friction)
            })
            .collect()
    }
}

impl PmfGenerator for ZConst {
    fn pmf(&self, simulations: &WindowCollection) -> Result<Profile> {
        let pmf = self.free_energy(simulations)?;
        let free = match self.output {
            ZConstOutput::Pmf => pmf,
            ZConstOutput::Resistance => {
                let kt = simulations.kt();
                let diffusion = self.diffusion(simulations)?;
                pmf.iter()
                    .zip(diffusion.iter())
                    .map(|(g, d)| (g / kt).exp() / d)
                    .collect()
            }
        };
        Ok(Profile {
            z: simulations.centers(),
            free,
        })
    }
}
