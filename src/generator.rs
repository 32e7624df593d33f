//! The common interface of all methods that turn a window collection into a profile.

use crate::errors::*;
use crate::simulations::WindowCollection;
use ndarray::Array1;

/// A profile along the reaction coordinate
///
/// For WHAM and the z-constraint method `free` is a potential of mean force; the diffusion
/// estimator and the z-constraint resistance report other quantities on the same footing.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Values of the reaction coordinate
    pub z: Array1<f64>,
    /// `free[i]` is the profile at `z[i]`
    pub free: Array1<f64>,
}

impl Profile {
    /// Number of grid points
    pub fn len(&self) -> usize {
        self.z.len()
    }

    /// Whether the profile has no grid points
    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }
}

/// Any algorithm that computes a profile from a set of simulations at specific values of a
/// reaction coordinate
///
/// The implementors carry their own options; a [`PmfEnsemble`](crate::ensemble::PmfEnsemble)
/// applies one of them to every run without knowing which it is.
pub trait PmfGenerator {
    /// Compute the profile of `simulations`
    fn pmf(&self, simulations: &WindowCollection) -> Result<Profile>;
}
