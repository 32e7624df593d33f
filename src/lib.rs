#![warn(rust_2018_idioms, missing_docs, missing_debug_implementations)]

//! Potentials of mean force from umbrella sampling simulations with the weighted histogram
//! analysis method (WHAM), and the analysis that usually follows: averaging over independent
//! runs, transfer free energies and barriers, binding free energies, and position-dependent
//! diffusion.
//!
//! A typical analysis collects the samples of every window in a [`WindowCollection`],
//! histograms them onto shared bins and hands the collection to a [`PmfGenerator`] such as
//! [`Wham`]. Repeating that over blocks or independent simulations gives a [`PmfEnsemble`].
//!
//! Please reference the following if you use this code in your research:
//!
//! [1] Kumar S, Rosenberg JM, Bouzida D, Swendsen RH, Kollman PA. The weighted histogram analysis
//! method for free-energy calculations on biomolecules. J. Comput. Chem. 13:1011-1021, 1992.
//! <https://doi.org/10.1002/jcc.540130812>

#[macro_use]
extern crate derive_builder;

/// Errors returned by this crate
pub mod errors;

pub mod diffusion;
pub mod ensemble;
pub mod external;
pub mod fit;
pub mod generator;
pub mod histogram;
pub mod integrate;
pub mod interpolate;
pub mod readers;
pub mod simulations;
pub mod stats;
/// Synthetic umbrella sampling data for tests and demonstrations
pub mod testsystems;
pub mod units;
/// The self-consistent WHAM iteration
pub mod wham;
pub mod window;
pub mod zconst;

pub use diffusion::Diffusion;
pub use ensemble::{Estimate, PmfEnsemble};
pub use errors::*;
pub use external::ExternalWham;
pub use generator::{PmfGenerator, Profile};
pub use readers::ResultsFormat;
pub use simulations::WindowCollection;
pub use units::EnergyUnit;
pub use wham::*;
pub use window::Window;
pub use zconst::{ZConst, ZConstOutput};
