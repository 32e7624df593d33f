//! A set of umbrella sampling windows that are analysed together.

use crate::errors::*;
use crate::histogram::{self, Bins};
use crate::units::EnergyUnit;
use crate::window::Window;
use itertools::Itertools;
use ndarray::{Array1, ArrayView1};

/// Windows sharing a temperature and an energy unit, together with their histograms
///
/// Either every window carries total energies or none does; [`WindowCollection::add`]
/// refuses windows that would break this.
#[derive(Debug, Clone)]
pub struct WindowCollection {
    temperature: f64,
    unit: EnergyUnit,
    windows: Vec<Window>,
    histograms: Option<Vec<Array1<f64>>>,
    bins: Option<Array1<f64>>,
}

impl WindowCollection {
    /// An empty collection of simulations run at `temperature` (K), with energies in `unit`
    pub fn new(temperature: f64, unit: EnergyUnit) -> Self {
        Self {
            temperature,
            unit,
            windows: Vec::new(),
            histograms: None,
            bins: None,
        }
    }

    /// Add a simulation to the set
    pub fn add(&mut self, window: Window) -> Result<()> {
        if let Some(first) = self.windows.first() {
            if first.energies().is_some() != window.energies().is_some() {
                return Err(WhamError::MixedEnergies {
                    window: self.windows.len(),
                });
            }
        }
        self.windows.push(window);
        Ok(())
    }

    /// Temperature of the simulations, in K
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Energy unit of weights and total energies
    pub fn unit(&self) -> EnergyUnit {
        self.unit
    }

    /// The Boltzmann constant in the energy unit of the collection
    pub fn boltzmann(&self) -> f64 {
        self.unit.boltzmann()
    }

    /// $k_B T$ in the energy unit of the collection
    pub fn kt(&self) -> f64 {
        self.unit.kt(self.temperature)
    }

    /// The windows, in the order they were added
    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    /// Mutable access to the windows, e.g. to trim or resample them
    ///
    /// Histograms and bins are discarded since they no longer describe the samples.
    pub fn windows_mut(&mut self) -> &mut [Window] {
        self.histograms = None;
        self.bins = None;
        &mut self.windows
    }

    /// Number of windows
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether the collection holds no windows
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Restraint centers of all windows
    pub fn centers(&self) -> Array1<f64> {
        self.windows.iter().map(Window::center).collect()
    }

    /// Restraint stiffnesses of all windows
    pub fn weights(&self) -> Array1<f64> {
        self.windows.iter().map(Window::weight).collect()
    }

    /// Whether every window carries total energies
    pub fn has_energies(&self) -> bool {
        !self.windows.is_empty() && self.windows.iter().all(|w| w.energies().is_some())
    }

    /// Per-window histograms, once made
    pub fn histograms(&self) -> Option<&[Array1<f64>]> {
        self.histograms.as_deref()
    }

    /// Shared bin edges, once made
    pub fn bins(&self) -> Option<&Array1<f64>> {
        self.bins.as_ref()
    }

    /// Midpoints of the shared bins, once made
    pub fn bin_centers(&self) -> Option<Array1<f64>> {
        self.bins.as_ref().map(histogram::bin_centers)
    }

    fn sample_views(&self) -> Vec<ArrayView1<'_, f64>> {
        self.windows.iter().map(|w| w.samples().view()).collect()
    }

    /// Histogram the samples of every window onto shared bins
    ///
    /// If the windows carry total energies and `weighted` is set, each sample is weighted by
    /// the Boltzmann factor `exp(-(E - E_min)/kT)` of its total energy, with `E_min` the lowest
    /// energy of the whole collection.
    pub fn make_histograms(
        &mut self,
        bins: impl Into<Bins>,
        boundaries: Option<(f64, f64)>,
        weighted: bool,
    ) -> Result<()> {
        let data = self.sample_views();
        let (histograms, edges) = if weighted && self.has_energies() {
            let kt = self.kt();
            // Relative to the lowest energy of the collection, so absolute energies cannot
            // overflow the Boltzmann factors
            let lowest = self
                .windows
                .iter()
                .filter_map(Window::energies)
                .flat_map(|e| e.iter().copied())
                .fold(f64::INFINITY, f64::min);
            let factors: Vec<Array1<f64>> = self
                .windows
                .iter()
                .filter_map(Window::energies)
                .map(|e| e.mapv(|energy| (-(energy - lowest) / kt).exp()))
                .collect();
            let factor_views: Vec<_> = factors.iter().map(|f| f.view()).collect();
            histogram::make_reweighted_histograms(&data, &factor_views, bins, boundaries)?
        } else {
            histogram::make_histograms(&data, bins, boundaries)?
        };
        log::debug!(
            "Histogrammed {} windows into {} bins",
            histograms.len(),
            edges.len() - 1
        );
        self.histograms = Some(histograms);
        self.bins = Some(edges);
        Ok(())
    }

    /// Create bin edges for the samples, unless they already exist
    pub fn make_bins(&mut self, nbins: usize, boundaries: Option<(f64, f64)>) -> Result<()> {
        if self.bins.is_some() {
            return Ok(());
        }
        let edges = histogram::make_bins(&self.sample_views(), nbins, boundaries)?;
        self.bins = Some(edges);
        Ok(())
    }

    /// Percentage overlap of the histograms of neighbouring windows
    ///
    /// Entry `i` is `100 · Σ sqrt(h_i h_{i+1}) / sqrt(n_i n_{i+1})`, with `n` the number of
    /// samples of a window. Values near zero flag gaps in the sampling between two windows.
    /// Returns `None` until histograms have been made.
    pub fn pairwise_overlap(&self) -> Option<Array1<f64>> {
        let histograms = self.histograms.as_ref()?;
        let overlap = histograms
            .iter()
            .zip(&self.windows)
            .tuple_windows()
            .map(|((h1, w1), (h2, w2))| {
                let shared: f64 = h1.iter().zip(h2.iter()).map(|(a, b)| (a * b).sqrt()).sum();
                let norm = ((w1.len() * w2.len()) as f64).sqrt();
                shared / norm * 100.0
            })
            .collect();
        Some(overlap)
    }

    /// Split every window into `nblocks` blocks and regroup them
    ///
    /// Collection `b` of the result holds block `b` of every window, so the collections can be
    /// analysed as independent repeats. Histograms are not carried over.
    pub fn blocks(&self, nblocks: usize) -> Result<Vec<WindowCollection>> {
        let nblocks = nblocks.max(1);
        let mut collections: Vec<_> = (0..nblocks)
            .map(|_| WindowCollection::new(self.temperature, self.unit))
            .collect();
        for window in &self.windows {
            for (collection, block) in collections.iter_mut().zip(window.blocks(nblocks)) {
                collection.add(block)?;
            }
        }
        Ok(collections)
    }
}
