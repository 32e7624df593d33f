//! Histogramming of several data sets onto one shared set of bin edges.
//!
//! WHAM combines the probabilities of different windows bin by bin, so every window must be
//! histogrammed with identical edges. The routines here guarantee that: the edges are computed
//! once, from all data sets together, and then used for every set.

use crate::errors::*;
use crate::stats;
use itertools::Itertools;
use ndarray::{Array1, ArrayView1};

/// How the bins of a histogram are specified
#[derive(Debug, Clone, PartialEq)]
pub enum Bins {
    /// Number of evenly spaced bins; the edges are computed from the data
    Count(usize),
    /// Precomputed, strictly increasing bin edges
    Edges(Array1<f64>),
}

impl From<usize> for Bins {
    fn from(n: usize) -> Self {
        Self::Count(n)
    }
}

impl From<Array1<f64>> for Bins {
    fn from(edges: Array1<f64>) -> Self {
        Self::Edges(edges)
    }
}

/// Make `nbins + 1` evenly spaced bin edges for histogramming
///
/// If `boundaries` is not given, the edges span the union of the 99% confidence intervals
/// (assuming normality) of all data sets. Using the confidence interval rather than the raw
/// minimum and maximum keeps a few outliers of a single window from stretching the grid.
pub fn make_bins(
    data: &[ArrayView1<'_, f64>],
    nbins: usize,
    boundaries: Option<(f64, f64)>,
) -> Result<Array1<f64>> {
    if nbins == 0 {
        return Err(WhamError::InvalidBins("at least one bin is needed".to_string()));
    }

    let (mn, ma) = match boundaries {
        Some(bounds) => bounds,
        None => {
            if data.is_empty() {
                return Err(WhamError::InvalidBins("no data sets to bin".to_string()));
            }
            let mut mn = f64::INFINITY;
            let mut ma = f64::NEG_INFINITY;
            for (window, set) in data.iter().enumerate() {
                if set.len() < 2 {
                    return Err(WhamError::InsufficientSamples {
                        window,
                        found: set.len(),
                    });
                }
                let (lo, hi) = stats::confidence_99(set.view());
                mn = mn.min(lo);
                ma = ma.max(hi);
            }
            (mn, ma)
        }
    };

    if !(mn.is_finite() && ma.is_finite() && mn < ma) {
        return Err(WhamError::InvalidBins(format!(
            "boundaries [{}, {}] do not span a finite range",
            mn, ma
        )));
    }

    Ok(Array1::linspace(mn, ma, nbins + 1))
}

/// Midpoints of consecutive bin edges
pub fn bin_centers(edges: &Array1<f64>) -> Array1<f64> {
    edges
        .iter()
        .tuple_windows()
        .map(|(left, right)| 0.5 * (left + right))
        .collect()
}

/// Histogram a set of data using the same edges for every set
///
/// `bins` is either a number of bins, in which case the edges are made with [`make_bins`], or
/// the edges themselves. Counts follow the usual convention: every bin is half-open except the
/// last, which includes its right edge; values outside the edges are not counted.
pub fn make_histograms(
    data: &[ArrayView1<'_, f64>],
    bins: impl Into<Bins>,
    boundaries: Option<(f64, f64)>,
) -> Result<(Vec<Array1<f64>>, Array1<f64>)> {
    let edges = resolve_edges(data, bins.into(), boundaries)?;
    let histograms = data
        .iter()
        .map(|set| accumulate(set.iter().map(|&x| (x, 1.0)), &edges))
        .collect();
    Ok((histograms, edges))
}

/// Histogram a set of data where every observation carries a weight
///
/// Typically the weights are Boltzmann factors of the instantaneous total energy, which
/// reweights each window to the unbiased ensemble.
pub fn make_reweighted_histograms(
    data: &[ArrayView1<'_, f64>],
    weights: &[ArrayView1<'_, f64>],
    bins: impl Into<Bins>,
    boundaries: Option<(f64, f64)>,
) -> Result<(Vec<Array1<f64>>, Array1<f64>)> {
    if weights.len() != data.len() {
        return Err(WhamError::ArrayLengthMismatch(weights.len(), data.len()));
    }
    for (set, w) in data.iter().zip(weights) {
        if set.len() != w.len() {
            return Err(WhamError::ArrayLengthMismatch(w.len(), set.len()));
        }
    }

    let edges = resolve_edges(data, bins.into(), boundaries)?;
    let histograms = data
        .iter()
        .zip(weights)
        .map(|(set, w)| accumulate(set.iter().copied().zip(w.iter().copied()), &edges))
        .collect();
    Ok((histograms, edges))
}

fn resolve_edges(
    data: &[ArrayView1<'_, f64>],
    bins: Bins,
    boundaries: Option<(f64, f64)>,
) -> Result<Array1<f64>> {
    let edges = match bins {
        Bins::Count(n) => make_bins(data, n, boundaries)?,
        Bins::Edges(edges) => edges,
    };
    check_edges(&edges)?;
    Ok(edges)
}

fn check_edges(edges: &Array1<f64>) -> Result<()> {
    if edges.len() < 2 {
        return Err(WhamError::InvalidBins(format!(
            "{} edges cannot delimit a bin",
            edges.len()
        )));
    }
    if edges.iter().any(|e| !e.is_finite()) {
        return Err(WhamError::InvalidBins("edges must be finite".to_string()));
    }
    if edges.iter().tuple_windows().any(|(left, right)| right <= left) {
        return Err(WhamError::InvalidBins(
            "edges must be strictly increasing".to_string(),
        ));
    }
    Ok(())
}

fn accumulate(observations: impl Iterator<Item = (f64, f64)>, edges: &Array1<f64>) -> Array1<f64> {
    let edges = edges.to_vec();
    let mut counts = Array1::zeros(edges.len() - 1);
    for (x, w) in observations {
        if let Some(i) = bin_index(&edges, x) {
            counts[i] += w;
        }
    }
    counts
}

fn bin_index(edges: &[f64], x: f64) -> Option<usize> {
    let last = edges.len() - 1;
    // NaN fails both comparisons
    if !(x >= edges[0] && x <= edges[last]) {
        return None;
    }
    if x == edges[last] {
        return Some(last - 1);
    }
    Some(edges.partition_point(|&e| e <= x) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn bins_span_union_of_confidence_intervals() {
        let a = array![-1.0, 1.0];
        let b = array![9.0, 11.0];
        let edges = make_bins(&[a.view(), b.view()], 4, None).unwrap();
        assert_eq!(edges.len(), 5);
        assert_abs_diff_eq!(edges[0], -2.58, epsilon = 1e-12);
        assert_abs_diff_eq!(edges[4], 12.58, epsilon = 1e-12);
        assert_abs_diff_eq!(edges[1] - edges[0], (12.58 + 2.58) / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn explicit_boundaries_win() {
        let a = array![0.3, 0.4];
        let edges = make_bins(&[a.view()], 2, Some((0.0, 1.0))).unwrap();
        assert_eq!(edges, array![0.0, 0.5, 1.0]);
    }

    #[test]
    fn make_bins_is_deterministic() {
        let a = array![0.1, 0.5, 0.7, 0.2];
        let first = make_bins(&[a.view()], 7, None).unwrap();
        let second = make_bins(&[a.view()], 7, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn too_few_samples_are_reported() {
        let a = array![0.1, 0.5];
        let b = array![0.3];
        match make_bins(&[a.view(), b.view()], 3, None) {
            Err(WhamError::InsufficientSamples { window, found }) => {
                assert_eq!(window, 1);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn counts_use_closed_last_bin() {
        let a = array![0.0, 0.25, 0.5, 0.99, 1.0, 1.5, -0.1];
        let (hists, edges) = make_histograms(&[a.view()], 2_usize, Some((0.0, 1.0))).unwrap();
        assert_eq!(edges, array![0.0, 0.5, 1.0]);
        assert_eq!(hists[0], array![2.0, 3.0]);
    }

    #[test]
    fn every_set_shares_the_edges() {
        let a = array![0.0, 0.1, 0.2, 0.3];
        let b = array![0.6, 0.7, 0.8, 0.9];
        let (hists, edges) = make_histograms(&[a.view(), b.view()], 10_usize, None).unwrap();
        assert_eq!(hists.len(), 2);
        assert!(hists.iter().all(|h| h.len() == edges.len() - 1));
        assert_abs_diff_eq!(hists[0].sum() + hists[1].sum(), 8.0);
    }

    #[test]
    fn precomputed_edges_are_used_as_is() {
        let a = array![0.5, 1.5, 2.5, 3.5];
        let edges = array![0.0, 1.0, 4.0];
        let (hists, out) = make_histograms(&[a.view()], edges.clone(), None).unwrap();
        assert_eq!(out, edges);
        assert_eq!(hists[0], array![1.0, 3.0]);
    }

    #[test]
    fn reweighted_counts_sum_weights() {
        let a = array![0.1, 0.2, 0.8];
        let w = array![0.5, 2.0, 3.0];
        let (hists, _) =
            make_reweighted_histograms(&[a.view()], &[w.view()], 2_usize, Some((0.0, 1.0))).unwrap();
        assert_eq!(hists[0], array![2.5, 3.0]);
    }

    #[test]
    fn reweighting_checks_lengths() {
        let a = array![0.1, 0.2, 0.8];
        let w = array![0.5, 2.0];
        assert!(matches!(
            make_reweighted_histograms(&[a.view()], &[w.view()], 2_usize, Some((0.0, 1.0))),
            Err(WhamError::ArrayLengthMismatch(2, 3))
        ));
    }

    #[test]
    fn unordered_edges_are_rejected() {
        let a = array![0.1];
        assert!(make_histograms(&[a.view()], array![0.0, 1.0, 0.5], None).is_err());
    }

    #[test]
    fn centers_are_midpoints() {
        assert_eq!(bin_centers(&array![0.0, 1.0, 3.0]), array![0.5, 2.0]);
    }
}
