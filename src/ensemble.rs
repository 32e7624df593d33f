//! Averages over independent PMFs and the thermodynamic quantities derived from them.

use crate::errors::*;
use crate::generator::{PmfGenerator, Profile};
use crate::integrate;
use crate::interpolate::CubicSpline;
use crate::simulations::WindowCollection;
use crate::units::EnergyUnit;
use ndarray::{Array1, Array2, ArrayView1};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A derived quantity with its standard error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    #[allow(missing_docs)]
    pub value: f64,
    #[allow(missing_docs)]
    pub uncertainty: f64,
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} ± {:.2}", self.value, self.uncertainty)
    }
}

/// The mean PMF of several independent runs, e.g. repeats or blocks of one simulation set
///
/// Only grid points where every run has a finite value are kept. The runs are stored as the
/// columns of a matrix indexed by `(coordinate, run)`.
#[derive(Debug, Clone)]
pub struct PmfEnsemble {
    z: Array1<f64>,
    /// `None` when the ensemble was read from disk, which keeps only the average
    pmfs: Option<Array2<f64>>,
    av: Array1<f64>,
    std: Array1<f64>,
    unit: EnergyUnit,
    temperature: f64,
}

impl PmfEnsemble {
    /// Apply `generator` to every run and average the resulting PMFs
    ///
    /// Unit and temperature are taken from the first run. With `offset`, every PMF is shifted
    /// to zero at the last retained grid point.
    pub fn make<G: PmfGenerator + ?Sized>(
        runs: &[WindowCollection],
        generator: &G,
        offset: bool,
    ) -> Result<Self> {
        let first = runs.first().ok_or(WhamError::EmptyEnsemble)?;
        let profiles = runs
            .iter()
            .map(|run| generator.pmf(run))
            .collect::<Result<Vec<_>>>()?;
        Self::from_profiles(&profiles, first.unit(), first.temperature(), offset)
    }

    /// Average precomputed profiles, aligned to the grid of the first one
    pub fn from_profiles(
        profiles: &[Profile],
        unit: EnergyUnit,
        temperature: f64,
        offset: bool,
    ) -> Result<Self> {
        let first = profiles.first().ok_or(WhamError::EmptyEnsemble)?;
        let npoints = first.len();
        for (run, profile) in profiles.iter().enumerate() {
            if profile.free.len() != npoints {
                return Err(WhamError::Alignment {
                    run,
                    expected: npoints,
                    found: profile.free.len(),
                });
            }
        }

        let keep: Vec<usize> = (0..npoints)
            .filter(|&i| profiles.iter().all(|p| p.free[i].is_finite()))
            .collect();
        if keep.is_empty() {
            return Err(WhamError::EmptyEnsemble);
        }
        if keep.len() < npoints {
            log::debug!(
                "Dropped {} grid points that are not finite in every run",
                npoints - keep.len()
            );
        }

        let z: Array1<f64> = keep.iter().map(|&i| first.z[i]).collect();
        let mut pmfs =
            Array2::from_shape_fn((keep.len(), profiles.len()), |(r, c)| profiles[c].free[keep[r]]);
        if offset {
            let last = pmfs.row(keep.len() - 1).to_owned();
            for mut row in pmfs.genrows_mut() {
                row -= &last;
            }
        }

        let mut ensemble = Self {
            av: Array1::zeros(z.len()),
            std: Array1::zeros(z.len()),
            z,
            pmfs: Some(pmfs),
            unit,
            temperature,
        };
        ensemble.average(0, None)?;
        Ok(ensemble)
    }

    /// Recompute the mean and standard error over runs `start..end` (all remaining runs if
    /// `end` is `None`)
    ///
    /// The standard error is the population standard deviation over `sqrt(end - start)`.
    pub fn average(&mut self, start: usize, end: Option<usize>) -> Result<()> {
        let pmfs = self.pmfs.as_ref().ok_or(WhamError::EmptyEnsemble)?;
        let runs = pmfs.ncols();
        let end = end.unwrap_or(runs);
        if start >= end || end > runs {
            return Err(WhamError::RunRange { start, end, runs });
        }

        let count = (end - start) as f64;
        let mut av = Array1::zeros(pmfs.nrows());
        let mut std = Array1::zeros(pmfs.nrows());
        for (i, row) in pmfs.genrows().into_iter().enumerate() {
            let values: Vec<f64> = row.iter().skip(start).take(end - start).copied().collect();
            let mean = values.iter().sum::<f64>() / count;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
            av[i] = mean;
            std[i] = var.sqrt() / count.sqrt();
        }
        self.av = av;
        self.std = std;
        Ok(())
    }

    /// Express every energy in `unit`
    pub fn change_unit(&mut self, unit: EnergyUnit) {
        if unit == self.unit {
            return;
        }
        let factor = self.unit.conversion_to(unit);
        if let Some(pmfs) = &mut self.pmfs {
            pmfs.mapv_inplace(|v| v * factor);
        }
        self.av.mapv_inplace(|v| v * factor);
        self.std.mapv_inplace(|v| v * factor);
        self.unit = unit;
    }

    /// Values of the reaction coordinate
    pub fn z(&self) -> &Array1<f64> {
        &self.z
    }

    /// Mean PMF
    pub fn av(&self) -> &Array1<f64> {
        &self.av
    }

    /// Standard error of the mean PMF
    pub fn std(&self) -> &Array1<f64> {
        &self.std
    }

    /// The PMF of every run as the columns of a `(coordinate, run)` matrix
    pub fn pmfs(&self) -> Option<&Array2<f64>> {
        self.pmfs.as_ref()
    }

    /// Number of runs averaged over; zero for an ensemble read from disk
    pub fn runs(&self) -> usize {
        self.pmfs.as_ref().map_or(0, |p| p.ncols())
    }

    /// Energy unit of the PMFs
    pub fn unit(&self) -> EnergyUnit {
        self.unit
    }

    /// $k_B T$ in the current unit
    pub fn kt(&self) -> f64 {
        self.unit.kt(self.temperature)
    }

    /// Write `z`, the mean and its standard error as a table
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "#z-distance PMF Uncert. ({})", self.unit.label())?;
        for ((z, a), s) in self.z.iter().zip(self.av.iter()).zip(self.std.iter()) {
            writeln!(writer, "{:.3} {:.4} {:.4}", z, a, s)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the ensemble to `path`, see [`PmfEnsemble::write_to`]
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write_to(BufWriter::new(File::create(path)?))
    }

    /// Read a table written by [`PmfEnsemble::write_to`]
    ///
    /// Only the average is stored in the table, so the result holds no runs.
    pub fn read_from<R: BufRead>(reader: R, temperature: f64) -> Result<Self> {
        let mut lines = reader.lines();
        let header = lines.next().transpose()?.ok_or(WhamError::Parse {
            line: 1,
            message: "missing header".to_string(),
        })?;
        let label = match (header.find('('), header.rfind(')')) {
            (Some(open), Some(close)) if open < close => &header[open + 1..close],
            _ => {
                return Err(WhamError::Parse {
                    line: 1,
                    message: format!("no energy unit in header {:?}", header),
                })
            }
        };
        let unit: EnergyUnit = label.parse()?;

        let (mut z, mut av, mut std) = (Vec::new(), Vec::new(), Vec::new());
        for (i, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let values = line
                .split_whitespace()
                .map(str::parse::<f64>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| WhamError::Parse {
                    line: i + 2,
                    message: e.to_string(),
                })?;
            if values.len() != 3 {
                return Err(WhamError::Parse {
                    line: i + 2,
                    message: format!("expected 3 columns, found {}", values.len()),
                });
            }
            z.push(values[0]);
            av.push(values[1]);
            std.push(values[2]);
        }
        if z.is_empty() {
            return Err(WhamError::EmptyEnsemble);
        }

        Ok(Self {
            z: Array1::from(z),
            pmfs: None,
            av: Array1::from(av),
            std: Array1::from(std),
            unit,
            temperature,
        })
    }

    /// Read an ensemble from `path`, assuming the simulations were run at 300 K
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_from(BufReader::new(File::open(path)?), 300.0)
    }

    fn argmin(&self) -> usize {
        self.av
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |(best, min), (i, &v)| {
                if v < min {
                    (i, v)
                } else {
                    (best, min)
                }
            })
            .0
    }

    fn last(&self) -> usize {
        self.av.len() - 1
    }

    /// Free energy of transfer to the first grid point
    pub fn transfer_dg(&self) -> Estimate {
        Estimate {
            value: self.av[0],
            uncertainty: self.std[0],
        }
    }

    /// Depth of the global minimum relative to the last grid point
    pub fn waterlipid_barrier(&self) -> Estimate {
        let (i, last) = (self.argmin(), self.last());
        Estimate {
            value: self.av[i] - self.av[last],
            uncertainty: (self.std[last].powi(2) + self.std[i].powi(2)).sqrt(),
        }
    }

    /// Height of the first grid point above the global minimum
    pub fn penetration_barrier(&self) -> Estimate {
        let i = self.argmin();
        Estimate {
            value: self.av[0] - self.av[i],
            uncertainty: (self.std[0].powi(2) + self.std[i].powi(2)).sqrt(),
        }
    }

    /// Boltzmann factors of the mean PMF and their propagated standard errors
    fn boltzmann_factors(&self) -> (Array1<f64>, Array1<f64>) {
        let kt = self.kt();
        let expav = self.av.mapv(|a| (-a / kt).exp());
        let expstd = expav
            .iter()
            .zip(self.std.iter())
            .map(|(e, s)| (e * s / kt).abs())
            .collect();
        (expav, expstd)
    }

    /// Standard binding free energy, `-kT ln(∫exp(-PMF/kT) dz / ∫dz)`
    ///
    /// # References
    ///
    /// 1. Genheden S, Ryde U. Comparison of end-point continuum-solvation methods for the
    /// calculation of protein-ligand binding free energies. J. Chem. Theory Comput.
    /// 7:4175-4188, 2011
    pub fn standard_dg(&self) -> Result<Estimate> {
        let kt = self.kt();
        let (expav, expstd) = self.boltzmann_factors();
        let (bound, bound_err) =
            integrate::trapz_with_error(self.z.view(), expav.view(), expstd.view())?;
        let volume = integrate::trapz(self.z.view(), Array1::<f64>::ones(self.z.len()).view())?;
        Ok(Estimate {
            value: -kt * (bound / volume).ln(),
            uncertainty: (kt * bound_err / bound).abs(),
        })
    }

    /// Partition integral against a reference density profile
    ///
    /// The reference density is tabulated at `density_z`; it is interpolated with a cubic
    /// spline onto the grid, normalized to its maximum and subtracted from the Boltzmann factor
    /// of the mean PMF before integrating. A negative integral is redone with the negative
    /// parts of the integrand set to zero. Returns the raw integral and its standard error.
    ///
    /// # References
    ///
    /// 1. Paloncyova M, Berka K, Otyepka M. Molecular insight into affinities of drugs and
    /// their metabolites to lipid bilayers. J. Chem. Theory Comput. 10:2931-2939, 2014
    pub fn partition(
        &self,
        density_z: ArrayView1<'_, f64>,
        density: ArrayView1<'_, f64>,
    ) -> Result<Estimate> {
        let kt = self.kt();
        let spline = CubicSpline::new(density_z, density)?;
        let mut rho = spline.eval_many(self.z.view())?;
        let max = rho.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        if !(max > 0.0) {
            return Err(WhamError::Integration(
                "reference density has no positive value on the grid".to_string(),
            ));
        }
        rho /= max;

        let (expav, _) = self.boltzmann_factors();
        let mut integrand = expav - &rho;
        let sigma: Array1<f64> = integrand
            .iter()
            .zip(self.std.iter())
            .map(|(e, s)| (e * s / kt).abs())
            .collect();
        let (mut value, mut uncertainty) =
            integrate::trapz_with_error(self.z.view(), integrand.view(), sigma.view())?;

        if value < 0.0 {
            integrand.mapv_inplace(|v| v.max(0.0));
            let clipped = integrate::trapz_with_error(self.z.view(), integrand.view(), sigma.view())?;
            value = clipped.0;
            uncertainty = clipped.1;
        }

        Ok(Estimate { value, uncertainty })
    }
}
