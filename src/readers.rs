//! Readers for the sample files written by common simulation engines.
//!
//! Lengths are converted to Ångström and forces to kcal/mol/Å, irrespective of the engine.

use crate::errors::*;
use crate::units::KJ_PER_KCAL;
use crate::window::Window;
use ndarray::Array1;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const NM_TO_ANGSTROM: f64 = 10.0;

/// Layout of a file of umbrella samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsFormat {
    /// A Gromacs `pullx` file, or a `pullf` file if `forces` is set
    ///
    /// `column` is the zero-based column to read and defaults to 2, or to 1 for `pullf` files,
    /// which lack the reference column. Positions read from any other column are negated, and
    /// made positive when the window center is positive.
    Gromacs {
        #[allow(missing_docs)]
        column: Option<usize>,
        #[allow(missing_docs)]
        forces: bool,
    },
    /// A Plumed `COLVAR` file
    ///
    /// `column` is one-based and defaults to 2, the first field after the time. Any other column
    /// is negated. Values are made positive for positive window centers unless `expansion` is set.
    Plumed {
        #[allow(missing_docs)]
        column: Option<usize>,
        #[allow(missing_docs)]
        expansion: bool,
    },
    /// A Lammps colvars file; with a `stride`, only the first row and every `stride`-th after it
    /// are read
    Lammps {
        #[allow(missing_docs)]
        stride: Option<usize>,
    },
    /// Any file whose second column holds the values, e.g. a total-energy trace
    TwoColumn,
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#')
}

fn parse_field(line: &str, column: usize, lineno: usize) -> Result<Option<f64>> {
    match line.split_whitespace().nth(column) {
        Some(token) => token.parse().map(Some).map_err(|_| WhamError::Parse {
            line: lineno,
            message: format!("{:?} is not a number", token),
        }),
        None => Ok(None),
    }
}

impl ResultsFormat {
    /// Read the samples of one window
    pub fn read_samples<R: BufRead>(&self, reader: R, center: f64) -> Result<Array1<f64>> {
        if let Self::Gromacs {
            column: Some(0),
            forces: true,
        } = *self
        {
            return Err(WhamError::InvalidColumn(
                "column 0 of a pullf file is the time, not a force".to_string(),
            ));
        }

        let mut data = Vec::new();
        let mut nread = 0;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let lineno = i + 1;
            match *self {
                Self::Gromacs { column, forces } => {
                    if is_comment(&line) || line.starts_with('@') || line.len() < 4 {
                        continue;
                    }
                    let column = column.unwrap_or(2) - usize::from(forces);
                    if let Some(value) = parse_field(&line, column, lineno)? {
                        data.push(value);
                    }
                }
                Self::Plumed { column, .. } => {
                    if is_comment(&line) || line.trim().is_empty() {
                        continue;
                    }
                    let column = column.map_or(1, |c| c.saturating_sub(1));
                    let value = parse_field(&line, column, lineno)?.ok_or(WhamError::Parse {
                        line: lineno,
                        message: format!("no column {}", column),
                    })?;
                    data.push(value);
                }
                Self::Lammps { stride } => {
                    if is_comment(&line) {
                        continue;
                    }
                    nread += 1;
                    let keep = match stride {
                        Some(stride) if stride > 0 => nread == 1 || (nread - 1) % stride == 0,
                        _ => true,
                    };
                    if keep {
                        if let Some(value) = parse_field(&line, 1, lineno)? {
                            data.push(value);
                        }
                    }
                }
                Self::TwoColumn => {
                    if is_comment(&line) || line.trim().is_empty() {
                        continue;
                    }
                    let value = parse_field(&line, 1, lineno)?.ok_or(WhamError::Parse {
                        line: lineno,
                        message: "expected two columns".to_string(),
                    })?;
                    data.push(value);
                }
            }
        }

        let mut samples = Array1::from(data);
        match *self {
            Self::Gromacs { forces: true, .. } => {
                samples.mapv_inplace(|f| f / NM_TO_ANGSTROM / KJ_PER_KCAL);
            }
            Self::Gromacs { column, .. } => {
                samples.mapv_inplace(|x| x * NM_TO_ANGSTROM);
                if column.unwrap_or(2) != 2 {
                    samples.mapv_inplace(|x| -x);
                }
                if center > 0.0 {
                    samples.mapv_inplace(f64::abs);
                }
            }
            Self::Plumed { column, expansion } => {
                samples.mapv_inplace(|x| x * NM_TO_ANGSTROM);
                if column.map_or(1, |c| c.saturating_sub(1)) != 1 {
                    samples.mapv_inplace(|x| -x);
                }
                if center > 0.0 && !expansion {
                    samples.mapv_inplace(f64::abs);
                }
            }
            Self::Lammps { .. } | Self::TwoColumn => {}
        }
        Ok(samples)
    }

    /// Read the samples of the window restrained at `center` with stiffness `weight`
    pub fn read<R: BufRead>(&self, reader: R, center: f64, weight: f64) -> Result<Window> {
        Ok(Window::new(center, weight, self.read_samples(reader, center)?))
    }

    /// Read a window from the file at `path`
    pub fn read_path<P: AsRef<Path>>(&self, path: P, center: f64, weight: f64) -> Result<Window> {
        self.read(BufReader::new(File::open(path)?), center, weight)
    }

    /// Read a window and attach the total energies in the second column of `energies`
    pub fn read_with_energies<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        path: P,
        energies: Q,
        center: f64,
        weight: f64,
    ) -> Result<Window> {
        let window = self.read_path(path, center, weight)?;
        let energies = Self::TwoColumn.read_samples(BufReader::new(File::open(energies)?), center)?;
        window.with_energies(energies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::io::Cursor;

    const PULLX: &str = "# gmx pullx\n\
        @    title \"Pull COM\"\n\
        @ xaxis  label \"Time (ps)\"\n\
        0.0000\t1.0\t0.150\t-0.20\n\
        2.0000\t1.0\t0.170\t-0.25\n\
        \n\
        4.0000\t1.0\t-0.110\t-0.30\n";

    #[test]
    fn gromacs_positions_are_angstrom() {
        let format = ResultsFormat::Gromacs {
            column: None,
            forces: false,
        };
        let samples = format.read_samples(Cursor::new(PULLX), 0.0).unwrap();
        assert_eq!(samples.len(), 3);
        assert_abs_diff_eq!(samples[0], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(samples[2], -1.1, epsilon = 1e-12);

        let positive = format.read_samples(Cursor::new(PULLX), 2.0).unwrap();
        assert_abs_diff_eq!(positive[2], 1.1, epsilon = 1e-12);
    }

    #[test]
    fn gromacs_other_column_is_negated() {
        let format = ResultsFormat::Gromacs {
            column: Some(3),
            forces: false,
        };
        let samples = format.read_samples(Cursor::new(PULLX), -1.0).unwrap();
        assert_abs_diff_eq!(samples[1], 2.5, epsilon = 1e-12);
    }

    #[test]
    fn gromacs_forces_are_converted() {
        let pullf = "# forces\n0.0000\t41.84\n2.0000\t-83.68\n";
        let format = ResultsFormat::Gromacs {
            column: None,
            forces: true,
        };
        let forces = format.read_samples(Cursor::new(pullf), 1.0).unwrap();
        assert_abs_diff_eq!(forces[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(forces[1], -2.0, epsilon = 1e-12);
    }

    #[test]
    fn gromacs_force_column_must_follow_time() {
        let format = ResultsFormat::Gromacs {
            column: Some(0),
            forces: true,
        };
        assert!(matches!(
            format.read_samples(Cursor::new(""), 1.0),
            Err(WhamError::InvalidColumn(_))
        ));
    }

    #[test]
    fn gromacs_short_rows_are_read() {
        let format = ResultsFormat::Gromacs {
            column: None,
            forces: true,
        };
        let forces = format.read_samples(Cursor::new("1 84\n\n12\n"), 1.0).unwrap();
        assert_eq!(forces.len(), 1);
        assert_abs_diff_eq!(forces[0], 84.0 / 10.0 / 4.184, epsilon = 1e-12);
    }

    #[test]
    fn plumed_colvar() {
        let colvar = "#! FIELDS time cv\n0 0.20\n1 -0.30\n";
        let plain = ResultsFormat::Plumed {
            column: None,
            expansion: false,
        };
        assert_eq!(
            plain.read_samples(Cursor::new(colvar), 1.0).unwrap(),
            array![2.0, 3.0]
        );
        let expansion = ResultsFormat::Plumed {
            column: Some(2),
            expansion: true,
        };
        assert_eq!(
            expansion.read_samples(Cursor::new(colvar), 1.0).unwrap(),
            array![2.0, -3.0]
        );
        assert!(plain.read_samples(Cursor::new("0\n"), 0.0).is_err());
    }

    #[test]
    fn lammps_stride() {
        let colvars = "# step cv\n0 1.0\n1 2.0\n2 3.0\n3 4.0\n4 5.0\n";
        let every = ResultsFormat::Lammps { stride: None };
        assert_eq!(every.read_samples(Cursor::new(colvars), 0.0).unwrap().len(), 5);
        let strided = ResultsFormat::Lammps { stride: Some(2) };
        assert_eq!(
            strided.read_samples(Cursor::new(colvars), 0.0).unwrap(),
            array![1.0, 3.0, 5.0]
        );
    }

    #[test]
    fn two_column_errors_name_the_line() {
        let text = "# energies\n0 -10.5\n1 oops\n";
        match ResultsFormat::TwoColumn.read_samples(Cursor::new(text), 0.0) {
            Err(WhamError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn window_with_energies_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let samples = dir.path().join("colvar");
        let energies = dir.path().join("energies");
        std::fs::write(&samples, "0 1.0\n1 2.0\n").unwrap();
        std::fs::write(&energies, "# E\n0 -5.0\n1 -6.0\n").unwrap();

        let window = ResultsFormat::Lammps { stride: None }
            .read_with_energies(&samples, &energies, 1.5, 10.0)
            .unwrap();
        assert_eq!(window.center(), 1.5);
        assert_eq!(window.samples(), &array![1.0, 2.0]);
        assert_eq!(window.energies().unwrap(), &array![-5.0, -6.0]);

        std::fs::write(&energies, "0 -5.0\n").unwrap();
        assert!(ResultsFormat::Lammps { stride: None }
            .read_with_energies(&samples, &energies, 1.5, 10.0)
            .is_err());
    }
}
