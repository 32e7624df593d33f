//! WHAM carried out by the `wham` program of the Grossfield lab.
//!
//! The program reads one trajectory file per window and a metadata file listing them, and
//! writes the unbiased free energy and the window free energies to a single output file. All of
//! these files live in a temporary directory that is removed when the solve finishes, whether it
//! succeeds or not, so independent solves never share files.

use crate::errors::*;
use crate::generator::{PmfGenerator, Profile};
use crate::simulations::WindowCollection;
use crate::wham::{Convergence, WhamBackend, WhamResult};
use ndarray::Array1;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

const META_FILE: &str = "wham_meta";
const FREE_FILE: &str = "wham_free";

fn default_program() -> PathBuf {
    std::env::var_os("WHAM")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("wham"))
}

/// Options of the external WHAM program
///
/// The program is taken from `$WHAM` unless set explicitly, and otherwise looked up on the
/// `PATH` as `wham`.
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(build_fn(validate = "Self::validate", name = "build_inner", private))]
pub struct ExternalWham {
    /// Path to the executable
    #[builder(default = "default_program()", setter(into))]
    program: PathBuf,

    /// Convergence tolerance passed to the program
    #[builder(default = "1.0e-5")]
    tolerance: f64,

    /// Directory in which the temporary directory is created; the system default if `None`
    #[builder(default, setter(into))]
    workdir: Option<PathBuf>,
}

impl ExternalWhamBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(tolerance) = self.tolerance {
            if !(tolerance.is_finite() && tolerance > 0.0) {
                return Err(format!("tolerance must be positive, not {}", tolerance));
            }
        }
        Ok(())
    }

    /// Build the external WHAM options
    pub fn build(&self) -> Result<ExternalWham> {
        Ok(self.build_inner()?)
    }
}

impl Default for ExternalWham {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("ExternalWham should not fail with default params")
    }
}

impl ExternalWham {
    /// Get a new builder for the external WHAM options
    pub fn builder() -> ExternalWhamBuilder {
        ExternalWhamBuilder::default()
    }

    /// Path to the executable
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn tempdir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("wham");
        let dir = match &self.workdir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    /// Write one trajectory file per window and the metadata file into `dir`
    ///
    /// Trajectory rows are `index coordinate [energy]`; metadata rows are
    /// `path center weight [1 temperature]`, the trailing pair only when total energies are
    /// present. Returns the path of the metadata file.
    fn write_inputs(&self, simulations: &WindowCollection, dir: &Path) -> Result<PathBuf> {
        let energies = simulations.has_energies();
        let meta_path = dir.join(META_FILE);
        let mut meta = BufWriter::new(File::create(&meta_path)?);

        for (i, window) in simulations.windows().iter().enumerate() {
            let traj_path = dir.join(format!("traj{}", i));
            let mut traj = BufWriter::new(File::create(&traj_path)?);
            for (j, x) in window.samples().iter().enumerate() {
                write!(traj, "{} {:.8}", j + 1, x)?;
                if let (true, Some(e)) = (energies, window.energies()) {
                    write!(traj, " {:.8}", e[j])?;
                }
                writeln!(traj)?;
            }
            traj.flush()?;

            write!(
                meta,
                "{} {:.4} {:.4}",
                traj_path.display(),
                window.center(),
                window.weight()
            )?;
            if energies {
                write!(meta, " 1 {:.4}", simulations.temperature())?;
            }
            writeln!(meta)?;
        }
        meta.flush()?;
        Ok(meta_path)
    }
}

fn field(line: &str, column: usize, lineno: usize) -> Result<f64> {
    let token = line.split_whitespace().nth(column).ok_or_else(|| {
        WhamError::ExternalTool(format!(
            "line {} of the free energy file has no column {}",
            lineno, column
        ))
    })?;
    token.parse().map_err(|_| {
        WhamError::ExternalTool(format!(
            "line {} of the free energy file: {:?} is not a number",
            lineno, token
        ))
    })
}

/// Parse the output of the program
///
/// A header line, then one row per bin with the free energy in the second and the probability
/// in the fourth column, then another header and one row per window with its free energy in the
/// second column. Returns `(free, prob, f)`.
fn read_free_file<R: BufRead>(
    reader: R,
    nbins: usize,
    nwindows: usize,
) -> Result<(Array1<f64>, Array1<f64>, Array1<f64>)> {
    let mut lines = reader.lines().enumerate();
    let mut next_line = |what: &str| -> Result<(usize, String)> {
        match lines.next() {
            Some((i, line)) => Ok((i + 1, line?)),
            None => Err(WhamError::ExternalTool(format!(
                "free energy file ended before the {}",
                what
            ))),
        }
    };

    next_line("bin table header")?;
    let mut free = Array1::zeros(nbins);
    let mut prob = Array1::zeros(nbins);
    for b in 0..nbins {
        let (lineno, line) = next_line("end of the bin table")?;
        free[b] = field(&line, 1, lineno)?;
        prob[b] = field(&line, 3, lineno)?;
    }

    next_line("window table header")?;
    let mut f = Array1::zeros(nwindows);
    for i in 0..nwindows {
        let (lineno, line) = next_line("end of the window table")?;
        f[i] = field(&line, 1, lineno)?;
    }

    Ok((free, prob, f))
}

impl WhamBackend for ExternalWham {
    /// Run the program on the histogrammed collection
    ///
    /// The program does not report how many iterations it needed; the result is reported as
    /// converged after zero iterations, with the tolerance as its error.
    fn solve(&self, simulations: &WindowCollection) -> Result<WhamResult> {
        let bins = simulations.bins().ok_or(WhamError::NotHistogrammed)?;
        let z = simulations.bin_centers().ok_or(WhamError::NotHistogrammed)?;
        let nbins = bins.len() - 1;

        let dir = self.tempdir()?;
        let meta = self.write_inputs(simulations, dir.path())?;
        let free_path = dir.path().join(FREE_FILE);

        log::info!(
            "Running {} on {} windows in {}",
            self.program.display(),
            simulations.len(),
            dir.path().display()
        );
        let output = Command::new(&self.program)
            .arg(format!("{:.4}", bins[0]))
            .arg(format!("{:.4}", bins[nbins]))
            .arg(nbins.to_string())
            .arg(format!("{:e}", self.tolerance))
            .arg(format!("{:.2}", simulations.temperature()))
            .arg("0")
            .arg(&meta)
            .arg(&free_path)
            .output()
            .map_err(|e| {
                WhamError::ExternalTool(format!("could not run {}: {}", self.program.display(), e))
            })?;
        if !output.status.success() {
            return Err(WhamError::ExternalTool(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let file = File::open(&free_path).map_err(|e| {
            WhamError::ExternalTool(format!("no free energy file was written: {}", e))
        })?;
        let (free, prob, f) = read_free_file(BufReader::new(file), nbins, simulations.len())?;
        dir.close()?;

        Ok(WhamResult {
            z,
            f,
            prob,
            free,
            convergence: Convergence::Converged {
                iterations: 0,
                max_error: self.tolerance,
            },
        })
    }
}

impl PmfGenerator for ExternalWham {
    fn pmf(&self, simulations: &WindowCollection) -> Result<Profile> {
        Ok(self.solve(simulations)?.profile())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsystems::HarmonicWindows;
    use crate::units::EnergyUnit;
    use crate::window::Window;
    use crate::wham::Wham;
    use ndarray::array;
    use std::io::Cursor;

    const FREE: &str = "#Coor\tFree\t+/-\tProb\t+/-\n\
        0.125 0.000 0.0 0.40 0.0\n\
        0.375 0.500 0.0 0.30 0.0\n\
        0.625 inf 0.0 0.00 0.0\n\
        0.875 1.250 0.0 0.30 0.0\n\
        #Window\tFree\t+/-\n\
        0 -0.75 0.0\n\
        1 0.00 0.0\n";

    fn small_collection(energies: bool) -> WindowCollection {
        let mut sims = WindowCollection::new(300.0, EnergyUnit::KcalMol);
        for &center in &[0.25, 0.75] {
            let mut w = Window::new(center, 10.0, array![center - 0.1, center, center + 0.1]);
            if energies {
                w = w.with_energies(array![-1.0, -2.0, -3.0]).unwrap();
            }
            sims.add(w).unwrap();
        }
        sims.make_histograms(4_usize, Some((0.0, 1.0)), false).unwrap();
        sims
    }

    #[test]
    fn free_file_is_parsed() {
        let (free, prob, f) = read_free_file(Cursor::new(FREE), 4, 2).unwrap();
        assert_eq!(free[1], 0.5);
        assert!(free[2].is_infinite());
        assert_eq!(prob, array![0.4, 0.3, 0.0, 0.3]);
        assert_eq!(f, array![-0.75, 0.0]);
    }

    #[test]
    fn short_free_file_is_an_error() {
        let truncated: String = FREE.lines().take(4).map(|l| format!("{}\n", l)).collect();
        assert!(matches!(
            read_free_file(Cursor::new(truncated), 4, 2),
            Err(WhamError::ExternalTool(_))
        ));
        let garbled = FREE.replace("0.500", "half");
        assert!(matches!(
            read_free_file(Cursor::new(garbled), 4, 2),
            Err(WhamError::ExternalTool(_))
        ));
    }

    #[test]
    fn inputs_follow_program_format() {
        let dir = tempfile::tempdir().unwrap();
        let sims = small_collection(true);
        let meta = ExternalWham::default()
            .write_inputs(&sims, dir.path())
            .unwrap();

        let meta = std::fs::read_to_string(meta).unwrap();
        let rows: Vec<&str> = meta.lines().collect();
        assert_eq!(rows.len(), 2);
        let first: Vec<&str> = rows[0].split_whitespace().collect();
        assert!(first[0].ends_with("traj0"));
        assert_eq!(&first[1..], &["0.2500", "10.0000", "1", "300.0000"]);

        let traj = std::fs::read_to_string(dir.path().join("traj1")).unwrap();
        assert_eq!(traj.lines().next(), Some("1 0.65000000 -1.00000000"));
        assert_eq!(traj.lines().count(), 3);
    }

    #[test]
    fn inputs_without_energies() {
        let dir = tempfile::tempdir().unwrap();
        let sims = small_collection(false);
        let meta = ExternalWham::default()
            .write_inputs(&sims, dir.path())
            .unwrap();
        let meta = std::fs::read_to_string(meta).unwrap();
        assert_eq!(meta.lines().next().map(|l| l.split_whitespace().count()), Some(3));
        let traj = std::fs::read_to_string(dir.path().join("traj0")).unwrap();
        assert_eq!(traj.lines().next(), Some("1 0.15000000"));
    }

    #[test]
    fn requires_histograms() {
        let sims = HarmonicWindows::default().sample().unwrap();
        assert!(matches!(
            ExternalWham::default().solve(&sims),
            Err(WhamError::NotHistogrammed)
        ));
    }

    #[test]
    fn missing_program_is_an_external_failure() {
        let workdir = tempfile::tempdir().unwrap();
        let external = ExternalWham::builder()
            .program("/nonexistent/wham")
            .workdir(workdir.path().to_path_buf())
            .build()
            .unwrap();
        assert!(matches!(
            external.solve(&small_collection(false)),
            Err(WhamError::ExternalTool(_))
        ));
        assert_eq!(std::fs::read_dir(workdir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-wham");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn output_of_program_is_read_back() {
        let bindir = tempfile::tempdir().unwrap();
        let workdir = tempfile::tempdir().unwrap();
        let program = script(bindir.path(), &format!("cat > \"$8\" <<'EOF'\n{}EOF", FREE));
        let external = ExternalWham::builder()
            .program(program)
            .workdir(workdir.path().to_path_buf())
            .build()
            .unwrap();

        let sims = small_collection(false);
        let result = external.solve(&sims).unwrap();
        assert_eq!(result.z, sims.bin_centers().unwrap());
        assert_eq!(result.f, array![-0.75, 0.0]);
        assert_eq!(result.prob, array![0.4, 0.3, 0.0, 0.3]);
        assert!(result.convergence.is_converged());
        assert_eq!(std::fs::read_dir(workdir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_cleans_up() {
        let bindir = tempfile::tempdir().unwrap();
        let workdir = tempfile::tempdir().unwrap();
        let external = ExternalWham::builder()
            .program(script(bindir.path(), "echo broken >&2\nexit 3"))
            .workdir(workdir.path().to_path_buf())
            .build()
            .unwrap();
        match external.solve(&small_collection(false)) {
            Err(WhamError::ExternalTool(message)) => assert!(message.contains("broken")),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(std::fs::read_dir(workdir.path()).unwrap().count(), 0);
    }

    #[test]
    #[ignore = "needs the wham program in $WHAM"]
    fn agrees_with_in_process_solver() {
        let mut sims = HarmonicWindows::default().sample().unwrap();
        sims.make_histograms(20_usize, Some((-1.0, 2.0)), true).unwrap();
        let internal = Wham::default().solve(&sims).unwrap();
        let external = ExternalWham::default().solve(&sims).unwrap();
        for (a, b) in internal.prob.iter().zip(external.prob.iter()) {
            assert!((a - b).abs() < 1e-3, "{} != {}", a, b);
        }
    }
}
