use thiserror::Error;

/// Enum for errors in this crate
#[derive(Error, Debug)]
pub enum WhamError {
    /// Error returned when a builder's build() was called improperly
    #[error("Could not build options: {0}")]
    BuilderError(String),

    /// Error returned when an array is the wrong length
    #[error("Array of length {0} is incorrect; length should be {1}")]
    ArrayLengthMismatch(usize, usize),

    /// A window holds too few samples for the requested operation
    #[error("Histogram construction: window {window} has {found} samples, which is too few")]
    InsufficientSamples {
        /// Index of the offending window
        window: usize,
        /// Number of samples it holds
        found: usize,
    },

    /// Total energies must be given for every window or for none of them
    #[error("Window {window} disagrees with the collection on whether total energies are present")]
    MixedEnergies {
        /// Index the window would have had in the collection
        window: usize,
    },

    /// The solver was asked to run before the collection was histogrammed
    #[error("Solver iteration: the window collection has not been histogrammed")]
    NotHistogrammed,

    /// The solver was given a collection without windows
    #[error("Solver iteration: the window collection holds no windows")]
    NoWindows,

    /// The iteration produced free energies or probabilities that are not finite
    #[error("Solver iteration: non-finite bias free energy or probability at iteration {iteration}")]
    NonFinite {
        #[allow(missing_docs)]
        iteration: usize,
    },

    /// Bin edges are degenerate or out of order
    #[error("Histogram construction: invalid bins ({0})")]
    InvalidBins(String),

    /// A run of the ensemble does not share the coordinate grid of the first run
    #[error("Ensemble alignment: run {run} has {found} grid points, expected {expected}")]
    Alignment {
        #[allow(missing_docs)]
        run: usize,
        #[allow(missing_docs)]
        expected: usize,
        #[allow(missing_docs)]
        found: usize,
    },

    /// The ensemble holds no runs or no finite coordinates
    #[error("Ensemble alignment: no runs or no finite grid points to average")]
    EmptyEnsemble,

    /// Averaging was requested over an empty or out-of-bounds run range
    #[error("Ensemble averaging: runs {start}..{end} is not a valid range of {runs} runs")]
    RunRange {
        #[allow(missing_docs)]
        start: usize,
        #[allow(missing_docs)]
        end: usize,
        #[allow(missing_docs)]
        runs: usize,
    },

    /// Integration could not be carried out
    #[error("Integration: {0}")]
    Integration(String),

    /// A point lies outside the range of an interpolated profile
    #[error("Integration: cannot interpolate at {z}, data only covers [{min}, {max}]")]
    Interpolation {
        #[allow(missing_docs)]
        z: f64,
        #[allow(missing_docs)]
        min: f64,
        #[allow(missing_docs)]
        max: f64,
    },

    /// A least-squares fit did not converge
    #[error("Curve fit failed: {0}")]
    CurveFit(String),

    /// The external WHAM program failed or produced unreadable output
    #[error("External WHAM program failed: {0}")]
    ExternalTool(String),

    /// A text file could not be parsed
    #[error("Parse error on line {line}: {message}")]
    Parse {
        #[allow(missing_docs)]
        line: usize,
        #[allow(missing_docs)]
        message: String,
    },

    /// A sample file format names a column that cannot exist
    #[error("Reading samples: invalid column ({0})")]
    InvalidColumn(String),

    /// An energy unit label was not recognised
    #[error("Unknown energy unit {0:?}; expected \"kJ/mol\" or \"kcal/mol\"")]
    UnknownUnit(String),

    /// Synthetic samples could not be drawn
    #[error("Could not resample window: {0}")]
    Sampling(String),

    /// Error returned when reading or writing files
    #[error("I/O error")]
    Io {
        #[allow(missing_docs)]
        #[from]
        source: std::io::Error,
    },
}

impl From<String> for WhamError {
    fn from(s: String) -> Self {
        Self::BuilderError(s)
    }
}

/// Result type for the wham-rs crate
pub type Result<T> = std::result::Result<T, WhamError>;
