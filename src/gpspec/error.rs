use std::error::Error;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum GpError {
    /// The input lacks one or more of the XX, XY, YX, YY products.
    MissingData { telescope: String },
    /// The input matches neither the folded nor the waterfall layout.
    UnrecognizedFormat(String),
    /// The pulse search produced no candidate above threshold.
    NoPulseFound { telescope: String, start_time: String },
    /// A bin window reaches outside the array it is applied to.
    IndexOutOfRange { start: isize, end: isize, len: usize },
    /// Three-point parabola with a vanishing curvature term.
    DegenerateFit(String),
    ShapeMismatch(String),
    InvalidInput(String),
    Npy(String),
    Io(io::Error),
}

impl fmt::Display for GpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GpError::MissingData { telescope } => {
                write!(f, "polarization data is missing for {}", telescope)
            }
            GpError::UnrecognizedFormat(what) => write!(f, "unrecognized input format: {}", what),
            GpError::NoPulseFound {
                telescope,
                start_time,
            } => write!(
                f,
                "no giant pulse found in {} for start time {}",
                telescope, start_time
            ),
            GpError::IndexOutOfRange { start, end, len } => write!(
                f,
                "bin window [{}, {}) lies outside an axis of length {}",
                start, end, len
            ),
            GpError::DegenerateFit(msg) => write!(f, "degenerate fit: {}", msg),
            GpError::ShapeMismatch(msg) => write!(f, "shape mismatch: {}", msg),
            GpError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            GpError::Npy(msg) => write!(f, "NPY error: {}", msg),
            GpError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl Error for GpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GpError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for GpError {
    fn from(err: io::Error) -> GpError {
        GpError::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, GpError>;
