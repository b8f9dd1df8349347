//! `.npy` input: folded spectra with their sample counts, or pre-reduced
//! waterfalls. The layout is recognised from the file name.

use chrono::{DateTime, Utc};
use log::{info, warn};
use ndarray::{Array3, Array4, Axis};
use ndarray_npy::read_npy;
use std::path::{Path, PathBuf};

use crate::error::{GpError, Result};
use crate::observation::{FrequencyBand, Observation, N_POL};
use crate::spectrum::DynamicSpectrum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Folded,
    Waterfall,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| GpError::UnrecognizedFormat(path.display().to_string()))?;
        if name.contains("foldspec") {
            Ok(InputFormat::Folded)
        } else if name.contains("waterfall") {
            Ok(InputFormat::Waterfall)
        } else {
            Err(GpError::UnrecognizedFormat(format!(
                "{}: expected 'foldspec' or 'waterfall' in the file name",
                path.display()
            )))
        }
    }
}

/// Path of the count array belonging to a folded spectrum.
pub fn count_path(foldspec: &Path) -> Result<PathBuf> {
    let name = foldspec
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| GpError::UnrecognizedFormat(foldspec.display().to_string()))?;
    Ok(foldspec.with_file_name(name.replace("foldspec", "icount")))
}

macro_rules! read_as_f64 {
    ($path:expr, $array:ident, $($ty:ty),+) => {{
        let path: &Path = $path;
        let mut last_error = String::new();
        let mut loaded = None;
        $(
            if loaded.is_none() {
                match read_npy::<_, $array<$ty>>(path) {
                    Ok(array) => loaded = Some(array.mapv(|v: $ty| v as f64)),
                    Err(e) => last_error = e.to_string(),
                }
            }
        )+
        loaded.ok_or_else(|| GpError::Npy(format!("{}: {}", path.display(), last_error)))
    }};
}

fn read_sums(path: &Path) -> Result<Array4<f64>> {
    read_as_f64!(path, Array4, f64, f32)
}

fn read_counts(path: &Path) -> Result<Array3<f64>> {
    read_as_f64!(path, Array3, i64, i32, f64, f32)
}

fn read_waterfall(path: &Path) -> Result<Array3<f64>> {
    read_as_f64!(path, Array3, f64, f32)
}

/// Raw array of one observation as stored on disk.
#[derive(Debug, Clone)]
pub enum RawArray {
    /// Sums `(fold, channel, phase, pol)` and sample counts `(fold, channel, phase)`.
    Folded {
        sums: Array4<f64>,
        counts: Array3<f64>,
    },
    /// Already-normalised `(channel, time, pol)`.
    Waterfall(Array3<f64>),
}

impl RawArray {
    pub fn load(path: &Path) -> Result<Self> {
        match InputFormat::from_path(path)? {
            InputFormat::Folded => {
                let sums = read_sums(path)?;
                let counts = read_counts(&count_path(path)?)?;
                info!(
                    "loaded folded spectrum {} with shape {:?}",
                    path.display(),
                    sums.dim()
                );
                Ok(RawArray::Folded { sums, counts })
            }
            InputFormat::Waterfall => {
                // (time, channel, pol) on disk.
                let mut data = read_waterfall(path)?;
                data.swap_axes(0, 1);
                info!(
                    "loaded waterfall {} with shape {:?}",
                    path.display(),
                    data.dim()
                );
                Ok(RawArray::Waterfall(data.as_standard_layout().to_owned()))
            }
        }
    }

    fn n_pol(&self) -> usize {
        match self {
            RawArray::Folded { sums, .. } => sums.len_of(Axis(3)),
            RawArray::Waterfall(data) => data.len_of(Axis(2)),
        }
    }

    /// Phase bins per fold; `None` for a waterfall.
    pub fn n_phase(&self) -> Option<usize> {
        match self {
            RawArray::Folded { sums, .. } => Some(sums.len_of(Axis(2))),
            RawArray::Waterfall(_) => None,
        }
    }

    /// Bin width implied by the fold duration. Waterfalls carry no phase
    /// axis, so their bin width has to come from elsewhere.
    pub fn folded_bin_width(&self, deltat: f64) -> Option<f64> {
        self.n_phase()
            .filter(|&n| n > 0)
            .map(|n| deltat / n as f64)
    }

    /// `(channel, time bin, pol)` spectrum of one fold, or of the whole waterfall.
    /// Zero-count cells become NaN.
    pub fn dynamic_spectrum(&self, fold_index: usize, telescope: &str) -> Result<DynamicSpectrum> {
        if self.n_pol() != N_POL {
            return Err(GpError::MissingData {
                telescope: telescope.to_string(),
            });
        }
        match self {
            RawArray::Waterfall(data) => DynamicSpectrum::new(data.clone()),
            RawArray::Folded { sums, counts } => {
                let (n_fold, n_chan, n_phase, _) = sums.dim();
                if counts.dim() != (n_fold, n_chan, n_phase) {
                    return Err(GpError::UnrecognizedFormat(format!(
                        "count array shape {:?} does not match spectrum shape {:?}",
                        counts.dim(),
                        sums.dim()
                    )));
                }
                if fold_index >= n_fold {
                    return Err(GpError::IndexOutOfRange {
                        start: fold_index as isize,
                        end: fold_index as isize + 1,
                        len: n_fold,
                    });
                }
                let fold = sums.index_axis(Axis(0), fold_index);
                let count = counts.index_axis(Axis(0), fold_index);
                let data = Array3::from_shape_fn((n_chan, n_phase, N_POL), |(c, t, p)| {
                    let n = count[[c, t]];
                    if n > 0.0 {
                        fold[[c, t, p]] / n
                    } else {
                        f64::NAN
                    }
                });
                DynamicSpectrum::new(data)
            }
        }
    }
}

/// Everything needed to turn one file into an [`Observation`] and its spectrum.
#[derive(Debug, Clone)]
pub struct ObservationSource {
    pub path: PathBuf,
    pub telescope: String,
    pub start_time: DateTime<Utc>,
    /// Fold duration [s].
    pub deltat: f64,
    /// Bin width [s]; required for waterfalls, derived from `deltat` for folded input.
    pub bin_width: Option<f64>,
    pub band: FrequencyBand,
    pub clean_channels: Option<Vec<usize>>,
}

impl ObservationSource {
    pub fn load(&self, fold_index: usize) -> Result<(Observation, DynamicSpectrum)> {
        let raw = RawArray::load(&self.path)?;
        let bin_width = match (raw.folded_bin_width(self.deltat), self.bin_width) {
            (Some(folded), Some(given)) => {
                if (folded - given).abs() > 1e-9 * folded {
                    warn!(
                        "{}: given bin width {} s overrides {} s implied by the fold",
                        self.telescope, given, folded
                    );
                }
                given
            }
            (Some(folded), None) => folded,
            (None, Some(given)) => given,
            (None, None) => {
                return Err(GpError::InvalidInput(format!(
                    "{}: a waterfall needs an explicit bin width",
                    self.path.display()
                )))
            }
        };
        let spectrum = raw.dynamic_spectrum(fold_index, &self.telescope)?;
        let observation = Observation::new(
            self.telescope.clone(),
            self.start_time,
            self.deltat,
            bin_width,
            self.band,
            self.clean_channels.clone(),
        )?;
        Ok((observation, spectrum))
    }
}
