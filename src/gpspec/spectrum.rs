//! Dynamic spectra, windowed cutouts and the pulse spectrum.
//!
//! Every array here is laid out `(channel, time bin, polarization)` with the
//! polarization axis ordered XX, XY, YX, YY. Missing cells (zero sample count
//! in the folded input) are NaN and are skipped by every reduction.

use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};
use std::ops::Range;

use crate::config::BinRounding;
use crate::error::{GpError, Result};
use crate::observation::{Polarization, N_POL};
use crate::stats::{finite_mean, finite_sum};

/// Number of bins spanned by `width` seconds. A ratio within 1e-9 of an
/// integer counts as that integer before `rounding` applies.
pub fn bins_for(width: f64, bin_width: f64, rounding: BinRounding) -> usize {
    let ratio = width / bin_width;
    let n = if (ratio - ratio.round()).abs() < 1e-9 {
        ratio.round()
    } else {
        match rounding {
            BinRounding::Floor => ratio.floor(),
            BinRounding::Ceil => ratio.ceil(),
        }
    };
    n.max(0.0) as usize
}

/// Validates a bin window against an axis of length `len`.
pub fn check_window(bins: &Range<isize>, len: usize) -> Result<Range<usize>> {
    if bins.start < 0 || bins.end > len as isize || bins.start > bins.end {
        return Err(GpError::IndexOutOfRange {
            start: bins.start,
            end: bins.end,
            len,
        });
    }
    if bins.start == bins.end {
        return Err(GpError::InvalidInput(format!(
            "empty bin window [{}, {})",
            bins.start, bins.end
        )));
    }
    Ok(bins.start as usize..bins.end as usize)
}

/// Averages consecutive groups of `factor` samples. A trailing partial group is
/// kept as its own bin.
pub fn downsample(series: ArrayView1<f64>, factor: usize) -> Array1<f64> {
    let factor = factor.max(1);
    series
        .axis_chunks_iter(Axis(0), factor)
        .map(|chunk| finite_mean(chunk.iter()).unwrap_or(f64::NAN))
        .collect()
}

/// Full-resolution dynamic spectrum of one observation.
#[derive(Debug, Clone)]
pub struct DynamicSpectrum {
    data: Array3<f64>,
}

impl DynamicSpectrum {
    pub fn new(data: Array3<f64>) -> Result<Self> {
        if data.len_of(Axis(2)) != N_POL {
            return Err(GpError::ShapeMismatch(format!(
                "expected {} polarization products, found {}",
                N_POL,
                data.len_of(Axis(2))
            )));
        }
        if data.len_of(Axis(0)) == 0 || data.len_of(Axis(1)) == 0 {
            return Err(GpError::ShapeMismatch(
                "dynamic spectrum has an empty channel or time axis".to_string(),
            ));
        }
        Ok(DynamicSpectrum { data })
    }

    pub fn n_chan(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn n_time(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn view(&self) -> ArrayView3<f64> {
        self.data.view()
    }

    /// Sum over channels and polarization products per time bin; NaN where a
    /// bin holds no valid cell. Only used to search for pulses.
    pub fn time_series(&self) -> Array1<f64> {
        self.data
            .axis_iter(Axis(1))
            .map(|plane| finite_sum(plane.iter()).unwrap_or(f64::NAN))
            .collect()
    }

    /// Copies the time bins in `bins` out of the spectrum.
    ///
    /// Fails with `IndexOutOfRange` if any bin lies outside the array; never
    /// clips. With `normalize_channels` all four products of a channel are
    /// divided by that channel's level over the window (see
    /// [`Cutout::channel_level`]).
    pub fn extract_window(&self, bins: Range<isize>, normalize_channels: bool) -> Result<Cutout> {
        let range = check_window(&bins, self.n_time())?;
        let cutout = Cutout {
            data: self.data.slice(s![.., range, ..]).to_owned(),
            start_bin: bins.start,
        };
        if normalize_channels {
            let level = cutout.channel_level();
            return Ok(cutout.normalized(level.view()));
        }
        Ok(cutout)
    }
}

/// Time–frequency–polarization cutout around a pulse. Always an owned copy,
/// so later padding or scaling never touches the source spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct Cutout {
    data: Array3<f64>,
    start_bin: isize,
}

impl Cutout {
    pub fn new(data: Array3<f64>, start_bin: isize) -> Result<Self> {
        if data.len_of(Axis(2)) != N_POL {
            return Err(GpError::ShapeMismatch(format!(
                "cutout needs {} polarization products, found {}",
                N_POL,
                data.len_of(Axis(2))
            )));
        }
        Ok(Cutout { data, start_bin })
    }

    pub fn n_chan(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn n_time(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    /// Full-resolution bin of the first cutout column.
    pub fn start_bin(&self) -> isize {
        self.start_bin
    }

    pub fn view(&self) -> ArrayView3<f64> {
        self.data.view()
    }

    pub fn polarization(&self, pol: Polarization) -> ArrayView2<f64> {
        self.data.index_axis(Axis(2), pol.index())
    }

    /// Total intensity (XX + YY), `(channel, time)`.
    pub fn intensity(&self) -> Array2<f64> {
        &self.polarization(Polarization::XX) + &self.polarization(Polarization::YY)
    }

    /// Per-channel, per-product mean over time.
    pub fn time_mean(&self) -> Array2<f64> {
        let mut mean = Array2::<f64>::zeros((self.n_chan(), N_POL));
        for ((chan, pol), out) in mean.indexed_iter_mut() {
            *out = finite_mean(self.data.slice(s![chan, .., pol]).iter()).unwrap_or(f64::NAN);
        }
        mean
    }

    /// Mean of the finite XX and YY cells of each channel. The cross products
    /// are signed and carry no gain information, so they do not enter.
    pub fn channel_level(&self) -> Array1<f64> {
        self.data
            .axis_iter(Axis(0))
            .map(|channel| {
                let xx = channel.index_axis(Axis(1), Polarization::XX.index());
                let yy = channel.index_axis(Axis(1), Polarization::YY.index());
                finite_mean(xx.iter().chain(yy.iter())).unwrap_or(f64::NAN)
            })
            .collect()
    }

    /// Divides every product of channel `c` by `level[c]`. Channels without a
    /// usable level (zero or missing) become missing.
    pub fn normalized(&self, level: ArrayView1<f64>) -> Cutout {
        let mut data = self.data.clone();
        for (mut channel, &gain) in data.axis_iter_mut(Axis(0)).zip(level.iter()) {
            if gain != 0.0 && gain.is_finite() {
                channel.mapv_inplace(|v| v / gain);
            } else {
                channel.fill(f64::NAN);
            }
        }
        Cutout {
            data,
            start_bin: self.start_bin,
        }
    }

    /// Removes the per-channel, per-product mean of an off-pulse window.
    pub fn subtract_background(&self, background: &Cutout) -> Result<Cutout> {
        if background.n_chan() != self.n_chan() {
            return Err(GpError::ShapeMismatch(format!(
                "background has {} channels, cutout has {}",
                background.n_chan(),
                self.n_chan()
            )));
        }
        let level = background.time_mean();
        let mut data = self.data.clone();
        for ((chan, _, pol), value) in data.indexed_iter_mut() {
            *value -= level[[chan, pol]];
        }
        Ok(Cutout {
            data,
            start_bin: self.start_bin,
        })
    }

    pub fn scaled(&self, factor: f64) -> Cutout {
        Cutout {
            data: self.data.mapv(|v| v * factor),
            start_bin: self.start_bin,
        }
    }

    /// Largest finite total intensity of any cell.
    pub fn peak_intensity(&self) -> Option<f64> {
        self.intensity()
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .max_by(f64::total_cmp)
    }

    /// Per-product minimum over `channels`; NaN if none is finite.
    pub fn polarization_minimum(&self, channels: &[usize]) -> [f64; N_POL] {
        let mut out = [f64::NAN; N_POL];
        for (pol, slot) in out.iter_mut().enumerate() {
            *slot = channels
                .iter()
                .filter(|&&c| c < self.n_chan())
                .flat_map(|&c| self.data.slice(s![c, .., pol]).to_vec())
                .filter(|v| v.is_finite())
                .min_by(f64::total_cmp)
                .unwrap_or(f64::NAN);
        }
        out
    }

    /// Grows the channel axis by `low` channels below and `high` above, filled
    /// per product with `fill`.
    pub fn pad_channels(&self, low: usize, high: usize, fill: [f64; N_POL]) -> Cutout {
        let (n_chan, n_time, _) = self.data.dim();
        let mut data = Array3::<f64>::zeros((n_chan + low + high, n_time, N_POL));
        for (pol, value) in fill.iter().enumerate() {
            data.slice_mut(s![.., .., pol]).fill(*value);
        }
        data.slice_mut(s![low..low + n_chan, .., ..]).assign(&self.data);
        Cutout {
            data,
            start_bin: self.start_bin,
        }
    }

    /// Total-intensity time profile summed over `channels`.
    pub fn profile(&self, channels: &[usize]) -> Vec<f64> {
        let intensity = self.intensity();
        (0..self.n_time())
            .map(|t| {
                finite_sum(channels.iter().map(|&c| &intensity[[c, t]])).unwrap_or(f64::NAN)
            })
            .collect()
    }

    /// Total-intensity spectrum over `channels`, summed over time.
    pub fn channel_spectrum(&self, channels: &[usize]) -> Vec<f64> {
        let intensity = self.intensity();
        channels
            .iter()
            .map(|&c| finite_sum(intensity.row(c).iter()).unwrap_or(f64::NAN))
            .collect()
    }
}

/// Spectrum of the pulse itself: the background-subtracted cutout summed over
/// its brightest time bins, `(channel, polarization)`.
#[derive(Debug, Clone)]
pub struct PulseSpectrum {
    data: Array2<f64>,
    pulse_bins: Vec<usize>,
}

impl PulseSpectrum {
    pub fn from_cutout(cutout: &Cutout, n_pulse_bins: usize) -> Result<Self> {
        if n_pulse_bins == 0 {
            return Err(GpError::InvalidInput(
                "pulse spectrum needs at least one bin".to_string(),
            ));
        }
        let all_channels: Vec<usize> = (0..cutout.n_chan()).collect();
        let profile = cutout.profile(&all_channels);
        let mut order: Vec<usize> = (0..profile.len()).collect();
        order.sort_by(|&a, &b| {
            let pa = if profile[a].is_finite() { profile[a] } else { f64::NEG_INFINITY };
            let pb = if profile[b].is_finite() { profile[b] } else { f64::NEG_INFINITY };
            pb.total_cmp(&pa)
        });
        order.truncate(n_pulse_bins.min(profile.len()));

        let view = cutout.view();
        let mut data = Array2::<f64>::zeros((cutout.n_chan(), N_POL));
        for ((chan, pol), out) in data.indexed_iter_mut() {
            *out = finite_sum(order.iter().map(|&t| &view[[chan, t, pol]])).unwrap_or(f64::NAN);
        }
        Ok(PulseSpectrum {
            data,
            pulse_bins: order,
        })
    }

    pub fn from_array(data: Array2<f64>) -> Result<Self> {
        if data.len_of(Axis(1)) != N_POL {
            return Err(GpError::ShapeMismatch(format!(
                "spectrum needs {} polarization products, found {}",
                N_POL,
                data.len_of(Axis(1))
            )));
        }
        Ok(PulseSpectrum {
            data,
            pulse_bins: Vec::new(),
        })
    }

    pub fn n_chan(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn view(&self) -> ArrayView2<f64> {
        self.data.view()
    }

    pub fn polarization(&self, pol: Polarization) -> ArrayView1<f64> {
        self.data.column(pol.index())
    }

    /// Cutout columns summed into the spectrum, brightest first.
    pub fn pulse_bins(&self) -> &[usize] {
        &self.pulse_bins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn ramp_spectrum(n_chan: usize, n_time: usize) -> DynamicSpectrum {
        let data = Array::from_shape_fn((n_chan, n_time, N_POL), |(c, t, p)| {
            1.0 + c as f64 + 0.1 * t as f64 + 0.01 * p as f64
        });
        DynamicSpectrum::new(data).unwrap()
    }

    #[test]
    fn window_outside_array_is_an_error() {
        let spec = ramp_spectrum(4, 20);
        assert!(matches!(
            spec.extract_window(-1..5, false),
            Err(GpError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            spec.extract_window(15..21, false),
            Err(GpError::IndexOutOfRange { .. })
        ));
        let cut = spec.extract_window(15..20, false).unwrap();
        assert_eq!(cut.n_time(), 5);
        assert_eq!(cut.start_bin(), 15);
        assert_eq!(cut.view()[[2, 0, 1]], spec.view()[[2, 15, 1]]);
    }

    #[test]
    fn normalized_window_matches_manual_scaling() {
        let spec = ramp_spectrum(3, 30);
        let raw = spec.extract_window(10..20, false).unwrap();
        let norm = spec.extract_window(10..20, true).unwrap();
        let mean = raw.time_mean();
        for ((c, t, p), v) in raw.view().indexed_iter() {
            let level = 0.5 * (mean[[c, 0]] + mean[[c, 3]]);
            assert!((norm.view()[[c, t, p]] - v / level).abs() < 1e-12);
        }
    }

    #[test]
    fn normalization_keeps_zero_mean_cross_products() {
        let mut data = Array3::<f64>::zeros((2, 4, N_POL));
        for t in 0..4 {
            let sign = if t % 2 == 0 { 1.0 } else { -1.0 };
            data[[0, t, 0]] = 4.0;
            data[[0, t, 3]] = 4.0;
            data[[0, t, 1]] = sign;
            data[[0, t, 2]] = -sign;
        }
        data[[0, 3, 0]] = f64::NAN;
        let spec = DynamicSpectrum::new(data).unwrap();
        let norm = spec.extract_window(0..4, true).unwrap();
        assert_eq!(norm.view()[[0, 0, 1]], 0.25);
        assert_eq!(norm.view()[[0, 1, 2]], 0.25);
        assert_eq!(norm.view()[[0, 2, 3]], 1.0);
        // A channel with no power has nothing to normalise by.
        assert!(norm.view()[[1, 0, 0]].is_nan());
    }

    #[test]
    fn time_series_skips_missing_cells() {
        let mut data = Array3::<f64>::ones((2, 3, N_POL));
        data[[0, 1, 0]] = f64::NAN;
        data.slice_mut(s![.., 2, ..]).fill(f64::NAN);
        let spec = DynamicSpectrum::new(data).unwrap();
        let series = spec.time_series();
        assert_eq!(series[0], 8.0);
        assert_eq!(series[1], 7.0);
        assert!(series[2].is_nan());
    }

    #[test]
    fn bin_counts_follow_rounding_rule() {
        assert_eq!(bins_for(2.5e-4, 1.0e-4, BinRounding::Floor), 2);
        assert_eq!(bins_for(2.5e-4, 1.0e-4, BinRounding::Ceil), 3);
        // 3e-4 / 1e-4 is not exactly 3 in floating point.
        assert_eq!(bins_for(3.0e-4, 1.0e-4, BinRounding::Floor), 3);
        assert_eq!(bins_for(3.0e-4, 1.0e-4, BinRounding::Ceil), 3);
        assert_eq!(bins_for(0.0, 1.0e-4, BinRounding::Ceil), 0);
    }

    #[test]
    fn downsample_keeps_partial_tail() {
        let series = Array1::from(vec![1.0, 3.0, 5.0, 7.0, 9.0]);
        let coarse = downsample(series.view(), 2);
        assert_eq!(coarse.to_vec(), vec![2.0, 6.0, 9.0]);
    }

    #[test]
    fn background_subtraction_removes_off_pulse_level() {
        let spec = ramp_spectrum(2, 40);
        let on = spec.extract_window(20..30, false).unwrap();
        let off = spec.extract_window(10..20, false).unwrap();
        let sub = on.subtract_background(&off).unwrap();
        // The ramp rises 0.1 per bin; the off window is centred 10 bins earlier.
        assert!((sub.view()[[1, 0, 3]] - 0.55).abs() < 1e-9);
        assert_eq!(on.view()[[1, 0, 3]], spec.view()[[1, 20, 3]]);
    }

    #[test]
    fn padding_places_data_between_fill() {
        let cut = Cutout::new(Array3::<f64>::ones((2, 3, N_POL)), 0).unwrap();
        let padded = cut.pad_channels(1, 2, [-1.0, -2.0, -3.0, -4.0]);
        assert_eq!(padded.n_chan(), 5);
        assert_eq!(padded.view()[[0, 0, 1]], -2.0);
        assert_eq!(padded.view()[[1, 2, 1]], 1.0);
        assert_eq!(padded.view()[[4, 1, 3]], -4.0);
    }

    #[test]
    fn pulse_spectrum_sums_brightest_bins() {
        let mut data = Array3::<f64>::zeros((2, 6, N_POL));
        data.slice_mut(s![.., 2, ..]).fill(4.0);
        data.slice_mut(s![.., 3, ..]).fill(2.0);
        data.slice_mut(s![.., 5, ..]).fill(1.0);
        let cut = Cutout::new(data, 0).unwrap();
        let spec = PulseSpectrum::from_cutout(&cut, 2).unwrap();
        assert_eq!(spec.pulse_bins(), &[2, 3]);
        assert_eq!(spec.view()[[0, 0]], 6.0);
        assert_eq!(spec.view()[[1, 2]], 6.0);
    }
}
