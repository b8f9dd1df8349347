//! Delay between the two polarization feeds, read off the Fourier transform
//! of the complex cross-polarization spectrum XY + i*YX.

use log::{debug, warn};
use num_complex::Complex;
use rustfft::FftPlanner;

use crate::config::DelayConfig;
use crate::error::{GpError, Result};
use crate::observation::Polarization;
use crate::peak::refine_index;
use crate::spectrum::PulseSpectrum;
use crate::stats::mean_std;

type C64 = Complex<f64>;

const SPEED_OF_LIGHT: f64 = 299_792_458.0; // [m/s]

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoDetectionReason {
    /// Normalised peak below the significance threshold.
    BelowSignificance,
    /// Peak at zero lag.
    ZeroLag,
    /// The delay spectrum has no variance at all.
    FlatSpectrum,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DelayEstimate {
    Detected {
        /// Offset [s]: minus the delay-axis position of the peak.
        offset: f64,
        /// Peak height in standard deviations of the delay spectrum.
        peak_sigma: f64,
    },
    NoDetection {
        reason: NoDetectionReason,
        peak_sigma: f64,
    },
}

impl DelayEstimate {
    pub fn is_detection(&self) -> bool {
        matches!(self, DelayEstimate::Detected { .. })
    }

    /// Offset in seconds, `None` for a non-detection.
    pub fn offset(&self) -> Option<f64> {
        match self {
            DelayEstimate::Detected { offset, .. } => Some(*offset),
            DelayEstimate::NoDetection { .. } => None,
        }
    }

    pub fn offset_ns(&self) -> Option<f64> {
        self.offset().map(|t| t * 1e9)
    }

    /// Offset expressed as a light-travel distance [m].
    pub fn light_travel_m(&self) -> Option<f64> {
        self.offset().map(|t| t * SPEED_OF_LIGHT)
    }

    pub fn peak_sigma(&self) -> f64 {
        match self {
            DelayEstimate::Detected { peak_sigma, .. } => *peak_sigma,
            DelayEstimate::NoDetection { peak_sigma, .. } => *peak_sigma,
        }
    }
}

/// Normalised delay spectrum together with the estimate drawn from it.
#[derive(Debug, Clone)]
pub struct DelaySpectrum {
    /// Delay of each bin [µs], zero lag in the middle.
    pub delay_axis: Vec<f64>,
    /// |FFT| with zero mean and unit variance.
    pub amplitude: Vec<f64>,
    pub estimate: DelayEstimate,
}

/// fftshift-ed sample axis of an `n`-point transform over channels of width
/// `channel_width_mhz`. Units are µs.
pub fn delay_axis(n: usize, channel_width_mhz: f64) -> Vec<f64> {
    let step = 1.0 / (n as f64 * channel_width_mhz);
    let half = (n / 2) as isize;
    (0..n).map(|k| (k as isize - half) as f64 * step).collect()
}

/// XY + i*YX per channel. Channels outside `clean_channels` and missing cells are zero.
pub fn cross_spectrum(spectrum: &PulseSpectrum, clean_channels: Option<&[usize]>) -> Vec<C64> {
    let xy = spectrum.polarization(Polarization::XY);
    let yx = spectrum.polarization(Polarization::YX);
    let mut keep = vec![clean_channels.is_none(); spectrum.n_chan()];
    if let Some(chans) = clean_channels {
        for &c in chans {
            if let Some(k) = keep.get_mut(c) {
                *k = true;
            }
        }
    }
    (0..spectrum.n_chan())
        .map(|c| {
            let (re, im) = (xy[c], yx[c]);
            if keep[c] && re.is_finite() && im.is_finite() {
                C64::new(re, im)
            } else {
                C64::new(0.0, 0.0)
            }
        })
        .collect()
}

/// Zero-pads symmetrically so the total length is roughly `factor` times the input.
pub fn zero_pad(values: &[C64], factor: usize) -> Vec<C64> {
    let n = values.len();
    let each_side = n * factor.saturating_sub(1) / 2;
    let mut padded = vec![C64::new(0.0, 0.0); n + 2 * each_side];
    padded[each_side..each_side + n].copy_from_slice(values);
    padded
}

/// |FFT| of `values`, fftshift-ed so zero lag sits at index `len / 2`.
pub fn delay_amplitude(values: &[C64]) -> Vec<f64> {
    let n = values.len();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer = values.to_vec();
    fft.process(&mut buffer);

    let half = n / 2;
    let mut shifted = vec![C64::new(0.0, 0.0); n];
    let (first_half, second_half) = buffer.split_at(n - half);
    shifted[..half].copy_from_slice(second_half);
    shifted[half..].copy_from_slice(first_half);
    shifted.iter().map(|c| c.norm()).collect()
}

/// Estimates the feed-to-feed delay of one background-subtracted pulse spectrum.
pub fn estimate_delay(
    spectrum: &PulseSpectrum,
    channel_width_mhz: f64,
    clean_channels: Option<&[usize]>,
    config: &DelayConfig,
) -> Result<DelaySpectrum> {
    if spectrum.n_chan() < 2 {
        return Err(GpError::InvalidInput(
            "delay estimation needs at least two channels".to_string(),
        ));
    }
    if !(channel_width_mhz > 0.0) {
        return Err(GpError::InvalidInput(format!(
            "channel width must be positive, got {}",
            channel_width_mhz
        )));
    }

    let padded = zero_pad(&cross_spectrum(spectrum, clean_channels), config.padding_factor);
    let axis = delay_axis(padded.len(), channel_width_mhz);
    let raw = delay_amplitude(&padded);

    let (mean, std) = mean_std(&raw).unwrap_or((0.0, 0.0));
    if !(std > 0.0) {
        return Ok(DelaySpectrum {
            delay_axis: axis,
            amplitude: vec![0.0; raw.len()],
            estimate: DelayEstimate::NoDetection {
                reason: NoDetectionReason::FlatSpectrum,
                peak_sigma: 0.0,
            },
        });
    }
    let amplitude: Vec<f64> = raw.iter().map(|a| (a - mean) / std).collect();

    let (peak_idx, peak_sigma) = amplitude
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((0, 0.0));

    let peak_delay = match refine_index(&axis, &amplitude, peak_idx) {
        Some(refined) => refined,
        None => {
            warn!(
                "sub-bin refinement of delay peak at bin {} skipped; using bin centre",
                peak_idx
            );
            axis[peak_idx]
        }
    };
    let step = axis[1] - axis[0];
    debug!(
        "delay peak: bin {}, {:.6} us, {:.2} sigma",
        peak_idx, peak_delay, peak_sigma
    );

    let estimate = if peak_sigma < config.significance {
        DelayEstimate::NoDetection {
            reason: NoDetectionReason::BelowSignificance,
            peak_sigma,
        }
    } else if (peak_delay / step).round() == 0.0 {
        DelayEstimate::NoDetection {
            reason: NoDetectionReason::ZeroLag,
            peak_sigma,
        }
    } else {
        DelayEstimate::Detected {
            offset: -peak_delay * 1e-6,
            peak_sigma,
        }
    };

    Ok(DelaySpectrum {
        delay_axis: axis,
        amplitude,
        estimate,
    })
}
