//! Puts two cutouts from different telescopes onto one frequency axis.
//!
//! Arrays are only ever padded, never cropped. Each array is padded at an edge
//! where the other band reaches further, by the edge difference divided by its
//! own channel width. RFI-free channel lists of an array padded at its low
//! edge are shifted by the number of channels added there.

use log::{info, warn};

use crate::config::{AlignConfig, PadFill};
use crate::error::{GpError, Result};
use crate::observation::{FrequencyBand, N_POL};
use crate::rfi::shift_channels;
use crate::spectrum::Cutout;

/// One cutout re-expressed on the common frequency axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedCutout {
    pub cutout: Cutout,
    pub clean_channels: Vec<usize>,
    /// Channels added below the original lower edge.
    pub pad_low: usize,
    /// Channels added above the original upper edge.
    pub pad_high: usize,
}

impl AlignedCutout {
    /// Channel range holding the original, unpadded data.
    pub fn native_channels(&self) -> std::ops::Range<usize> {
        self.pad_low..self.cutout.n_chan() - self.pad_high
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub first: AlignedCutout,
    pub second: AlignedCutout,
    /// Union of the two bands.
    pub band: FrequencyBand,
}

impl AlignedPair {
    /// Width of one channel on the common axis [MHz].
    pub fn channel_width(&self) -> f64 {
        self.band.channel_width(self.first.cutout.n_chan())
    }
}

/// Inputs for one side of an alignment.
#[derive(Debug, Clone, Copy)]
pub struct AlignInput<'a> {
    pub band: FrequencyBand,
    pub cutout: &'a Cutout,
    pub clean_channels: &'a [usize],
}

fn edge_padding(difference: f64, channel_width: f64) -> usize {
    if difference > 0.0 {
        (difference / channel_width).round() as usize
    } else {
        0
    }
}

fn fill_values(fill: PadFill, cutout: &Cutout, clean_channels: &[usize]) -> [f64; N_POL] {
    match fill {
        PadFill::Value(v) => [v; N_POL],
        PadFill::CleanMinimum => {
            let all: Vec<usize>;
            let channels = if clean_channels.is_empty() {
                all = (0..cutout.n_chan()).collect();
                &all[..]
            } else {
                clean_channels
            };
            cutout
                .polarization_minimum(channels)
                .map(|v| if v.is_finite() { v } else { 0.0 })
        }
    }
}

fn pad_side(input: &AlignInput, pad_low: usize, pad_high: usize, fill: PadFill) -> AlignedCutout {
    let cutout = if pad_low == 0 && pad_high == 0 {
        input.cutout.clone()
    } else {
        let values = fill_values(fill, input.cutout, input.clean_channels);
        input.cutout.pad_channels(pad_low, pad_high, values)
    };
    AlignedCutout {
        cutout,
        clean_channels: shift_channels(input.clean_channels, pad_low),
        pad_low,
        pad_high,
    }
}

/// Pads the narrower side of each band edge so both cutouts cover the union
/// of the two bands on a common channel grid.
///
/// Unequal channel widths only raise a warning; the result is then approximate.
pub fn align(first: AlignInput, second: AlignInput, config: &AlignConfig) -> Result<AlignedPair> {
    if first.cutout.n_chan() == 0 || second.cutout.n_chan() == 0 {
        return Err(GpError::InvalidInput(
            "cannot align a cutout without channels".to_string(),
        ));
    }
    let width_first = first.band.channel_width(first.cutout.n_chan());
    let width_second = second.band.channel_width(second.cutout.n_chan());
    let relative = (width_first - width_second).abs() / width_first.max(width_second);
    if relative > config.width_tolerance {
        warn!(
            "channel widths are not equal ({:.6} MHz vs {:.6} MHz); alignment is approximate",
            width_first, width_second
        );
    }

    let upper_diff = first.band.upper - second.band.upper;
    let lower_diff = first.band.lower - second.band.lower;

    let first_high = edge_padding(-upper_diff, width_first);
    let second_high = edge_padding(upper_diff, width_second);
    let first_low = edge_padding(lower_diff, width_first);
    let second_low = edge_padding(-lower_diff, width_second);

    info!(
        "frequency alignment padding: first +{} low / +{} high, second +{} low / +{} high",
        first_low, first_high, second_low, second_high
    );

    let aligned_first = pad_side(&first, first_low, first_high, config.fill);
    let aligned_second = pad_side(&second, second_low, second_high, config.fill);

    if aligned_first.cutout.n_chan() != aligned_second.cutout.n_chan() {
        warn!(
            "aligned channel counts differ ({} vs {})",
            aligned_first.cutout.n_chan(),
            aligned_second.cutout.n_chan()
        );
    }

    Ok(AlignedPair {
        first: aligned_first,
        second: aligned_second,
        band: first.band.union(&second.band),
    })
}
