//! Tunables for each stage of the pipeline. Every stage takes its own
//! struct; nothing here is process-wide.

use crate::error::{GpError, Result};

/// Coarse search and fine re-localisation of giant pulses.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Bin width used for the coarse search [s]. Never finer than the native bin width.
    pub search_resolution: f64,
    /// Half-width of the full-resolution neighbourhood searched around a coarse candidate [s].
    pub search_radius: f64,
    /// Detection threshold in robust standard deviations above the median.
    pub threshold_sigma: f64,
    /// Minimum spacing between two reported candidates [s].
    pub min_separation: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            search_resolution: 1.0e-4,
            search_radius: 1.0e-4,
            threshold_sigma: 5.0,
            min_separation: 4.0e-4,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.search_resolution > 0.0) {
            return Err(GpError::InvalidInput(
                "search resolution must be positive".to_string(),
            ));
        }
        if !(self.search_radius >= 0.0) {
            return Err(GpError::InvalidInput(
                "search radius must not be negative".to_string(),
            ));
        }
        if !(self.threshold_sigma > 0.0) {
            return Err(GpError::InvalidInput(
                "detection threshold must be positive".to_string(),
            ));
        }
        if !(self.min_separation >= 0.0) {
            return Err(GpError::InvalidInput(
                "minimum separation must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a window width in seconds becomes a whole number of bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinRounding {
    Floor,
    Ceil,
}

/// Placement of the on-pulse and background windows around a resolved pulse.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowConfig {
    /// Time kept before the pulse peak [s].
    pub lead_width: f64,
    /// Time kept after the pulse peak [s].
    pub trail_width: f64,
    /// Expected width of the pulse itself [s]; sets how many bins form the pulse spectrum.
    pub pulse_width: f64,
    /// Background window length as a multiple of the on-pulse window.
    pub background_multiple: usize,
    /// Divide every channel of a cutout by its own off-pulse level.
    pub normalize_channels: bool,
    /// Conversion of lead and trail widths to bins.
    pub rounding: BinRounding,
}

impl WindowConfig {
    /// Narrow display window used when comparing two telescopes.
    pub fn dual() -> Self {
        WindowConfig {
            lead_width: 1.0e-4,
            trail_width: 3.0e-4,
            pulse_width: 1.0e-4,
            background_multiple: 1,
            normalize_channels: false,
            rounding: BinRounding::Floor,
        }
    }

    /// Wider window used for the spectrum of a single observation.
    pub fn single() -> Self {
        WindowConfig {
            lead_width: 5.0e-4,
            trail_width: 1.5e-3,
            pulse_width: 1.0e-4,
            background_multiple: 1,
            normalize_channels: false,
            rounding: BinRounding::Ceil,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.lead_width >= 0.0) || !(self.trail_width >= 0.0) {
            return Err(GpError::InvalidInput(
                "lead and trail widths must not be negative".to_string(),
            ));
        }
        if !(self.pulse_width > 0.0) {
            return Err(GpError::InvalidInput(
                "pulse width must be positive".to_string(),
            ));
        }
        if self.background_multiple == 0 {
            return Err(GpError::InvalidInput(
                "background window multiple must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig::dual()
    }
}

/// Fourier-domain delay estimation on the cross-polarization spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayConfig {
    /// Peak height, in standard deviations of the delay spectrum, required for a detection.
    pub significance: f64,
    /// Total channel-axis length after zero padding, as a multiple of the channel count.
    pub padding_factor: usize,
}

impl Default for DelayConfig {
    fn default() -> Self {
        DelayConfig {
            significance: 5.0,
            padding_factor: 2,
        }
    }
}

/// Value written into channels added by frequency alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PadFill {
    Value(f64),
    /// Per-polarization minimum over the RFI-free channels of the padded array.
    CleanMinimum,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignConfig {
    /// Relative channel-width difference tolerated without a warning.
    pub width_tolerance: f64,
    pub fill: PadFill,
}

impl Default for AlignConfig {
    fn default() -> Self {
        AlignConfig {
            width_tolerance: 1.0e-6,
            fill: PadFill::CleanMinimum,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineConfig {
    pub search: SearchConfig,
    pub window: WindowConfig,
    pub delay: DelayConfig,
    pub align: AlignConfig,
    /// Fold (time-fold axis index) used from folded inputs.
    pub fold_index: usize,
    /// Rescale the second observation to the peak intensity of the first.
    pub scale_to_first: bool,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.window.validate()?;
        if self.delay.padding_factor == 0 {
            return Err(GpError::InvalidInput(
                "delay padding factor must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
