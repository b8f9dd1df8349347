//! Command-line flags shared by the `dual_pulse` and `pulse_spectrum` tools.

use clap::Args;
use std::path::PathBuf;

use crate::config::{AlignConfig, DelayConfig, PadFill, PipelineConfig, SearchConfig, WindowConfig};
use crate::error::Result;
use crate::input::ObservationSource;
use crate::observation::{parse_band, parse_start_time};
use crate::rfi::parse_channel_ranges;

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Bin width of the coarse pulse search [s].
    #[arg(long, default_value_t = 1.0e-4, value_name = "SECONDS")]
    pub search_resolution: f64,

    /// Half-width of the full-resolution re-localisation window [s].
    #[arg(long, default_value_t = 1.0e-4, value_name = "SECONDS")]
    pub search_radius: f64,

    /// Detection threshold in robust standard deviations.
    #[arg(long, default_value_t = 5.0, value_name = "SIGMA")]
    pub threshold: f64,

    /// Minimum spacing between reported pulses [s].
    #[arg(long, default_value_t = 4.0e-4, value_name = "SECONDS")]
    pub min_separation: f64,
}

impl SearchArgs {
    pub fn config(&self) -> SearchConfig {
        SearchConfig {
            search_resolution: self.search_resolution,
            search_radius: self.search_radius,
            threshold_sigma: self.threshold,
            min_separation: self.min_separation,
        }
    }
}

/// Window flags left unset fall back to the tool's preset.
#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    /// Time kept before the pulse [s].
    #[arg(long, value_name = "SECONDS")]
    pub lead: Option<f64>,

    /// Time kept after the pulse [s].
    #[arg(long, value_name = "SECONDS")]
    pub trail: Option<f64>,

    /// Width of the pulse summed into the spectrum [s].
    #[arg(long, value_name = "SECONDS")]
    pub pulse_width: Option<f64>,

    /// Background window length in units of the on-pulse window.
    #[arg(long, default_value_t = 1)]
    pub background_multiple: usize,

    /// Divide each channel of a cutout by its off-pulse XX/YY level.
    #[arg(long)]
    pub normalize_channels: bool,
}

impl WindowArgs {
    pub fn config(&self, preset: WindowConfig) -> WindowConfig {
        WindowConfig {
            lead_width: self.lead.unwrap_or(preset.lead_width),
            trail_width: self.trail.unwrap_or(preset.trail_width),
            pulse_width: self.pulse_width.unwrap_or(preset.pulse_width),
            background_multiple: self.background_multiple,
            normalize_channels: self.normalize_channels,
            rounding: preset.rounding,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DelayArgs {
    /// Delay-spectrum peak, in standard deviations, required for a detection.
    #[arg(long, default_value_t = 5.0, value_name = "SIGMA")]
    pub significance: f64,

    /// Channel-axis length after zero padding, as a multiple of the channel count.
    #[arg(long, default_value_t = 2)]
    pub padding_factor: usize,
}

impl DelayArgs {
    pub fn config(&self) -> DelayConfig {
        DelayConfig {
            significance: self.significance,
            padding_factor: self.padding_factor,
        }
    }
}

/// Collects the parsed flag groups into one pipeline configuration.
pub fn pipeline_config(
    search: &SearchArgs,
    window: &WindowArgs,
    preset: WindowConfig,
    delay: &DelayArgs,
    fold_index: usize,
) -> PipelineConfig {
    PipelineConfig {
        search: search.config(),
        window: window.config(preset),
        delay: delay.config(),
        align: AlignConfig::default(),
        fold_index,
        scale_to_first: false,
    }
}

/// Pad fill from the `--pad-value` flag; unset means the clean-channel minimum.
pub fn pad_fill(value: Option<f64>) -> PadFill {
    value.map(PadFill::Value).unwrap_or(PadFill::CleanMinimum)
}

/// Builds an [`ObservationSource`] from textual flag values. An empty
/// `clean_ranges` marks every channel as RFI-free.
pub fn observation_source(
    path: PathBuf,
    telescope: &str,
    start: &str,
    band: &str,
    deltat: f64,
    bin_width: Option<f64>,
    clean_ranges: &[String],
) -> Result<ObservationSource> {
    let clean_channels = if clean_ranges.is_empty() {
        None
    } else {
        Some(parse_channel_ranges(clean_ranges)?)
    };
    Ok(ObservationSource {
        path,
        telescope: telescope.to_string(),
        start_time: parse_start_time(start)?,
        deltat,
        bin_width,
        band: parse_band(band)?,
        clean_channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        search: SearchArgs,
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        delay: DelayArgs,
    }

    #[test]
    fn defaults_match_config_defaults() {
        let cli = TestCli::parse_from(["gpspec"]);
        assert_eq!(cli.search.config(), SearchConfig::default());
        assert_eq!(cli.delay.config(), DelayConfig::default());
        assert_eq!(cli.window.config(WindowConfig::single()), WindowConfig::single());
    }

    #[test]
    fn window_flags_override_preset() {
        let cli = TestCli::parse_from(["gpspec", "--lead", "2e-4", "--normalize-channels"]);
        let window = cli.window.config(WindowConfig::dual());
        assert_eq!(window.lead_width, 2.0e-4);
        assert_eq!(window.trail_width, 3.0e-4);
        assert!(window.normalize_channels);
        assert_eq!(window.rounding, crate::config::BinRounding::Floor);
    }

    #[test]
    fn source_from_flags() {
        let source = observation_source(
            PathBuf::from("foldspec_jb.npy"),
            "JB",
            "2015-06-21 03:00:00",
            "1300,1500",
            0.02,
            None,
            &["0,9".to_string(), "20,29".to_string()],
        )
        .unwrap();
        assert_eq!(source.clean_channels.as_ref().map(Vec::len), Some(20));
        assert_eq!(source.band.upper, 1500.0);
        assert_eq!(pad_fill(Some(0.0)), PadFill::Value(0.0));
    }
}
