//! End-to-end runs: one observation on its own, or two telescopes compared.

use chrono::{DateTime, Utc};
use log::{info, warn};
use ndarray::ArrayView1;
use std::ops::Range;

use crate::align::{align, AlignInput, AlignedCutout, AlignedPair};
use crate::config::{BinRounding, PipelineConfig, WindowConfig};
use crate::delay::{estimate_delay, DelaySpectrum};
use crate::error::{GpError, Result};
use crate::noise::{fit_polarization_noise, PolarizationNoise};
use crate::observation::{format_time_of_day, FrequencyBand, Observation};
use crate::peak::estimate_peak;
use crate::search::{PulseCandidate, PulseSearch};
use crate::spectrum::{bins_for, Cutout, DynamicSpectrum, PulseSpectrum};
use crate::stats::standardize;

/// On-pulse and background bin windows around a resolved pulse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseWindows {
    pub on_pulse: Range<isize>,
    pub background: Range<isize>,
}

impl PulseWindows {
    /// On-pulse `[p - lead, p + trail)`; background of `background_multiple`
    /// on-pulse lengths ending where the on-pulse window starts.
    pub fn around(pulse_bin: usize, bin_width: f64, window: &WindowConfig) -> Self {
        let lead = bins_for(window.lead_width, bin_width, window.rounding) as isize;
        let trail = bins_for(window.trail_width, bin_width, window.rounding) as isize;
        let p = pulse_bin as isize;
        let background_len = window.background_multiple as isize * (lead + trail);
        PulseWindows {
            on_pulse: p - lead..p + trail,
            background: p - lead - background_len..p - lead,
        }
    }
}

/// Time bins summed into the pulse spectrum: `ceil(pulse_width / bin_width)`,
/// at least one.
pub fn pulse_bin_count(pulse_width: f64, bin_width: f64) -> usize {
    bins_for(pulse_width, bin_width, BinRounding::Ceil).max(1)
}

/// Fractional bin of the pulse maximum from its two neighbours. Falls back to
/// `bin` at the series edges or when the three samples admit no vertex.
pub fn sub_bin_position(series: ArrayView1<f64>, bin: usize) -> f64 {
    if bin == 0 || bin + 1 >= series.len() {
        return bin as f64;
    }
    let x = [(bin - 1) as f64, bin as f64, (bin + 1) as f64];
    let w = [series[bin - 1], series[bin], series[bin + 1]];
    match estimate_peak(&x, &w) {
        Ok(position) if position.is_finite() => position,
        Ok(_) => bin as f64,
        Err(e) => {
            warn!("sub-bin pulse refinement skipped at bin {}: {}", bin, e);
            bin as f64
        }
    }
}

/// A located giant pulse and its background-subtracted cutout.
#[derive(Debug, Clone)]
pub struct ObservationResult {
    pub telescope: String,
    pub pulse_bin: usize,
    /// Pulse maximum in fractional full-resolution bins.
    pub pulse_position: f64,
    pub pulse_time: DateTime<Utc>,
    /// Every resolved candidate, strongest first.
    pub candidates: Vec<PulseCandidate>,
    pub windows: PulseWindows,
    pub cutout: Cutout,
    pub clean_channels: Vec<usize>,
    pub bin_width: f64,
}

impl ObservationResult {
    pub fn pulse_time_of_day(&self) -> String {
        format_time_of_day(&self.pulse_time)
    }

    /// Pulse spectrum of the cutout.
    pub fn pulse_spectrum(&self, window: &WindowConfig) -> Result<PulseSpectrum> {
        PulseSpectrum::from_cutout(&self.cutout, pulse_bin_count(window.pulse_width, self.bin_width))
    }

    /// Cutout column times relative to the pulse [s].
    pub fn relative_times(&self) -> Vec<f64> {
        (0..self.cutout.n_time())
            .map(|t| {
                (self.cutout.start_bin() + t as isize - self.pulse_bin as isize) as f64
                    * self.bin_width
            })
            .collect()
    }
}

/// Finds the strongest giant pulse of one observation and cuts it out.
///
/// An empty search is fatal: the run stops with `NoPulseFound`.
pub fn process_observation(
    observation: &Observation,
    spectrum: &DynamicSpectrum,
    config: &PipelineConfig,
) -> Result<ObservationResult> {
    let series = spectrum.time_series();
    let search = PulseSearch::new(&config.search, observation.bin_width)?;
    let candidates = search.run(series.view())?;
    let Some(strongest) = candidates.first().copied() else {
        return Err(GpError::NoPulseFound {
            telescope: observation.telescope.clone(),
            start_time: observation.start_time.to_rfc3339(),
        });
    };

    let pulse_time = observation.time_of_bin(strongest.bin);
    info!(
        "{}: giant pulse at bin {} ({}), {} candidate(s)",
        observation.telescope,
        strongest.bin,
        format_time_of_day(&pulse_time),
        candidates.len()
    );

    let windows = PulseWindows::around(strongest.bin, observation.bin_width, &config.window);
    let mut on_pulse = spectrum.extract_window(windows.on_pulse.clone(), false)?;
    let mut background = spectrum.extract_window(windows.background.clone(), false)?;
    if config.window.normalize_channels {
        // Both windows share the off-pulse divisor.
        let level = background.channel_level();
        on_pulse = on_pulse.normalized(level.view());
        background = background.normalized(level.view());
    }
    let cutout = on_pulse.subtract_background(&background)?;

    Ok(ObservationResult {
        telescope: observation.telescope.clone(),
        pulse_bin: strongest.bin,
        pulse_position: sub_bin_position(series.view(), strongest.bin),
        pulse_time,
        candidates,
        windows,
        cutout,
        clean_channels: observation.clean_channels_for(spectrum.n_chan())?,
        bin_width: observation.bin_width,
    })
}

/// Delay estimate of one observation on its own channel grid.
pub fn observation_delay(
    observation: &Observation,
    result: &ObservationResult,
    config: &PipelineConfig,
) -> Result<DelaySpectrum> {
    let spectrum = result.pulse_spectrum(&config.window)?;
    let channel_width = observation.band.channel_width(spectrum.n_chan());
    estimate_delay(
        &spectrum,
        channel_width,
        Some(&result.clean_channels),
        &config.delay,
    )
}

/// Single-observation run.
#[derive(Debug, Clone)]
pub struct SingleReport {
    pub observation: ObservationResult,
    pub spectrum: PulseSpectrum,
    /// Lower channel edges [MHz].
    pub frequencies: Vec<f64>,
    /// `None` when the XX or YY spectrum cannot be normalised.
    pub noise: Option<PolarizationNoise>,
    pub delay: DelaySpectrum,
}

pub fn run_single(
    observation: &Observation,
    spectrum: &DynamicSpectrum,
    config: &PipelineConfig,
) -> Result<SingleReport> {
    config.validate()?;
    let result = process_observation(observation, spectrum, config)?;
    let pulse_spectrum = result.pulse_spectrum(&config.window)?;
    let n_chan = pulse_spectrum.n_chan();
    let frequencies = (0..n_chan)
        .map(|c| observation.band.channel_frequency(c, n_chan))
        .collect();
    let noise = match fit_polarization_noise(&pulse_spectrum) {
        Ok(noise) => Some(noise),
        Err(e) => {
            warn!("{}: noise model skipped: {}", observation.telescope, e);
            None
        }
    };
    let delay = observation_delay(observation, &result, config)?;
    Ok(SingleReport {
        observation: result,
        spectrum: pulse_spectrum,
        frequencies,
        noise,
        delay,
    })
}

/// Standardised spectrum and profile of one aligned observation.
#[derive(Debug, Clone)]
pub struct ComparisonTrace {
    /// Frequencies of the RFI-free channels on the common axis [MHz].
    pub frequencies: Vec<f64>,
    pub spectrum: Vec<f64>,
    /// Time relative to the pulse [s].
    pub times: Vec<f64>,
    pub profile: Vec<f64>,
}

impl ComparisonTrace {
    fn new(aligned: &AlignedCutout, band: &FrequencyBand, times: Vec<f64>) -> Self {
        let n_chan = aligned.cutout.n_chan();
        let chans = &aligned.clean_channels;
        ComparisonTrace {
            frequencies: chans
                .iter()
                .map(|&c| band.channel_frequency(c, n_chan))
                .collect(),
            spectrum: standardize(&aligned.cutout.channel_spectrum(chans)),
            times,
            profile: standardize(&aligned.cutout.profile(chans)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub first: ComparisonTrace,
    pub second: ComparisonTrace,
    /// Frequencies both telescopes observed; `None` for disjoint bands.
    pub overlap: Option<FrequencyBand>,
}

fn band_overlap(a: &FrequencyBand, b: &FrequencyBand) -> Option<FrequencyBand> {
    FrequencyBand::new(a.lower.max(b.lower), a.upper.min(b.upper)).ok()
}

/// Two-telescope comparison run.
#[derive(Debug, Clone)]
pub struct DualReport {
    pub first: ObservationResult,
    pub second: ObservationResult,
    pub aligned: AlignedPair,
    pub comparison: Comparison,
    /// Factor applied to the second cutout, when scaling was requested.
    pub scale: Option<f64>,
    pub first_delay: DelaySpectrum,
    pub second_delay: DelaySpectrum,
}

fn peak_ratio(first: &Cutout, second: &Cutout) -> Option<f64> {
    let ratio = first.peak_intensity()? / second.peak_intensity()?;
    if ratio.is_finite() && ratio != 0.0 {
        Some(ratio)
    } else {
        None
    }
}

pub fn run_dual(
    first: (&Observation, &DynamicSpectrum),
    second: (&Observation, &DynamicSpectrum),
    config: &PipelineConfig,
) -> Result<DualReport> {
    config.validate()?;
    let first_result = process_observation(first.0, first.1, config)?;
    let second_result = process_observation(second.0, second.1, config)?;

    let mut scale = None;
    let mut second_cutout = second_result.cutout.clone();
    if config.scale_to_first {
        match peak_ratio(&first_result.cutout, &second_result.cutout) {
            Some(ratio) => {
                info!("scaling {} by {:.4}", second_result.telescope, ratio);
                second_cutout = second_cutout.scaled(ratio);
                scale = Some(ratio);
            }
            None => warn!(
                "cannot scale {}: peak intensity is zero or missing",
                second_result.telescope
            ),
        }
    }

    let aligned = align(
        AlignInput {
            band: first.0.band,
            cutout: &first_result.cutout,
            clean_channels: &first_result.clean_channels,
        },
        AlignInput {
            band: second.0.band,
            cutout: &second_cutout,
            clean_channels: &second_result.clean_channels,
        },
        &config.align,
    )?;

    let comparison = Comparison {
        first: ComparisonTrace::new(&aligned.first, &aligned.band, first_result.relative_times()),
        second: ComparisonTrace::new(&aligned.second, &aligned.band, second_result.relative_times()),
        overlap: band_overlap(&first.0.band, &second.0.band),
    };

    let first_delay = observation_delay(first.0, &first_result, config)?;
    let second_delay = observation_delay(second.0, &second_result, config)?;

    Ok(DualReport {
        first: first_result,
        second: second_result,
        aligned,
        comparison,
        scale,
        first_delay,
        second_delay,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{parse_start_time, N_POL};
    use ndarray::Array3;

    fn observation(bin_width: f64) -> Observation {
        let band = FrequencyBand::new(1300.0, 1500.0).unwrap();
        let start = parse_start_time("2015-06-21T03:00:00Z").unwrap();
        Observation::new("JB", start, 0.01, bin_width, band, None).unwrap()
    }

    fn pulsed(n_chan: usize, n_time: usize, at: usize) -> DynamicSpectrum {
        let mut data = Array3::<f64>::ones((n_chan, n_time, N_POL));
        for c in 0..n_chan {
            data[[c, at, 0]] = 40.0 + c as f64;
            data[[c, at, 3]] = 40.0;
        }
        DynamicSpectrum::new(data).unwrap()
    }

    fn fine_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.search.search_resolution = 1.0e-5;
        config.search.search_radius = 1.0e-5;
        config
    }

    #[test]
    fn windows_precede_and_follow_the_pulse() {
        let w = PulseWindows::around(1000, 1.0e-6, &WindowConfig::dual());
        assert_eq!(w.on_pulse, 900..1300);
        assert_eq!(w.background, 500..900);
    }

    #[test]
    fn window_bins_round_per_tool() {
        // 2.5 bins of lead and 7.5 of trail.
        let mut window = WindowConfig::dual();
        window.lead_width = 2.5e-4;
        window.trail_width = 7.5e-4;
        let floor = PulseWindows::around(100, 1.0e-4, &window);
        assert_eq!(floor.on_pulse, 98..107);
        window.rounding = BinRounding::Ceil;
        let ceil = PulseWindows::around(100, 1.0e-4, &window);
        assert_eq!(ceil.on_pulse, 97..108);
        assert_eq!(ceil.background, 86..97);
    }

    #[test]
    fn pulse_bin_count_tolerates_rounding() {
        assert_eq!(pulse_bin_count(1.0e-4, 1.0e-6), 100);
        assert_eq!(pulse_bin_count(1.0e-4, 3.0e-5), 4);
        assert_eq!(pulse_bin_count(1.0e-6, 1.0e-4), 1);
    }

    #[test]
    fn located_pulse_is_background_subtracted() {
        let spectrum = pulsed(8, 2000, 1200);
        let obs = observation(1.0e-6);
        let result = process_observation(&obs, &spectrum, &fine_config()).unwrap();
        assert_eq!(result.pulse_bin, 1200);
        assert_eq!(result.pulse_position, 1200.0);
        assert_eq!(result.pulse_time_of_day(), "03:00:00.001200");
        assert_eq!(result.cutout.start_bin(), 1100);
        assert_eq!(result.cutout.n_time(), 400);
        // Off-pulse level 1.0 removed; pulse column keeps its excess.
        assert!(result.cutout.view()[[3, 50, 1]].abs() < 1e-12);
        assert!((result.cutout.view()[[3, 100, 0]] - 42.0).abs() < 1e-12);
        let times = result.relative_times();
        assert!((times[0] + 1.0e-4).abs() < 1e-12);
    }

    #[test]
    fn sub_bin_position_leans_to_brighter_neighbour() {
        let series = ndarray::Array1::from(vec![0.0, 1.0, 3.0, 2.0, 0.0]);
        let p = sub_bin_position(series.view(), 2);
        assert!((p - (2.0 + 1.0 / 6.0)).abs() < 1e-12);
        assert_eq!(sub_bin_position(series.view(), 0), 0.0);
        let flat = ndarray::Array1::from(vec![1.0, 1.0, 1.0]);
        assert_eq!(sub_bin_position(flat.view(), 1), 1.0);
    }

    #[test]
    fn flat_observation_reports_no_pulse() {
        let spectrum = DynamicSpectrum::new(Array3::<f64>::ones((4, 2000, N_POL))).unwrap();
        let obs = observation(1.0e-6);
        match process_observation(&obs, &spectrum, &fine_config()) {
            Err(GpError::NoPulseFound { telescope, .. }) => assert_eq!(telescope, "JB"),
            other => panic!("unexpected {:?}", other.map(|r| r.pulse_bin)),
        }
    }

    /// Channel gains 1..=2 on a unit background; the pulse column carries
    /// cross products rotating through `delay_us` across 1 MHz channels.
    fn gained_delay(n_chan: usize, n_time: usize, at: usize, delay_us: f64) -> DynamicSpectrum {
        let mut data = Array3::<f64>::ones((n_chan, n_time, N_POL));
        for c in 0..n_chan {
            let gain = 1.0 + c as f64 / n_chan as f64;
            let phase = 2.0 * std::f64::consts::PI * c as f64 * delay_us;
            data[[c, at, 0]] = 50.0;
            data[[c, at, 1]] = 1.0 + 5.0 * phase.cos();
            data[[c, at, 2]] = 1.0 + 5.0 * phase.sin();
            data[[c, at, 3]] = 50.0;
            data.slice_mut(ndarray::s![c, .., ..]).mapv_inplace(|v| v * gain);
        }
        DynamicSpectrum::new(data).unwrap()
    }

    #[test]
    fn normalized_channels_keep_the_delay() {
        let spectrum = gained_delay(200, 4000, 2500, 0.05);
        let obs = observation(1.0e-6);
        let mut config = fine_config();
        config.window = WindowConfig::single();
        config.window.normalize_channels = true;
        let report = run_single(&obs, &spectrum, &config).unwrap();

        let cutout = &report.observation.cutout;
        assert!(cutout.view().iter().all(|v| v.is_finite()));
        // Gain removed, off-pulse level subtracted: every channel peaks at 49.
        for c in [0, 99, 199] {
            assert!((cutout.view()[[c, 500, 0]] - 49.0).abs() < 1e-9);
            assert!(cutout.view()[[c, 10, 1]].abs() < 1e-12);
        }
        let offset = report.delay.estimate.offset_ns().unwrap();
        assert!((offset + 50.0).abs() < 1.0, "offset {} ns", offset);
    }

    #[test]
    fn single_run_reports_spectrum_and_delay() {
        let spectrum = pulsed(16, 4000, 2500);
        let obs = observation(1.0e-6);
        let mut config = fine_config();
        config.window = WindowConfig::single();
        let report = run_single(&obs, &spectrum, &config).unwrap();
        assert_eq!(report.observation.pulse_bin, 2500);
        assert_eq!(report.spectrum.pulse_bins().len(), 100);
        assert_eq!(report.frequencies.len(), 16);
        assert!((report.frequencies[1] - 1312.5).abs() < 1e-9);
        assert!(!report.delay.estimate.is_detection());
    }
}
