use gpspec::config::PipelineConfig;
use gpspec::observation::{parse_start_time, N_POL};
use gpspec::pipeline::run_dual;
use gpspec::{DynamicSpectrum, FrequencyBand, GpError, Observation};
use ndarray::Array3;
use std::f64::consts::PI;

const N_CHAN: usize = 200;
const N_TIME: usize = 2000;
const BIN_WIDTH: f64 = 1.0e-6;

fn observation(telescope: &str, lower: f64, upper: f64) -> Observation {
    Observation::new(
        telescope,
        parse_start_time("2015-06-21T03:00:00Z").unwrap(),
        N_TIME as f64 * BIN_WIDTH,
        BIN_WIDTH,
        FrequencyBand::new(lower, upper).unwrap(),
        None,
    )
    .unwrap()
}

/// Unit background with one bright bin. Cross products carry a phase that
/// winds through `delay_us` across 1 MHz channels.
fn pulsed(at: usize, delay_us: f64) -> DynamicSpectrum {
    let mut data = Array3::<f64>::ones((N_CHAN, N_TIME, N_POL));
    for c in 0..N_CHAN {
        let phase = 2.0 * PI * c as f64 * delay_us;
        data[[c, at, 0]] = 50.0;
        data[[c, at, 1]] = 1.0 + 5.0 * phase.cos();
        data[[c, at, 2]] = 1.0 + 5.0 * phase.sin();
        data[[c, at, 3]] = 50.0;
    }
    DynamicSpectrum::new(data).unwrap()
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.search.search_resolution = 1.0e-5;
    config.search.search_radius = 1.0e-5;
    config
}

#[test]
fn offset_bands_are_aligned_and_compared() {
    let jb = observation("JB", 1300.0, 1500.0);
    let gmrt = observation("GMRT", 1350.0, 1550.0);
    let jb_spec = pulsed(1200, 0.0);
    let gmrt_spec = pulsed(1500, 0.0);

    let report = run_dual((&jb, &jb_spec), (&gmrt, &gmrt_spec), &config()).unwrap();

    assert_eq!(report.first.pulse_bin, 1200);
    assert_eq!(report.second.pulse_bin, 1500);
    assert_eq!(report.first.pulse_time_of_day(), "03:00:00.001200");
    assert_eq!(report.second.pulse_time_of_day(), "03:00:00.001500");

    assert_eq!(report.aligned.band, FrequencyBand::new(1300.0, 1550.0).unwrap());
    assert_eq!(report.aligned.first.cutout.n_chan(), 250);
    assert_eq!(report.aligned.second.cutout.n_chan(), 250);
    assert_eq!(report.aligned.second.clean_channels[0], 50);
    assert!((report.comparison.second.frequencies[0] - 1350.0).abs() < 1e-9);
    assert_eq!(
        report.comparison.overlap,
        Some(FrequencyBand::new(1350.0, 1500.0).unwrap())
    );
    assert!(report.scale.is_none());

    // No timing offset was injected.
    assert!(!report.first_delay.estimate.is_detection());
    assert!(!report.second_delay.estimate.is_detection());
}

#[test]
fn flat_second_observation_aborts_the_run() {
    let jb = observation("JB", 1300.0, 1500.0);
    let gmrt = observation("GMRT", 1350.0, 1550.0);
    let jb_spec = pulsed(1200, 0.0);
    let flat = DynamicSpectrum::new(Array3::<f64>::ones((N_CHAN, N_TIME, N_POL))).unwrap();

    match run_dual((&jb, &jb_spec), (&gmrt, &flat), &config()) {
        Err(GpError::NoPulseFound { telescope, .. }) => assert_eq!(telescope, "GMRT"),
        other => panic!("expected NoPulseFound, got {:?}", other.map(|r| r.second.pulse_bin)),
    }
}

#[test]
fn injected_cross_polarization_delay_is_measured() {
    let jb = observation("JB", 1300.0, 1500.0);
    let gmrt = observation("GMRT", 1350.0, 1550.0);
    let jb_spec = pulsed(1200, 0.05);
    let gmrt_spec = pulsed(1200, 0.0);

    let mut config = config();
    config.scale_to_first = true;
    let report = run_dual((&jb, &jb_spec), (&gmrt, &gmrt_spec), &config).unwrap();

    let offset = report.first_delay.estimate.offset_ns().unwrap();
    assert!((offset + 50.0).abs() < 1.0, "offset {} ns", offset);
    assert!(!report.second_delay.estimate.is_detection());
    assert!((report.scale.unwrap() - 1.0).abs() < 1e-12);
}
