use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use gpspec::args::{observation_source, pipeline_config, DelayArgs, SearchArgs, WindowArgs};
use gpspec::config::WindowConfig;
use gpspec::delay::DelayEstimate;
use gpspec::noise::NoiseModelFit;
use gpspec::pipeline::run_single;
use gpspec::Polarization;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pulse_spectrum",
    version = env!("CARGO_PKG_VERSION"),
    about = "Spectrum, noise model and XY/YX delay of the brightest giant pulse in one observation"
)]
struct Cli {
    /// Input array (foldspec*.npy with its icount*.npy, or *waterfall*.npy).
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    #[arg(long)]
    telescope: String,

    /// Start time (RFC 3339 or "YYYY-MM-DD HH:MM:SS", UTC).
    #[arg(long)]
    start: String,

    /// Observed band in MHz.
    #[arg(long, value_name = "LOWER,UPPER")]
    band: String,

    /// Fold duration [s].
    #[arg(long, value_name = "SECONDS")]
    deltat: f64,

    /// Time-bin width [s]; required for waterfall input.
    #[arg(long, value_name = "SECONDS")]
    bin_width: Option<f64>,

    /// RFI-free channel ranges (e.g., "10,480"). Repeatable.
    #[arg(long, num_args = 1.., value_name = "MIN,MAX")]
    clean: Vec<String>,

    /// Fold used from folded input.
    #[arg(long, default_value_t = 0)]
    fold: usize,

    #[command(flatten)]
    search: SearchArgs,

    #[command(flatten)]
    window: WindowArgs,

    #[command(flatten)]
    delay: DelayArgs,
}

fn print_noise(pol: Polarization, fit: &NoiseModelFit) {
    let show = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |s| format!("{:.4}", s));
    println!(
        "Noise {}         : estimated sigma {}, fitted sigma {} ({} histogram bins)",
        pol.label(),
        show(fit.estimated_sigma),
        show(fit.fitted_sigma),
        fit.histogram.centers.len()
    );
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if std::env::args_os().len() == 1 {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }
    let cli = Cli::parse();

    let config = pipeline_config(
        &cli.search,
        &cli.window,
        WindowConfig::single(),
        &cli.delay,
        cli.fold,
    );
    let source = observation_source(
        cli.input.clone(),
        &cli.telescope,
        &cli.start,
        &cli.band,
        cli.deltat,
        cli.bin_width,
        &cli.clean,
    )
    .context("invalid observation arguments")?;
    let (observation, spectrum) = source
        .load(config.fold_index)
        .with_context(|| format!("failed to load {}", cli.input.display()))?;

    let report = run_single(&observation, &spectrum, &config)
        .with_context(|| format!("pulse spectrum of {} failed", observation.telescope))?;

    println!("Input file       : {}", cli.input.display());
    println!("Telescope        : {}", report.observation.telescope);
    println!(
        "Pulse bin        : {} (sub-bin {:.3})",
        report.observation.pulse_bin, report.observation.pulse_position
    );
    println!("Pulse time       : {}", report.observation.pulse_time_of_day());
    println!("Pulse bins summed: {}", report.spectrum.pulse_bins().len());
    println!(
        "Channels         : {} ({:.3} - {:.3} MHz)",
        report.spectrum.n_chan(),
        observation.band.lower,
        observation.band.upper
    );
    if let Some(noise) = &report.noise {
        print_noise(Polarization::XX, &noise.xx);
        print_noise(Polarization::YY, &noise.yy);
    }
    match report.delay.estimate {
        DelayEstimate::Detected { peak_sigma, .. } => println!(
            "Offset (R-L)     : {:.3} ns ({:.3} m, {:.2} sigma)",
            report.delay.estimate.offset_ns().unwrap_or(f64::NAN),
            report.delay.estimate.light_travel_m().unwrap_or(f64::NAN),
            peak_sigma
        ),
        DelayEstimate::NoDetection { reason, peak_sigma } => println!(
            "Offset (R-L)     : no detection ({:?}, peak {:.2} sigma)",
            reason, peak_sigma
        ),
    }
    Ok(())
}
