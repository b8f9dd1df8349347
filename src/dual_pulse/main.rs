use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser};
use gpspec::args::{observation_source, pad_fill, pipeline_config, DelayArgs, SearchArgs, WindowArgs};
use gpspec::config::WindowConfig;
use gpspec::pipeline::run_dual;
use std::path::PathBuf;

mod report;

#[derive(Parser, Debug)]
#[command(
    name = "dual_pulse",
    version = env!("CARGO_PKG_VERSION"),
    about = "Locate the brightest giant pulse seen by two telescopes and compare their spectra",
    long_about = "Reads one folded spectrum (foldspec*.npy with its icount*.npy) or waterfall (*waterfall*.npy)\n\
    per telescope, finds the strongest giant pulse in each, cuts out a background-subtracted window around it,\n\
    puts both cutouts on a common frequency axis and estimates the XY/YX delay of each pulse spectrum."
)]
struct Cli {
    /// Input arrays of the two telescopes.
    #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"], required = true)]
    input: Vec<PathBuf>,

    /// Telescope names, in input order.
    #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"], required = true)]
    telescope: Vec<String>,

    /// Start times (RFC 3339 or "YYYY-MM-DD HH:MM:SS", UTC).
    #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"], required = true)]
    start: Vec<String>,

    /// Observed bands in MHz.
    #[arg(long, num_args = 2, value_names = ["LOWER,UPPER", "LOWER,UPPER"], required = true)]
    band: Vec<String>,

    /// Fold durations [s].
    #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"], required = true)]
    deltat: Vec<f64>,

    /// Time-bin widths [s]; required for waterfall inputs.
    #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"])]
    bin_width: Vec<f64>,

    /// RFI-free channel ranges of the first telescope (e.g., "10,480"). Repeatable.
    #[arg(long, num_args = 1.., value_name = "MIN,MAX")]
    clean_first: Vec<String>,

    /// RFI-free channel ranges of the second telescope. Repeatable.
    #[arg(long, num_args = 1.., value_name = "MIN,MAX")]
    clean_second: Vec<String>,

    /// Fold used from folded inputs.
    #[arg(long, default_value_t = 0)]
    fold: usize,

    /// Scale the second cutout to the peak intensity of the first.
    #[arg(long)]
    scale: bool,

    /// Value written into channels added by frequency alignment
    /// (default: per-product minimum of the clean channels).
    #[arg(long, value_name = "VALUE", allow_hyphen_values = true)]
    pad_value: Option<f64>,

    #[command(flatten)]
    search: SearchArgs,

    #[command(flatten)]
    window: WindowArgs,

    #[command(flatten)]
    delay: DelayArgs,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if std::env::args_os().len() == 1 {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }
    let cli = Cli::parse();

    for (name, len) in [
        ("--input", cli.input.len()),
        ("--telescope", cli.telescope.len()),
        ("--start", cli.start.len()),
        ("--band", cli.band.len()),
        ("--deltat", cli.deltat.len()),
    ] {
        if len != 2 {
            return Err(anyhow!("{} takes exactly two values, got {}", name, len));
        }
    }
    if !cli.bin_width.is_empty() && cli.bin_width.len() != 2 {
        return Err(anyhow!("--bin-width takes exactly two values"));
    }

    let mut config = pipeline_config(
        &cli.search,
        &cli.window,
        WindowConfig::dual(),
        &cli.delay,
        cli.fold,
    );
    config.scale_to_first = cli.scale;
    config.align.fill = pad_fill(cli.pad_value);

    let clean = [&cli.clean_first, &cli.clean_second];
    let mut loaded = Vec::with_capacity(2);
    for i in 0..2 {
        let source = observation_source(
            cli.input[i].clone(),
            &cli.telescope[i],
            &cli.start[i],
            &cli.band[i],
            cli.deltat[i],
            cli.bin_width.get(i).copied(),
            clean[i],
        )
        .with_context(|| format!("invalid arguments for {}", cli.telescope[i]))?;
        let pair = source
            .load(config.fold_index)
            .with_context(|| format!("failed to load {}", cli.input[i].display()))?;
        loaded.push(pair);
    }

    let report = run_dual(
        (&loaded[0].0, &loaded[0].1),
        (&loaded[1].0, &loaded[1].1),
        &config,
    )
    .context("dual-telescope comparison failed")?;

    report::print(&report);
    Ok(())
}
