use gpspec::delay::{DelayEstimate, DelaySpectrum};
use gpspec::pipeline::{ComparisonTrace, DualReport, ObservationResult};

fn print_observation(label: &str, result: &ObservationResult) {
    println!("[{}] {}", label, result.telescope);
    println!(
        "  Pulse bin        : {} (sub-bin {:.3})",
        result.pulse_bin, result.pulse_position
    );
    println!("  Pulse time       : {}", result.pulse_time_of_day());
    println!("  Candidates       : {}", result.candidates.len());
    println!(
        "  Cutout           : {} channels x {} bins from bin {}",
        result.cutout.n_chan(),
        result.cutout.n_time(),
        result.cutout.start_bin()
    );
    println!("  RFI-free chans   : {}", result.clean_channels.len());
}

fn strongest(values: &[f64], axis: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .zip(axis)
        .filter(|(v, _)| v.is_finite())
        .max_by(|a, b| a.0.total_cmp(b.0))
        .map(|(v, x)| (*v, *x))
}

fn print_trace(label: &str, trace: &ComparisonTrace) {
    if let Some((value, time)) = strongest(&trace.profile, &trace.times) {
        println!(
            "  {:<16} : profile peak {:.2} sigma at {:+.1} us",
            label,
            value,
            time * 1e6
        );
    }
    if let Some((value, freq)) = strongest(&trace.spectrum, &trace.frequencies) {
        println!(
            "  {:<16} : spectrum peak {:.2} sigma at {:.3} MHz",
            "", value, freq
        );
    }
}

fn print_delay(telescope: &str, delay: &DelaySpectrum) {
    match delay.estimate {
        DelayEstimate::Detected { peak_sigma, .. } => {
            let ns = delay.estimate.offset_ns().unwrap_or(f64::NAN);
            let metres = delay.estimate.light_travel_m().unwrap_or(f64::NAN);
            println!(
                "  {:<16} : Offset (R-L) {:.3} ns ({:.3} m), {:.2} sigma",
                telescope, ns, metres, peak_sigma
            );
        }
        DelayEstimate::NoDetection { reason, peak_sigma } => {
            println!(
                "  {:<16} : no detection ({:?}, peak {:.2} sigma)",
                telescope, reason, peak_sigma
            );
        }
    }
}

pub fn print(report: &DualReport) {
    print_observation("1", &report.first);
    print_observation("2", &report.second);

    println!("Alignment");
    println!(
        "  Common band      : {:.3} - {:.3} MHz ({} channels of {:.6} MHz)",
        report.aligned.band.lower,
        report.aligned.band.upper,
        report.aligned.first.cutout.n_chan(),
        report.aligned.channel_width()
    );
    println!(
        "  Padding (lo/hi)  : {}/{} and {}/{}",
        report.aligned.first.pad_low,
        report.aligned.first.pad_high,
        report.aligned.second.pad_low,
        report.aligned.second.pad_high
    );
    match report.comparison.overlap {
        Some(band) => println!(
            "  Overlap          : {:.3} - {:.3} MHz",
            band.lower, band.upper
        ),
        None => println!("  Overlap          : none"),
    }
    if let Some(scale) = report.scale {
        println!("  Scale (2 to 1)   : {:.4}", scale);
    }

    println!("Comparison");
    print_trace(&report.first.telescope, &report.comparison.first);
    print_trace(&report.second.telescope, &report.comparison.second);

    println!("Delay");
    print_delay(&report.first.telescope, &report.first_delay);
    print_delay(&report.second.telescope, &report.second_delay);
}
