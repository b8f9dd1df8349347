use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::error::{GpError, Result};

/// Number of polarization products carried by every dynamic spectrum.
pub const N_POL: usize = 4;

/// Polarization products, in the order they appear on the last array axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarization {
    XX,
    XY,
    YX,
    YY,
}

impl Polarization {
    pub fn index(self) -> usize {
        match self {
            Polarization::XX => 0,
            Polarization::XY => 1,
            Polarization::YX => 2,
            Polarization::YY => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Polarization::XX => "XX",
            Polarization::XY => "XY",
            Polarization::YX => "YX",
            Polarization::YY => "YY",
        }
    }
}

/// Observed frequency band [MHz]; channel 0 sits at the lower edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBand {
    pub lower: f64,
    pub upper: f64,
}

impl FrequencyBand {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !(lower.is_finite() && upper.is_finite()) || lower >= upper {
            return Err(GpError::InvalidInput(format!(
                "frequency band requires LOWER < UPPER, got [{}, {}] MHz",
                lower, upper
            )));
        }
        Ok(FrequencyBand { lower, upper })
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn channel_width(&self, n_chan: usize) -> f64 {
        self.width() / n_chan.max(1) as f64
    }

    /// Lower edge of channel `idx` when the band is split into `n_chan` channels.
    pub fn channel_frequency(&self, idx: usize, n_chan: usize) -> f64 {
        self.lower + idx as f64 * self.channel_width(n_chan)
    }

    pub fn union(&self, other: &FrequencyBand) -> FrequencyBand {
        FrequencyBand {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }
}

/// Metadata of one telescope recording. Immutable once built.
#[derive(Debug, Clone)]
pub struct Observation {
    pub telescope: String,
    pub start_time: DateTime<Utc>,
    /// Duration of one fold cycle [s].
    pub deltat: f64,
    /// Width of one time (phase) bin [s].
    pub bin_width: f64,
    pub band: FrequencyBand,
    /// RFI-free channels; `None` means every channel is usable.
    pub clean_channels: Option<Vec<usize>>,
}

impl Observation {
    pub fn new(
        telescope: impl Into<String>,
        start_time: DateTime<Utc>,
        deltat: f64,
        bin_width: f64,
        band: FrequencyBand,
        clean_channels: Option<Vec<usize>>,
    ) -> Result<Self> {
        if !(bin_width > 0.0) || !bin_width.is_finite() {
            return Err(GpError::InvalidInput(format!(
                "bin width must be positive, got {}",
                bin_width
            )));
        }
        if !(deltat > 0.0) {
            return Err(GpError::InvalidInput(format!(
                "fold duration must be positive, got {}",
                deltat
            )));
        }
        Ok(Observation {
            telescope: telescope.into(),
            start_time,
            deltat,
            bin_width,
            band: FrequencyBand::new(band.lower, band.upper)?,
            clean_channels,
        })
    }

    /// RFI-free channels resolved against an array of `n_chan` channels.
    pub fn clean_channels_for(&self, n_chan: usize) -> Result<Vec<usize>> {
        match &self.clean_channels {
            None => Ok((0..n_chan).collect()),
            Some(chans) => {
                if let Some(&bad) = chans.iter().find(|&&c| c >= n_chan) {
                    return Err(GpError::InvalidInput(format!(
                        "RFI-free channel {} of {} is outside {} channels",
                        bad, self.telescope, n_chan
                    )));
                }
                Ok(chans.clone())
            }
        }
    }

    /// Arrival time of full-resolution bin `bin`.
    pub fn time_of_bin(&self, bin: usize) -> DateTime<Utc> {
        let offset_ns = (bin as f64 * self.bin_width * 1e9).round() as i64;
        self.start_time + Duration::nanoseconds(offset_ns)
    }
}

/// Parses a band given as `LOWER,UPPER` in MHz.
pub fn parse_band(text: &str) -> Result<FrequencyBand> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() != 2 {
        return Err(GpError::InvalidInput(format!(
            "invalid frequency band '{}', expected LOWER,UPPER",
            text
        )));
    }
    let edge = |s: &str| {
        s.parse::<f64>()
            .map_err(|_| GpError::InvalidInput(format!("invalid band edge: {}", s)))
    };
    FrequencyBand::new(edge(parts[0])?, edge(parts[1])?)
}

/// Clock time of day with microsecond precision, e.g. `21:04:17.123456`.
pub fn format_time_of_day(time: &DateTime<Utc>) -> String {
    time.format("%H:%M:%S%.6f").to_string()
}

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC).
pub fn parse_start_time(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(GpError::InvalidInput(format!(
        "cannot parse start time '{}'",
        text
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn band_rejects_inverted_edges() {
        assert!(FrequencyBand::new(1500.0, 1300.0).is_err());
        assert!(FrequencyBand::new(1300.0, 1300.0).is_err());
        let band = FrequencyBand::new(1300.0, 1500.0).unwrap();
        assert!((band.channel_width(200) - 1.0).abs() < 1e-12);
        assert!((band.channel_frequency(10, 200) - 1310.0).abs() < 1e-12);
    }

    #[test]
    fn band_parses_from_text() {
        let band = parse_band("1350, 1550").unwrap();
        assert_eq!((band.lower, band.upper), (1350.0, 1550.0));
        assert!(parse_band("1350").is_err());
        assert!(parse_band("1550,1350").is_err());
    }

    #[test]
    fn observation_requires_positive_bin_width() {
        let band = FrequencyBand::new(1300.0, 1500.0).unwrap();
        let start = parse_start_time("2015-06-21T03:00:00Z").unwrap();
        assert!(Observation::new("JB", start, 1.0, 0.0, band, None).is_err());
        assert!(Observation::new("JB", start, 1.0, 1e-6, band, None).is_ok());
    }

    #[test]
    fn time_of_bin_adds_bin_offsets() {
        let band = FrequencyBand::new(1300.0, 1500.0).unwrap();
        let start = parse_start_time("2015-06-21 03:00:00").unwrap();
        let obs = Observation::new("GMRT", start, 1.0, 1e-6, band, None).unwrap();
        let t = obs.time_of_bin(1200);
        assert_eq!(t.nanosecond(), 1_200_000);
        assert_eq!(format_time_of_day(&t), "03:00:00.001200");
    }

    #[test]
    fn clean_channels_outside_array_are_rejected() {
        let band = FrequencyBand::new(1300.0, 1500.0).unwrap();
        let start = parse_start_time("2015-06-21T03:00:00Z").unwrap();
        let obs = Observation::new("JB", start, 1.0, 1e-6, band, Some(vec![0, 5, 12])).unwrap();
        assert!(obs.clean_channels_for(10).is_err());
        assert_eq!(obs.clean_channels_for(16).unwrap(), vec![0, 5, 12]);
    }
}
