use crate::error::{GpError, Result};

/// Parses inclusive channel ranges given as `MIN,MAX` into a sorted,
/// de-duplicated list of RFI-free channels.
pub fn parse_channel_ranges(range_args: &[String]) -> Result<Vec<usize>> {
    let mut channels = Vec::new();
    for pair in range_args {
        let parts: Vec<&str> = pair.split(',').map(str::trim).collect();
        if parts.len() != 2 {
            return Err(GpError::InvalidInput(format!(
                "invalid channel range '{}', expected MIN,MAX",
                pair
            )));
        }
        let min: usize = parts[0].parse().map_err(|_| {
            GpError::InvalidInput(format!("invalid channel range minimum: {}", parts[0]))
        })?;
        let max: usize = parts[1].parse().map_err(|_| {
            GpError::InvalidInput(format!("invalid channel range maximum: {}", parts[1]))
        })?;
        if min > max {
            return Err(GpError::InvalidInput(format!(
                "invalid channel range: min ({}) > max ({})",
                min, max
            )));
        }
        channels.extend(min..=max);
    }
    channels.sort_unstable();
    channels.dedup();
    Ok(channels)
}

/// Re-expresses channel indices against an array grown by `offset` channels at its low edge.
pub fn shift_channels(channels: &[usize], offset: usize) -> Vec<usize> {
    channels.iter().map(|&c| c + offset).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_merges_ranges() {
        let args = vec!["10,12".to_string(), "0,2".to_string(), "11,13".to_string()];
        let chans = parse_channel_ranges(&args).unwrap();
        assert_eq!(chans, vec![0, 1, 2, 10, 11, 12, 13]);
    }

    #[test]
    fn rejects_malformed_ranges() {
        assert!(parse_channel_ranges(&["5".to_string()]).is_err());
        assert!(parse_channel_ranges(&["7,3".to_string()]).is_err());
        assert!(parse_channel_ranges(&["a,3".to_string()]).is_err());
    }

    #[test]
    fn shift_moves_every_index() {
        assert_eq!(shift_channels(&[0, 4, 9], 50), vec![50, 54, 59]);
    }
}
