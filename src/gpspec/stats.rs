//! Small NaN-aware statistics used throughout the pipeline. Non-finite
//! samples mark missing cells and are skipped everywhere.

/// MAD to Gaussian standard deviation.
const MAD_TO_SIGMA: f64 = 1.4826;

pub fn finite_mean<'a, I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0f64, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Sum of the finite samples, `None` when there are none.
pub fn finite_sum<'a, I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut any = false;
    let mut sum = 0.0;
    for v in values.into_iter().filter(|v| v.is_finite()) {
        any = true;
        sum += v;
    }
    if any {
        Some(sum)
    } else {
        None
    }
}

/// Population mean and standard deviation of the finite samples.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    let mean = finite_mean(values)?;
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let var = finite.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / finite.len() as f64;
    Some((mean, var.sqrt()))
}

pub fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Median and noise level of a series.
///
/// The noise level is the MAD scaled to a Gaussian sigma. When more than half
/// of the samples are identical the MAD collapses to zero, and the plain
/// standard deviation is used instead.
pub fn robust_level(values: &[f64]) -> Option<(f64, f64)> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(f64::total_cmp);
    let median = median_of_sorted(&finite);

    let mut deviations: Vec<f64> = finite.iter().map(|v| (v - median).abs()).collect();
    deviations.sort_by(f64::total_cmp);
    let sigma = median_of_sorted(&deviations) * MAD_TO_SIGMA;
    if sigma > f64::EPSILON * median.abs().max(1.0) {
        return Some((median, sigma));
    }
    let (_, std) = mean_std(&finite)?;
    Some((median, std))
}

/// Zero mean, unit variance. A constant series only has its mean removed.
pub fn standardize(values: &[f64]) -> Vec<f64> {
    match mean_std(values) {
        Some((mean, std)) if std > 0.0 => values.iter().map(|v| (v - mean) / std).collect(),
        Some((mean, _)) => values.iter().map(|v| v - mean).collect(),
        None => values.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_skips_missing_cells() {
        let v = [1.0, f64::NAN, 3.0, f64::INFINITY];
        assert_eq!(finite_mean(&v), Some(2.0));
        assert_eq!(finite_mean(&[f64::NAN]), None);
        assert_eq!(finite_sum(&v), Some(4.0));
    }

    #[test]
    fn robust_level_uses_mad() {
        let v = [1.0, 2.0, 3.0, 4.0, 100.0];
        let (median, sigma) = robust_level(&v).unwrap();
        assert_eq!(median, 3.0);
        assert!((sigma - 1.4826).abs() < 1e-12);
    }

    #[test]
    fn robust_level_falls_back_to_std_for_flat_series() {
        let mut v = vec![0.0; 99];
        v.push(10.0);
        let (median, sigma) = robust_level(&v).unwrap();
        assert_eq!(median, 0.0);
        assert!((sigma - 0.994987).abs() < 1e-5);
    }

    #[test]
    fn standardize_gives_unit_variance() {
        let z = standardize(&[1.0, 2.0, 3.0, 4.0]);
        let (mean, std) = mean_std(&z).unwrap();
        assert!(mean.abs() < 1e-12);
        assert!((std - 1.0).abs() < 1e-12);
    }
}
