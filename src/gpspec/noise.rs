//! Noise model of a pulse spectrum: the intensity distribution of the XX and
//! YY spectra, normalised by their means, is compared against an
//! exponentially modified Gaussian with `mu = 0`, `gamma = 1`.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use statrs::function::erf::erfc;

use crate::error::{GpError, Result};
use crate::observation::Polarization;
use crate::spectrum::PulseSpectrum;
use crate::stats::{finite_mean, mean_std};

const N_EDGES: usize = 50;
const INITIAL_SIGMA: f64 = 0.1;
const MAX_ITERATIONS: usize = 200;

/// Exponentially modified Gaussian density with `mu = 0` and `gamma = 1`.
/// Evaluates to 0 where the closed form over- or underflows.
pub fn exgauss_pdf(x: f64, sigma: f64) -> f64 {
    let s2 = sigma * sigma;
    let value = 0.5 * (0.5 * s2 - x).exp() * erfc((s2 - x) / (std::f64::consts::SQRT_2 * sigma));
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Density histogram with its empty bins removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub centers: Vec<f64>,
    pub density: Vec<f64>,
    /// Poisson uncertainty of each density value.
    pub uncertainty: Vec<f64>,
}

impl Histogram {
    /// `N_EDGES - 1` equal bins between `lower` and `upper`; the last bin is closed.
    pub fn new(values: &[f64], lower: f64, upper: f64) -> Result<Self> {
        if !(upper > lower) {
            return Err(GpError::InvalidInput(format!(
                "histogram range [{}, {}] is empty",
                lower, upper
            )));
        }
        let n_bins = N_EDGES - 1;
        let width = (upper - lower) / n_bins as f64;
        let edges: Vec<f64> = (0..N_EDGES).map(|i| lower + i as f64 * width).collect();

        let mut counts = vec![0usize; n_bins];
        let mut total = 0usize;
        for &v in values.iter().filter(|v| v.is_finite()) {
            if v < lower || v > upper {
                continue;
            }
            let idx = (((v - lower) / width) as usize).min(n_bins - 1);
            counts[idx] += 1;
            total += 1;
        }
        if total == 0 {
            return Err(GpError::InvalidInput(
                "no samples inside the histogram range".to_string(),
            ));
        }

        let norm = width * total as f64;
        let mut hist = Histogram {
            edges,
            centers: Vec::new(),
            density: Vec::new(),
            uncertainty: Vec::new(),
        };
        for (i, &count) in counts.iter().enumerate().filter(|(_, &c)| c > 0) {
            let density = count as f64 / norm;
            hist.centers.push(lower + (i as f64 + 0.5) * width);
            hist.density.push(density);
            hist.uncertainty.push((density * norm).sqrt() / norm);
        }
        Ok(hist)
    }
}

fn weighted_residuals(x: &[f64], y: &[f64], w: &[f64], sigma: f64) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        x.iter()
            .zip(y)
            .zip(w)
            .map(|((&xi, &yi), &wi)| (yi - exgauss_pdf(xi, sigma)) / wi),
    )
}

/// Weighted least-squares fit of [`exgauss_pdf`] to `(x, y)` by
/// Levenberg–Marquardt, with a forward-difference Jacobian.
pub fn fit_sigma(x: &[f64], y: &[f64], weights: &[f64], start: f64) -> Result<f64> {
    if x.len() != y.len() || x.len() != weights.len() || x.is_empty() {
        return Err(GpError::InvalidInput(
            "fit needs equally long, non-empty x, y and weight vectors".to_string(),
        ));
    }
    if weights.iter().any(|w| !(*w > 0.0)) {
        return Err(GpError::InvalidInput("fit weights must be positive".to_string()));
    }

    let mut params = DVector::from_element(1, start);
    let mut residuals = weighted_residuals(x, y, weights, params[0]);
    let mut cost = residuals.norm_squared();
    let mut lambda = 1.0e-3;

    for iteration in 0..MAX_ITERATIONS {
        let step = 1.0e-8 * params[0].abs().max(1.0e-8);
        let shifted = weighted_residuals(x, y, weights, params[0] + step);
        // Jacobian of the model, i.e. minus that of the residuals.
        let jacobian: DMatrix<f64> =
            DMatrix::from_column_slice(x.len(), 1, (&residuals - &shifted).as_slice()) / step;

        let jtj = jacobian.transpose() * &jacobian;
        let jtr = jacobian.transpose() * &residuals;
        let mut damped = jtj.clone();
        for i in 0..damped.nrows() {
            damped[(i, i)] += lambda * jtj[(i, i)].max(1.0e-12);
        }
        let delta = damped.lu().solve(&jtr).ok_or_else(|| {
            GpError::DegenerateFit("singular normal matrix in noise-model fit".to_string())
        })?;

        let candidate = &params + &delta;
        let trial = weighted_residuals(x, y, weights, candidate[0]);
        let trial_cost = trial.norm_squared();
        if trial_cost.is_finite() && trial_cost <= cost {
            let improvement = cost - trial_cost;
            params = candidate;
            residuals = trial;
            cost = trial_cost;
            lambda = (lambda / 10.0).max(1.0e-12);
            if delta.norm() <= 1.0e-10 * (params.norm() + 1.0e-10)
                || improvement <= 1.0e-15 * cost.max(1.0e-300)
            {
                debug!("noise fit converged after {} iterations", iteration + 1);
                return Ok(params[0]);
            }
        } else {
            lambda *= 10.0;
            if lambda > 1.0e12 {
                debug!("noise fit stalled after {} iterations", iteration + 1);
                return Ok(params[0]);
            }
        }
    }
    warn!("noise-model fit did not converge in {} iterations", MAX_ITERATIONS);
    Ok(params[0])
}

/// Result for one polarization product.
#[derive(Debug, Clone)]
pub struct NoiseModelFit {
    /// Moment estimate `sqrt(var - 1)`, only when the standard deviation exceeds 1.
    pub estimated_sigma: Option<f64>,
    /// Least-squares sigma; absent when the fit failed or came out non-positive.
    pub fitted_sigma: Option<f64>,
    pub histogram: Histogram,
}

/// Fits the noise model to mean-normalised `values` histogrammed over `[lower, upper]`.
pub fn fit_noise_model(values: &[f64], lower: f64, upper: f64) -> Result<NoiseModelFit> {
    let histogram = Histogram::new(values, lower, upper)?;
    let estimated_sigma = match mean_std(values) {
        Some((_, std)) if std > 1.0 => Some((std * std - 1.0).sqrt()),
        _ => None,
    };
    let fitted_sigma = match fit_sigma(
        &histogram.centers,
        &histogram.density,
        &histogram.uncertainty,
        INITIAL_SIGMA,
    ) {
        Ok(sigma) if sigma > 0.0 => Some(sigma),
        Ok(sigma) => {
            debug!("fitted sigma {} is not positive", sigma);
            None
        }
        Err(e) => {
            warn!("noise-model fit failed: {}", e);
            None
        }
    };
    Ok(NoiseModelFit {
        estimated_sigma,
        fitted_sigma,
        histogram,
    })
}

/// Noise models of the XX and YY spectra.
#[derive(Debug, Clone)]
pub struct PolarizationNoise {
    pub xx: NoiseModelFit,
    pub yy: NoiseModelFit,
}

fn mean_normalized(spectrum: &PulseSpectrum, pol: Polarization) -> Result<Vec<f64>> {
    let values = spectrum.polarization(pol).to_vec();
    match finite_mean(&values) {
        Some(mean) if mean != 0.0 => Ok(values.iter().map(|v| v / mean).collect()),
        _ => Err(GpError::InvalidInput(format!(
            "{} spectrum has no usable mean",
            pol.label()
        ))),
    }
}

/// Both products share one histogram range, `[floor(min), ceil(max)]` over the two.
pub fn fit_polarization_noise(spectrum: &PulseSpectrum) -> Result<PolarizationNoise> {
    let xx = mean_normalized(spectrum, Polarization::XX)?;
    let yy = mean_normalized(spectrum, Polarization::YY)?;
    let finite = || xx.iter().chain(yy.iter()).copied().filter(|v| v.is_finite());
    let lower = finite().fold(f64::INFINITY, f64::min).floor();
    let upper = finite().fold(f64::NEG_INFINITY, f64::max).ceil();
    Ok(PolarizationNoise {
        xx: fit_noise_model(&xx, lower, upper)?,
        yy: fit_noise_model(&yy, lower, upper)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_integrates_to_one() {
        let dx = 0.001;
        let total: f64 = (-10_000..30_000)
            .map(|i| exgauss_pdf(i as f64 * dx, 0.5) * dx)
            .sum();
        assert!((total - 1.0).abs() < 1e-3, "integral {}", total);
        assert_eq!(exgauss_pdf(-1.0e4, 0.5), 0.0);
    }

    #[test]
    fn histogram_drops_empty_bins() {
        let values = [0.05, 0.06, 0.2, 4.0];
        let hist = Histogram::new(&values, 0.0, 4.0).unwrap();
        assert_eq!(hist.edges.len(), 50);
        assert_eq!(hist.centers.len(), 3);
        let width = 4.0 / 49.0;
        assert!((hist.density[0] - 2.0 / (4.0 * width)).abs() < 1e-12);
        // The closed upper edge belongs to the last bin.
        assert!((hist.centers[2] - (4.0 - 0.5 * width)).abs() < 1e-12);
        let area: f64 = hist.density.iter().map(|d| d * width).sum();
        assert!((area - 1.0).abs() < 1e-12);
    }

    #[test]
    fn recovers_sigma_from_exact_density() {
        let x: Vec<f64> = (0..60).map(|i| -2.0 + i as f64 * 0.15).collect();
        let y: Vec<f64> = x.iter().map(|&xi| exgauss_pdf(xi, 0.6)).collect();
        let w = vec![1.0; x.len()];
        let sigma = fit_sigma(&x, &y, &w, INITIAL_SIGMA).unwrap();
        assert!((sigma - 0.6).abs() < 1e-3, "sigma {}", sigma);
    }

    #[test]
    fn moment_estimate_needs_spread_above_one() {
        let narrow: Vec<f64> = (0..200).map(|i| 1.0 + 0.01 * ((i % 7) as f64 - 3.0)).collect();
        let fit = fit_noise_model(&narrow, 0.0, 2.0).unwrap();
        assert!(fit.estimated_sigma.is_none());

        let wide: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { -1.0 } else { 3.0 }).collect();
        let fit = fit_noise_model(&wide, -1.0, 3.0).unwrap();
        // std = 2, so sqrt(4 - 1).
        assert!((fit.estimated_sigma.unwrap() - 3.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn rejects_zero_mean_spectrum() {
        let spectrum = PulseSpectrum::from_array(ndarray::Array2::zeros((8, 4))).unwrap();
        assert!(fit_polarization_noise(&spectrum).is_err());
    }
}
