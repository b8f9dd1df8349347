//! Giant-pulse search: detection on a downsampled time series followed by
//! re-localisation of each candidate at full resolution.

use log::{debug, info, warn};
use ndarray::{Array1, ArrayView1};

use crate::config::SearchConfig;
use crate::error::{GpError, Result};
use crate::spectrum::downsample;
use crate::stats::robust_level;

/// A detected pulse: time bin and the height it was ranked by.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseCandidate {
    pub bin: usize,
    pub height: f64,
}

/// Local maxima of `series` above `median + threshold_sigma * sigma`, strongest
/// first, thinned so no two are closer than `min_separation` bins.
///
/// `sigma` is the MAD-derived noise level (standard deviation when the MAD
/// vanishes, see [`robust_level`]). Returns an empty list, never an error, when
/// nothing clears the threshold.
pub fn find_pulses(
    series: ArrayView1<f64>,
    threshold_sigma: f64,
    min_separation: usize,
) -> Vec<PulseCandidate> {
    let values = series.to_vec();
    let Some((median, sigma)) = robust_level(&values) else {
        return Vec::new();
    };
    let threshold = median + threshold_sigma * sigma;
    let at = |i: usize| {
        let v = values[i];
        if v.is_finite() {
            v
        } else {
            f64::NEG_INFINITY
        }
    };

    let n = values.len();
    let mut candidates: Vec<PulseCandidate> = (0..n)
        .filter(|&i| {
            let v = at(i);
            v.is_finite()
                && v > threshold
                && (i == 0 || v >= at(i - 1))
                && (i + 1 == n || v > at(i + 1))
        })
        .map(|i| PulseCandidate {
            bin: i,
            height: values[i],
        })
        .collect();
    candidates.sort_by(|a, b| b.height.total_cmp(&a.height).then(a.bin.cmp(&b.bin)));

    let mut kept: Vec<PulseCandidate> = Vec::with_capacity(candidates.len());
    for cand in candidates {
        if kept.iter().all(|k| k.bin.abs_diff(cand.bin) >= min_separation) {
            kept.push(cand);
        }
    }
    kept
}

/// Bin of the largest sample within `radius` bins of `approx`.
///
/// Only that neighbourhood is examined. Fails with `IndexOutOfRange` when the
/// neighbourhood does not fit inside the series.
pub fn resolve_pulse(series: ArrayView1<f64>, approx: usize, radius: usize) -> Result<usize> {
    let start = approx as isize - radius as isize;
    let end = approx as isize + radius as isize + 1;
    if start < 0 || end > series.len() as isize {
        return Err(GpError::IndexOutOfRange {
            start,
            end,
            len: series.len(),
        });
    }
    let (start, end) = (start as usize, end as usize);
    let best = (start..end)
        .filter(|&i| series[i].is_finite())
        .max_by(|&a, &b| series[a].total_cmp(&series[b]).then(b.cmp(&a)));
    Ok(best.unwrap_or(approx))
}

/// Integer factor bringing the native bin width up to the search resolution.
pub fn downsample_factor(bin_width: f64, search_resolution: f64) -> usize {
    if search_resolution <= bin_width {
        1
    } else {
        ((search_resolution / bin_width).round() as usize).max(1)
    }
}

/// Progress of a coarse-then-fine search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchState {
    Searching,
    /// Coarse candidates waiting for full-resolution re-localisation.
    Refining(Vec<PulseCandidate>),
    Resolved(Vec<PulseCandidate>),
    /// The coarse search found nothing above threshold.
    Failed,
}

/// Two-stage pulse search over one full-resolution time series.
#[derive(Debug, Clone)]
pub struct PulseSearch<'a> {
    config: &'a SearchConfig,
    bin_width: f64,
    factor: usize,
}

impl<'a> PulseSearch<'a> {
    pub fn new(config: &'a SearchConfig, bin_width: f64) -> Result<Self> {
        config.validate()?;
        if !(bin_width > 0.0) {
            return Err(GpError::InvalidInput(format!(
                "bin width must be positive, got {}",
                bin_width
            )));
        }
        Ok(PulseSearch {
            config,
            bin_width,
            factor: downsample_factor(bin_width, config.search_resolution),
        })
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    fn radius_bins(&self) -> usize {
        (self.config.search_radius / self.bin_width).round() as usize
    }

    fn min_separation_bins(&self, bin_width: f64) -> usize {
        (self.config.min_separation / bin_width).round() as usize
    }

    /// Moves the search one stage forward.
    pub fn advance(&self, state: SearchState, series: ArrayView1<f64>) -> Result<SearchState> {
        match state {
            SearchState::Searching => {
                let coarse: Array1<f64> = downsample(series, self.factor);
                let coarse_width = self.bin_width * self.factor as f64;
                let found = find_pulses(
                    coarse.view(),
                    self.config.threshold_sigma,
                    self.min_separation_bins(coarse_width),
                );
                info!(
                    "coarse search: factor {}, {} bins, {} candidate(s)",
                    self.factor,
                    coarse.len(),
                    found.len()
                );
                if found.is_empty() {
                    Ok(SearchState::Failed)
                } else if self.factor == 1 {
                    Ok(SearchState::Resolved(found))
                } else {
                    Ok(SearchState::Refining(found))
                }
            }
            SearchState::Refining(coarse) => {
                let radius = self.radius_bins();
                let mut resolved: Vec<PulseCandidate> = Vec::with_capacity(coarse.len());
                for (rank, cand) in coarse.into_iter().enumerate() {
                    let approx = cand.bin * self.factor;
                    // Only the strongest candidate places the cutout; a weaker one
                    // too close to the edge is dropped.
                    let bin = match resolve_pulse(series, approx, radius) {
                        Ok(bin) => bin,
                        Err(e) if rank > 0 => {
                            warn!(
                                "candidate {} at coarse bin {} (height {:.3}) dropped: {}",
                                rank + 1,
                                cand.bin,
                                cand.height,
                                e
                            );
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    debug!("candidate coarse bin {} -> full-resolution bin {}", cand.bin, bin);
                    if resolved.iter().all(|r| r.bin != bin) {
                        resolved.push(PulseCandidate {
                            bin,
                            height: cand.height,
                        });
                    }
                }
                Ok(SearchState::Resolved(resolved))
            }
            done => Ok(done),
        }
    }

    /// Runs the search to completion. An empty result means no pulse was found.
    pub fn run(&self, series: ArrayView1<f64>) -> Result<Vec<PulseCandidate>> {
        let mut state = SearchState::Searching;
        loop {
            state = match self.advance(state, series)? {
                SearchState::Resolved(found) => return Ok(found),
                SearchState::Failed => return Ok(Vec::new()),
                next => next,
            };
        }
    }
}
