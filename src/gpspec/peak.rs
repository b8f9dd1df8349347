use crate::error::{GpError, Result};

/// Abscissa of the vertex of the parabola through three samples that bracket a
/// discrete maximum. The samples are assumed evenly spaced.
///
/// Fails with `DegenerateFit` when the three points are collinear.
pub fn estimate_peak(x: &[f64; 3], w: &[f64; 3]) -> Result<f64> {
    let denominator = w[0] - 2.0 * w[1] + w[2];
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(GpError::DegenerateFit(format!(
            "samples {:?} are collinear, no vertex",
            w
        )));
    }
    let p = 0.5 * (w[0] - w[2]) / denominator;
    Ok(x[1] + p * (x[2] - x[1]))
}

/// Sub-bin position of the maximum at `idx` of `values`, using its two
/// neighbours. `None` when `idx` sits on an edge or the fit is degenerate.
pub fn refine_index(axis: &[f64], values: &[f64], idx: usize) -> Option<f64> {
    if idx == 0 || idx + 1 >= values.len() || idx + 1 >= axis.len() {
        return None;
    }
    let x = [axis[idx - 1], axis[idx], axis[idx + 1]];
    let w = [values[idx - 1], values[idx], values[idx + 1]];
    estimate_peak(&x, &w).ok()
}
