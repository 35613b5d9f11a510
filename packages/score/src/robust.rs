//! Robust z-score normalization (median / MAD).
//!
//! `z = (x - median) / (MAD + eps)`, clamped to [`-Z_CLAMP`, `Z_CLAMP`].
//! When more than half the values share one value the MAD collapses to
//! zero; the population standard deviation is used instead, and if that
//! is also zero the column is constant and every z-score is `0.0`.
//!
//! NaN inputs are left out of the median, MAD, and standard deviation and
//! come back as NaN z-scores.

/// Guards the scale division. Far below any meaningful density scale.
pub const MAD_EPS: f64 = 1e-9;

/// Absolute bound on any z-score.
pub const Z_CLAMP: f64 = 10.0;

/// Median of the non-NaN values, or `None` if there are none.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Median absolute deviation from `center`.
#[must_use]
pub fn median_abs_deviation(values: &[f64], center: f64) -> Option<f64> {
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Population (ddof = 0) standard deviation of the non-NaN values.
#[must_use]
pub fn population_std(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Which scale estimator [`robust_zscore`] ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// Median absolute deviation.
    Mad,
    /// Population standard deviation (MAD was degenerate).
    StdFallback,
    /// Column is constant; all z-scores are zero.
    Constant,
}

/// Robust z-scores of a column, with the scale estimator that was used.
#[must_use]
pub fn robust_zscore_with_scale(values: &[f64]) -> (Vec<f64>, Scale) {
    let Some(center) = median(values) else {
        return (vec![0.0; values.len()], Scale::Constant);
    };

    let mad = median_abs_deviation(values, center).unwrap_or(0.0);

    let (scale, kind) = if mad < MAD_EPS {
        let std = population_std(values);
        if std < MAD_EPS {
            return (vec![0.0; values.len()], Scale::Constant);
        }
        (std, Scale::StdFallback)
    } else {
        (mad, Scale::Mad)
    };

    let z = values
        .iter()
        .map(|x| ((x - center) / (scale + MAD_EPS)).clamp(-Z_CLAMP, Z_CLAMP))
        .collect();

    (z, kind)
}

/// Robust z-scores of a column, clamped to [`-Z_CLAMP`, `Z_CLAMP`].
#[must_use]
pub fn robust_zscore(values: &[f64]) -> Vec<f64> {
    robust_zscore_with_scale(values).0
}
