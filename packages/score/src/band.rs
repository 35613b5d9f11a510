//! Quantile thresholds and three-level band assignment.
//!
//! Thresholds use linear interpolation between closest ranks
//! (`h = (n - 1) * q`), the same rule `NumPy` and `pandas` use by default.
//! Comparisons are inclusive at both ends, so a score equal to a
//! threshold is never ambiguous: `>= t_high` is band 3, `<= t_low` is
//! band 1.

use urbanicity_models::{Band, BandCounts, Thresholds};

/// Bands and thresholds for a city.
#[derive(Debug, Clone, PartialEq)]
pub struct BandAssignment {
    /// One band per cell, in cell order.
    pub bands: Vec<Band>,
    /// Thresholds used.
    pub thresholds: Thresholds,
}

/// Linearly interpolated quantile of an ascending, NaN-free slice.
///
/// Returns NaN for an empty slice.
#[must_use]
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted {
        [] => f64::NAN,
        [only] => *only,
        _ => {
            #[allow(clippy::cast_precision_loss)]
            let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
            let lower = h.floor();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let i = lower as usize;
            if i + 1 >= sorted.len() {
                return sorted[sorted.len() - 1];
            }
            sorted[i] + (h - lower) * (sorted[i + 1] - sorted[i])
        }
    }
}

/// Quantile of the finite values in `values`.
#[must_use]
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, q)
}

/// Computes both thresholds from the score distribution.
#[must_use]
pub fn compute_thresholds(scores: &[f64], q_low: f64, q_high: f64) -> Thresholds {
    let mut sorted: Vec<f64> = scores.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);

    Thresholds {
        q_low,
        q_high,
        t_low: quantile_sorted(&sorted, q_low),
        t_high: quantile_sorted(&sorted, q_high),
    }
}

/// Band for one score.
#[must_use]
pub fn assign_band(score: f64, thresholds: &Thresholds) -> Band {
    if score >= thresholds.t_high {
        Band::VeryUrban
    } else if score <= thresholds.t_low {
        Band::Suburban
    } else {
        Band::Urban
    }
}

/// Computes thresholds and labels every score.
#[must_use]
pub fn assign_bands(slug: &str, scores: &[f64], q_low: f64, q_high: f64) -> BandAssignment {
    let thresholds = compute_thresholds(scores, q_low, q_high);

    log::info!(
        "[{slug}] Band thresholds: T_low={:.4} (q{:.0}) T_high={:.4} (q{:.0})",
        thresholds.t_low,
        q_low * 100.0,
        thresholds.t_high,
        q_high * 100.0
    );

    let bands: Vec<Band> = scores
        .iter()
        .map(|&score| assign_band(score, &thresholds))
        .collect();

    let counts = BandCounts::tally(&bands);
    log::info!(
        "[{slug}] Band distribution: band_1={} band_2={} band_3={}",
        counts.suburban,
        counts.urban,
        counts.very_urban
    );

    BandAssignment { bands, thresholds }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_quantile_interpolates_between_ranks() {
        let sorted = [-0.75, -0.25, 0.25, 0.75];
        assert!((quantile_sorted(&sorted, 0.30) - -0.30).abs() < 1e-12);
        assert!((quantile_sorted(&sorted, 0.70) - 0.30).abs() < 1e-12);
        assert!((quantile_sorted(&sorted, 0.0) - -0.75).abs() < 1e-12);
        assert!((quantile_sorted(&sorted, 1.0) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn quantile_of_degenerate_inputs() {
        assert!(quantile_sorted(&[], 0.5).is_nan());
        assert!((quantile_sorted(&[4.0], 0.3) - 4.0).abs() < f64::EPSILON);
        assert!((quantile(&[f64::NAN, 2.0, 1.0], 0.5) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn thresholds_are_inclusive() {
        let t = Thresholds {
            q_low: 0.3,
            q_high: 0.7,
            t_low: -1.0,
            t_high: 1.0,
        };
        assert_eq!(assign_band(1.0, &t), Band::VeryUrban);
        assert_eq!(assign_band(-1.0, &t), Band::Suburban);
        assert_eq!(assign_band(0.0, &t), Band::Urban);
        assert_eq!(assign_band(5.0, &t), Band::VeryUrban);
        assert_eq!(assign_band(-5.0, &t), Band::Suburban);
    }

    #[test]
    fn four_cell_example_bands() {
        let scores = [-0.75, -0.25, 0.25, 0.75];
        let assignment = assign_bands("test", &scores, 0.30, 0.70);
        let values: Vec<u8> = assignment.bands.iter().map(|b| b.value()).collect();
        assert_eq!(values, vec![1, 2, 2, 3]);
    }

    #[test]
    fn tied_scores_collapse_to_band_three() {
        // All thresholds equal the common score; `>=` is checked first.
        let assignment = assign_bands("test", &[2.0; 5], 0.30, 0.70);
        assert!(assignment.bands.iter().all(|&b| b == Band::VeryUrban));
    }

    #[test]
    fn unsorted_input_gives_same_thresholds() {
        let a = compute_thresholds(&[3.0, 1.0, 2.0, 5.0, 4.0], 0.3, 0.7);
        let b = compute_thresholds(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.3, 0.7);
        assert_eq!(a, b);
        assert!((a.t_low - 2.2).abs() < 1e-12);
        assert!((a.t_high - 3.8).abs() < 1e-12);
    }
}
