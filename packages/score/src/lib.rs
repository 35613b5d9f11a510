#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Composite urbanicity scoring.
//!
//! Turns per-cell densities into robust z-scores, combines them into a
//! weighted composite score, labels every cell with a quantile band, and
//! checks the finished table before it is written.
//!
//! The pipeline for one city is:
//!
//! 1. [`compute_scores`]: signal usability, z-scores, weighted sum.
//! 2. [`band::assign_bands`]: quantile thresholds and labels.
//! 3. [`validate::validate_city_output`]: acceptance checks.

pub mod band;
pub mod robust;
pub mod signal;
pub mod validate;

use urbanicity_models::{ConfigError, DensityRow, ScoreConfig, ScoreRow, SignalDecision, Weights};

pub use band::{BandAssignment, assign_band, assign_bands, compute_thresholds};
pub use robust::robust_zscore;
pub use signal::resolve_signal;
pub use validate::{ValidationError, ValidationFailure, validate_city_output};

/// Per-cell scores plus the signal decision they were computed under.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    /// One row per cell, in cell order.
    pub rows: Vec<ScoreRow>,
    /// Signal usability and effective weights.
    pub signal: SignalDecision,
}

/// Weighted sum of the z-scores. An absent signal z-score contributes
/// nothing.
#[must_use]
pub fn composite_score(
    weights: &Weights,
    z_intersection: f64,
    z_road: f64,
    z_signal: Option<f64>,
) -> f64 {
    let signal_term = z_signal.map_or(0.0, |z| weights.signal * z);
    weights.intersection * z_intersection + weights.road * z_road + signal_term
}

/// Computes z-scores and composite scores for one city.
///
/// The configuration is validated before anything else. When the signal
/// metric is not usable its z-scores are left undefined rather than zero,
/// so downstream readers can tell "dropped" from "average".
///
/// # Errors
///
/// Returns a [`ConfigError`] if `config` is invalid.
pub fn compute_scores(
    slug: &str,
    densities: &[DensityRow],
    config: &ScoreConfig,
) -> Result<ScoreOutcome, ConfigError> {
    config.validate()?;

    let signal = resolve_signal(
        slug,
        densities,
        config.signal_mode,
        config.sparsity_threshold,
        &config.weights,
    );

    let intersection: Vec<f64> = densities.iter().map(|d| d.intersection).collect();
    let road: Vec<f64> = densities.iter().map(|d| d.road).collect();

    let z_intersection = robust_zscore(&intersection);
    let z_road = robust_zscore(&road);
    let z_signal: Option<Vec<f64>> = signal.used.then(|| {
        let values: Vec<f64> = densities.iter().map(|d| d.signal).collect();
        robust_zscore(&values)
    });

    let rows: Vec<ScoreRow> = (0..densities.len())
        .map(|i| {
            let z_sig = z_signal.as_ref().map(|z| z[i]);
            ScoreRow {
                z_intersection: z_intersection[i],
                z_road: z_road[i],
                z_signal: z_sig,
                score: composite_score(&signal.weights, z_intersection[i], z_road[i], z_sig),
            }
        })
        .collect();

    let (min, max) = rows
        .iter()
        .map(|r| r.score)
        .filter(|s| s.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s), hi.max(s))
        });
    if rows.is_empty() {
        log::warn!("[{slug}] No cells to score");
    } else {
        log::info!(
            "[{slug}] Composite score range: [{min:.3}, {max:.3}] over {} cells",
            rows.len()
        );
    }

    Ok(ScoreOutcome { rows, signal })
}
