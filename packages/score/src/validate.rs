//! Acceptance checks for a finished per-city table.
//!
//! Every check runs; all failures are collected into one
//! [`ValidationError`] so a single run reports everything wrong with the
//! output at once.

use std::fmt::Write as _;

use strum_macros::AsRefStr;
use urbanicity_models::{RunMetadata, UrbanicityRecord};

/// Minimum fraction of finite composite scores.
pub const MIN_FINITE_SCORE_FRACTION: f64 = 0.99;

/// Minimum fraction of cells with a positive intersection or road density.
pub const MIN_COVERAGE_FRACTION: f64 = 0.30;

/// Tolerance for the rescaled weight sum when signals are dropped.
const WEIGHT_EPS: f64 = 1e-9;

/// A single failed acceptance check.
#[derive(Debug, Clone, PartialEq, AsRefStr)]
pub enum ValidationFailure {
    /// The table has no rows.
    EmptyCellSet,

    /// A density column has negative values.
    NegativeDensity {
        /// Column name.
        column: &'static str,
        /// Number of negative values.
        count: usize,
    },

    /// Band values outside {1, 2, 3}.
    InvalidBand {
        /// Distinct offending values, ascending.
        values: Vec<u8>,
    },

    /// Too few finite composite scores.
    NonFiniteScores {
        /// Fraction of finite scores.
        finite_fraction: f64,
    },

    /// Signals were dropped but some cells carry a signal z-score.
    DroppedSignalHasZScores {
        /// Number of defined signal z-scores.
        count: usize,
    },

    /// Signals were dropped but the effective signal weight is not zero.
    DroppedSignalHasWeight {
        /// Effective signal weight.
        weight: f64,
    },

    /// Signals were dropped but intersection and road weights do not sum
    /// to one.
    DroppedSignalWeightSum {
        /// Sum of intersection and road weights.
        sum: f64,
    },

    /// Signals were used but some cells have no signal z-score.
    UsedSignalMissingZScores {
        /// Number of undefined signal z-scores.
        count: usize,
    },

    /// Too few cells with a positive intersection density.
    LowIntersectionCoverage {
        /// Fraction of cells with a positive value.
        fraction: f64,
    },

    /// Too few cells with a positive road density.
    LowRoadCoverage {
        /// Fraction of cells with a positive value.
        fraction: f64,
    },
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCellSet => write!(f, "cell set is empty"),
            Self::NegativeDensity { column, count } => {
                write!(f, "{count} negative value(s) in '{column}'")
            }
            Self::InvalidBand { values } => write!(f, "invalid band values found: {values:?}"),
            Self::NonFiniteScores { finite_fraction } => write!(
                f,
                "only {:.1}% of scores are finite (need >= {:.0}%)",
                finite_fraction * 100.0,
                MIN_FINITE_SCORE_FRACTION * 100.0
            ),
            Self::DroppedSignalHasZScores { count } => write!(
                f,
                "signals_used=false but {count} cell(s) have a z_signal_density value"
            ),
            Self::DroppedSignalHasWeight { weight } => write!(
                f,
                "signals_used=false but effective signal weight is {weight:.4} (expected 0)"
            ),
            Self::DroppedSignalWeightSum { sum } => write!(
                f,
                "signals_used=false but intersection + road weights sum to {sum:.6}"
            ),
            Self::UsedSignalMissingZScores { count } => write!(
                f,
                "signals_used=true but {count} cell(s) have no z_signal_density value"
            ),
            Self::LowIntersectionCoverage { fraction } => write!(
                f,
                "only {:.1}% of cells have intersection_density > 0 (need >= {:.0}%)",
                fraction * 100.0,
                MIN_COVERAGE_FRACTION * 100.0
            ),
            Self::LowRoadCoverage { fraction } => write!(
                f,
                "only {:.1}% of cells have road_density > 0 (need >= {:.0}%)",
                fraction * 100.0,
                MIN_COVERAGE_FRACTION * 100.0
            ),
        }
    }
}

/// One or more acceptance checks failed for a city.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{slug}] validation failed ({} issue(s)):{}", .failures.len(), format_failures(.failures))]
pub struct ValidationError {
    /// City slug.
    pub slug: String,
    /// Every failed check.
    pub failures: Vec<ValidationFailure>,
}

fn format_failures(failures: &[ValidationFailure]) -> String {
    let mut out = String::new();
    for failure in failures {
        let _ = write!(out, "\n  {failure}");
    }
    out
}

/// Runs every acceptance check against a completed city table.
///
/// # Errors
///
/// Returns a [`ValidationError`] listing every failed check.
pub fn validate_city_output(
    slug: &str,
    records: &[UrbanicityRecord],
    metadata: &RunMetadata,
) -> Result<(), ValidationError> {
    let mut failures = Vec::new();

    if records.is_empty() {
        failures.push(ValidationFailure::EmptyCellSet);
    }

    let density_columns: [(&'static str, fn(&UrbanicityRecord) -> f64); 3] = [
        ("intersection_density_per_km2", |r| {
            r.intersection_density_per_km2
        }),
        ("road_density_km_per_km2", |r| r.road_density_km_per_km2),
        ("signal_density_per_km2", |r| r.signal_density_per_km2),
    ];
    for (column, get) in density_columns {
        let count = records.iter().filter(|r| get(r) < 0.0).count();
        if count > 0 {
            failures.push(ValidationFailure::NegativeDensity { column, count });
        }
    }

    let mut bad_bands: Vec<u8> = records
        .iter()
        .map(|r| r.urbanicity_band_3_2_1)
        .filter(|b| !(1..=3).contains(b))
        .collect();
    if !bad_bands.is_empty() {
        bad_bands.sort_unstable();
        bad_bands.dedup();
        failures.push(ValidationFailure::InvalidBand { values: bad_bands });
    }

    if !records.is_empty() {
        let finite_fraction = fraction(records, |r| r.urbanicity_score_continuous.is_finite());
        if finite_fraction < MIN_FINITE_SCORE_FRACTION {
            failures.push(ValidationFailure::NonFiniteScores { finite_fraction });
        }
    }

    check_signal_consistency(records, metadata, &mut failures);

    if !records.is_empty() {
        let fraction_int = fraction(records, |r| r.intersection_density_per_km2 > 0.0);
        if fraction_int < MIN_COVERAGE_FRACTION {
            failures.push(ValidationFailure::LowIntersectionCoverage {
                fraction: fraction_int,
            });
        }

        let fraction_road = fraction(records, |r| r.road_density_km_per_km2 > 0.0);
        if fraction_road < MIN_COVERAGE_FRACTION {
            failures.push(ValidationFailure::LowRoadCoverage {
                fraction: fraction_road,
            });
        }
    }

    if failures.is_empty() {
        log::info!(
            "[{slug}] All validation checks passed ({} cells).",
            records.len()
        );
        return Ok(());
    }

    let error = ValidationError {
        slug: slug.to_string(),
        failures,
    };
    log::error!("{error}");
    Err(error)
}

/// Usable flag, effective weights, and z-score markers must agree.
fn check_signal_consistency(
    records: &[UrbanicityRecord],
    metadata: &RunMetadata,
    failures: &mut Vec<ValidationFailure>,
) {
    let defined = records
        .iter()
        .filter(|r| r.z_signal_density.is_some())
        .count();

    if metadata.signals_used {
        let missing = records.len() - defined;
        if missing > 0 {
            failures.push(ValidationFailure::UsedSignalMissingZScores { count: missing });
        }
        return;
    }

    if defined > 0 {
        failures.push(ValidationFailure::DroppedSignalHasZScores { count: defined });
    }
    if metadata.weights.signal != 0.0 {
        failures.push(ValidationFailure::DroppedSignalHasWeight {
            weight: metadata.weights.signal,
        });
    }
    let sum = metadata.weights.intersection + metadata.weights.road;
    if (sum - 1.0).abs() > WEIGHT_EPS {
        failures.push(ValidationFailure::DroppedSignalWeightSum { sum });
    }
}

fn fraction(records: &[UrbanicityRecord], predicate: impl Fn(&UrbanicityRecord) -> bool) -> f64 {
    let hits = records.iter().filter(|r| predicate(r)).count();
    #[allow(clippy::cast_precision_loss)]
    let value = hits as f64 / records.len() as f64;
    value
}
