//! Per-city JSON summary and thresholds sidecar.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use urbanicity_models::{Band, BandCounts, RunMetadata, Thresholds, UrbanicityRecord, Weights};
use urbanicity_score::band::quantile_sorted;

use crate::OutputError;

/// Number of cells listed at each end of the score ranking.
pub const RANKED_CELLS: usize = 10;

/// Descriptive statistics of one column. `std` is the sample standard
/// deviation; percentiles use linear interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Describe {
    /// Number of finite values.
    pub count: usize,
    /// Mean.
    pub mean: f64,
    /// Sample standard deviation (`n - 1`); NaN for fewer than two values.
    pub std: f64,
    /// Minimum.
    pub min: f64,
    /// 25th percentile.
    #[serde(rename = "25%")]
    pub p25: f64,
    /// Median.
    #[serde(rename = "50%")]
    pub p50: f64,
    /// 75th percentile.
    #[serde(rename = "75%")]
    pub p75: f64,
    /// Maximum.
    pub max: f64,
}

impl Describe {
    /// Statistics of the finite values in `values`.
    #[must_use]
    pub fn of(values: impl IntoIterator<Item = f64>) -> Self {
        let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        #[allow(clippy::cast_precision_loss)]
        let n = count as f64;
        let mean = if count == 0 {
            f64::NAN
        } else {
            sorted.iter().sum::<f64>() / n
        };
        let std = if count < 2 {
            f64::NAN
        } else {
            (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        };

        Self {
            count,
            mean,
            std,
            min: sorted.first().copied().unwrap_or(f64::NAN),
            p25: quantile_sorted(&sorted, 0.25),
            p50: quantile_sorted(&sorted, 0.50),
            p75: quantile_sorted(&sorted, 0.75),
            max: sorted.last().copied().unwrap_or(f64::NAN),
        }
    }
}

/// One cell in the top/bottom ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCell {
    /// Cell identifier.
    pub h3_index: String,
    /// Composite score, rounded to four decimals.
    pub urbanicity_score_continuous: f64,
    /// Band ordinal.
    pub urbanicity_band_3_2_1: u8,
}

/// Band counts and percentages keyed by band ordinal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandDistribution {
    /// Cells per band.
    pub counts: BTreeMap<u8, usize>,
    /// Percentage of cells per band, rounded to one decimal.
    pub percent: BTreeMap<u8, f64>,
}

impl BandDistribution {
    /// Builds the distribution from tallied counts.
    #[must_use]
    pub fn new(counts: &BandCounts) -> Self {
        let total = counts.total();
        let mut by_band = BTreeMap::new();
        let mut percent = BTreeMap::new();
        for band in Band::ALL {
            let count = counts.get(band);
            by_band.insert(band.value(), count);
            #[allow(clippy::cast_precision_loss)]
            let pct = if total == 0 {
                0.0
            } else {
                round_to(count as f64 / total as f64 * 100.0, 1)
            };
            percent.insert(band.value(), pct);
        }
        Self {
            counts: by_band,
            percent,
        }
    }
}

/// Scoring decisions recorded in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringSummary {
    /// Whether the signal metric contributed to the score.
    pub signals_used: bool,
    /// Fraction of cells with a positive signal density.
    pub signal_coverage: f64,
    /// Effective weights.
    pub weights: Weights,
    /// Band thresholds.
    pub thresholds: Thresholds,
}

/// The `summary.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// City display name.
    pub city: String,
    /// City slug.
    pub slug: String,
    /// H3 resolution.
    pub h3_res: u8,
    /// Number of cells.
    pub total_hexes: usize,
    /// Band counts and percentages.
    pub band_distribution: BandDistribution,
    /// Descriptive statistics per metric column.
    pub metric_stats: BTreeMap<String, Describe>,
    /// Highest-scoring cells, descending.
    pub top10_by_score: Vec<RankedCell>,
    /// Lowest-scoring cells, ascending.
    pub bottom10_by_score: Vec<RankedCell>,
    /// Scoring decisions for the run.
    pub scoring: ScoringSummary,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn ranked(records: &[&UrbanicityRecord]) -> Vec<RankedCell> {
    records
        .iter()
        .take(RANKED_CELLS)
        .map(|r| RankedCell {
            h3_index: r.h3_index.clone(),
            urbanicity_score_continuous: round_to(r.urbanicity_score_continuous, 4),
            urbanicity_band_3_2_1: r.urbanicity_band_3_2_1,
        })
        .collect()
}

/// Builds the summary for a completed city table.
#[must_use]
pub fn build_summary(
    name: &str,
    slug: &str,
    h3_res: u8,
    records: &[UrbanicityRecord],
    metadata: &RunMetadata,
) -> Summary {
    let columns: [(&str, fn(&UrbanicityRecord) -> f64); 4] = [
        ("intersection_density_per_km2", |r| {
            r.intersection_density_per_km2
        }),
        ("road_density_km_per_km2", |r| r.road_density_km_per_km2),
        ("signal_density_per_km2", |r| r.signal_density_per_km2),
        ("urbanicity_score_continuous", |r| {
            r.urbanicity_score_continuous
        }),
    ];
    let metric_stats = columns
        .iter()
        .map(|(name, get)| ((*name).to_string(), Describe::of(records.iter().map(get))))
        .collect();

    let mut by_score: Vec<&UrbanicityRecord> = records
        .iter()
        .filter(|r| r.urbanicity_score_continuous.is_finite())
        .collect();
    by_score.sort_by(|a, b| {
        a.urbanicity_score_continuous
            .total_cmp(&b.urbanicity_score_continuous)
            .then_with(|| a.h3_index.cmp(&b.h3_index))
    });
    let bottom = ranked(&by_score);
    by_score.reverse();
    let top = ranked(&by_score);

    Summary {
        city: name.to_string(),
        slug: slug.to_string(),
        h3_res,
        total_hexes: records.len(),
        band_distribution: BandDistribution::new(&metadata.band_counts),
        metric_stats,
        top10_by_score: top,
        bottom10_by_score: bottom,
        scoring: ScoringSummary {
            signals_used: metadata.signals_used,
            signal_coverage: metadata.signal_coverage,
            weights: metadata.weights,
            thresholds: metadata.thresholds,
        },
    }
}

/// The `thresholds.json` sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsFile {
    /// Lower quantile.
    pub q_low: f64,
    /// Upper quantile.
    pub q_high: f64,
    /// Lower threshold.
    pub t_low: f64,
    /// Upper threshold.
    pub t_high: f64,
    /// Cells per band ordinal.
    pub band_counts: BTreeMap<u8, usize>,
}

impl From<&RunMetadata> for ThresholdsFile {
    fn from(metadata: &RunMetadata) -> Self {
        Self {
            q_low: metadata.thresholds.q_low,
            q_high: metadata.thresholds.q_high,
            t_low: metadata.thresholds.t_low,
            t_high: metadata.thresholds.t_high,
            band_counts: BandDistribution::new(&metadata.band_counts).counts,
        }
    }
}

/// Serializes `value` as pretty JSON, writing through a temporary file so
/// readers never see a partial document.
///
/// # Errors
///
/// Returns [`OutputError::Json`] or [`OutputError::Io`].
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let contents = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents).map_err(|source| OutputError::Io {
        path: tmp.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| OutputError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{metadata, record};

    #[test]
    fn describe_matches_sample_statistics() {
        let d = Describe::of([1.0, 2.0, 3.0, 4.0, f64::NAN]);
        assert_eq!(d.count, 4);
        assert!((d.mean - 2.5).abs() < 1e-12);
        // Sample variance of 1..4 is 5/3.
        assert!((d.std - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((d.p25 - 1.75).abs() < 1e-12);
        assert!((d.p50 - 2.5).abs() < 1e-12);
        assert!((d.p75 - 3.25).abs() < 1e-12);
        assert!((d.min - 1.0).abs() < f64::EPSILON);
        assert!((d.max - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn describe_of_nothing_is_nan() {
        let d = Describe::of(std::iter::empty());
        assert_eq!(d.count, 0);
        assert!(d.mean.is_nan() && d.std.is_nan() && d.min.is_nan());
    }

    #[test]
    fn band_percentages_round_to_one_decimal() {
        let dist = BandDistribution::new(&BandCounts {
            suburban: 1,
            urban: 1,
            very_urban: 1,
        });
        assert_eq!(dist.counts[&2], 1);
        assert!((dist.percent[&1] - 33.3).abs() < 1e-9);
    }

    #[test]
    fn ranks_top_and_bottom_cells() {
        let records: Vec<UrbanicityRecord> = (0..15_i32)
            .map(|i| record(&format!("cell{i:02}"), f64::from(i) / 10.0, None, 2))
            .collect();
        let summary = build_summary("Test", "test", 8, &records, &metadata());

        assert_eq!(summary.total_hexes, 15);
        assert_eq!(summary.top10_by_score.len(), RANKED_CELLS);
        assert_eq!(summary.top10_by_score[0].h3_index, "cell14");
        assert_eq!(summary.bottom10_by_score[0].h3_index, "cell00");
        assert_eq!(summary.metric_stats.len(), 4);
        assert!(!summary.scoring.signals_used);
    }

    #[test]
    fn summary_json_has_expected_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = build_summary("Test", "test", 8, &[record("a", 0.1, None, 2)], &metadata());
        write_json(&path, &summary).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["slug"], "test");
        assert!(value["metric_stats"]["road_density_km_per_km2"]["25%"].is_number());
        assert_eq!(value["band_distribution"]["counts"]["2"], 1);
        assert!(!dir.path().join("summary.json.tmp").exists());
    }

    #[test]
    fn thresholds_file_mirrors_metadata() {
        let file = ThresholdsFile::from(&metadata());
        assert!((file.t_low - -0.3).abs() < f64::EPSILON);
        assert_eq!(file.band_counts[&2], 1);
    }
}
