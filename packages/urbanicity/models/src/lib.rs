#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the urbanicity pipeline.
//!
//! A city run flows through these types in order: [`Cell`]s and a
//! [`FeatureSet`] go into the density aggregator, which yields one
//! [`DensityRow`] per cell; the score engine turns those into
//! [`ScoreRow`]s plus a [`SignalDecision`]; the band assigner yields a
//! [`Band`] per cell plus [`Thresholds`]. [`RunMetadata`] collects the
//! city-level decisions and is passed explicitly alongside the
//! per-cell [`UrbanicityRecord`] table to the validator and writers.

pub mod config;
pub mod progress;

use geo::{LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

pub use config::{CityConfig, ConfigError, GridConfig, ScoreConfig, SignalMode, Weights};

/// Output column names, in the order every tabular export must use.
pub const OUTPUT_COLUMNS: [&str; 16] = [
    "city",
    "h3_res",
    "h3_index",
    "hex_centroid_lat",
    "hex_centroid_lon",
    "hex_area_km2",
    "intersection_density_per_km2",
    "road_density_km_per_km2",
    "signal_density_per_km2",
    "z_intersection_density",
    "z_road_density",
    "z_signal_density",
    "urbanicity_score_continuous",
    "urbanicity_band_3_2_1",
    "t_low_q30",
    "t_high_q70",
];

/// One tessellated region of a city.
///
/// The cell set is fixed once the grid is built; later steps produce
/// parallel per-cell columns indexed by the cell's position.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Stable identifier (H3 index string), unique within a city.
    pub id: String,
    /// Area in km², always positive.
    pub area_km2: f64,
    /// Centroid latitude (degrees).
    pub centroid_lat: f64,
    /// Centroid longitude (degrees).
    pub centroid_lon: f64,
    /// Polygon in the city's metric projection (metres).
    pub geometry: Polygon<f64>,
    /// Polygon in geographic coordinates (lon/lat degrees), for export.
    pub geometry_wgs84: Polygon<f64>,
}

/// A road edge with its precomputed length.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadEdge {
    /// Edge polyline.
    pub geometry: LineString<f64>,
    /// Length of the full edge in metres.
    pub length_m: f64,
}

/// The three feature collections for a city, all in one coordinate system.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    /// Road network intersection nodes.
    pub intersections: Vec<Point<f64>>,
    /// Drivable road edges.
    pub edges: Vec<RoadEdge>,
    /// Traffic signal and stop control points.
    pub signals: Vec<Point<f64>>,
}

/// Per-cell densities produced by the density aggregator. Never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DensityRow {
    /// Intersections per km².
    pub intersection: f64,
    /// Road km per km².
    pub road: f64,
    /// Signals per km².
    pub signal: f64,
}

/// Per-cell robust z-scores and composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    /// Intersection density z-score, clamped to [-10, 10].
    pub z_intersection: f64,
    /// Road density z-score, clamped to [-10, 10].
    pub z_road: f64,
    /// Signal density z-score; `None` when the signal metric was dropped.
    pub z_signal: Option<f64>,
    /// Weighted composite score.
    pub score: f64,
}

/// Three-level urbanicity band.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Band {
    /// Score at or below the low threshold.
    Suburban = 1,
    /// Score strictly between the thresholds.
    Urban = 2,
    /// Score at or above the high threshold.
    VeryUrban = 3,
}

impl Band {
    /// All bands in ascending order.
    pub const ALL: [Self; 3] = [Self::Suburban, Self::Urban, Self::VeryUrban];

    /// Returns the ordinal value (1, 2, or 3).
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }
}

/// Outcome of the signal usability decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalDecision {
    /// Whether signal density contributes to the composite score.
    pub used: bool,
    /// Fraction of cells with a positive signal density.
    pub coverage: f64,
    /// Effective weights actually applied; `signal == 0.0` when unused.
    pub weights: Weights,
}

/// Band thresholds computed from the composite score distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Lower quantile used.
    pub q_low: f64,
    /// Upper quantile used.
    pub q_high: f64,
    /// Score at the lower quantile.
    pub t_low: f64,
    /// Score at the upper quantile.
    pub t_high: f64,
}

/// Number of cells per band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandCounts {
    /// Band 1 cells.
    pub suburban: usize,
    /// Band 2 cells.
    pub urban: usize,
    /// Band 3 cells.
    pub very_urban: usize,
}

impl BandCounts {
    /// Tallies a slice of bands.
    #[must_use]
    pub fn tally(bands: &[Band]) -> Self {
        let mut counts = Self::default();
        for band in bands {
            match band {
                Band::Suburban => counts.suburban += 1,
                Band::Urban => counts.urban += 1,
                Band::VeryUrban => counts.very_urban += 1,
            }
        }
        counts
    }

    /// Count for a single band.
    #[must_use]
    pub const fn get(&self, band: Band) -> usize {
        match band {
            Band::Suburban => self.suburban,
            Band::Urban => self.urban,
            Band::VeryUrban => self.very_urban,
        }
    }

    /// Total number of cells counted.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.suburban + self.urban + self.very_urban
    }
}

/// City-level record of the scoring decisions for one run.
///
/// Built once after banding and never modified. Readers use it to tell a
/// structurally dropped signal metric (`signals_used == false`,
/// `weights.signal == 0.0`) from a used one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Whether the signal metric was judged usable.
    pub signals_used: bool,
    /// Fraction of cells with a positive signal density.
    pub signal_coverage: f64,
    /// Effective weights applied to the composite score.
    pub weights: Weights,
    /// Band thresholds.
    pub thresholds: Thresholds,
    /// Cells per band.
    pub band_counts: BandCounts,
}

impl RunMetadata {
    /// Assembles the metadata from the score and band outcomes.
    #[must_use]
    pub fn new(signal: &SignalDecision, thresholds: Thresholds, bands: &[Band]) -> Self {
        Self {
            signals_used: signal.used,
            signal_coverage: signal.coverage,
            weights: signal.weights,
            thresholds,
            band_counts: BandCounts::tally(bands),
        }
    }
}

/// One row of the finished per-city table.
///
/// Field order and names match [`OUTPUT_COLUMNS`] exactly; serializers rely
/// on declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrbanicityRecord {
    /// City display name.
    pub city: String,
    /// H3 resolution.
    pub h3_res: u8,
    /// Cell identifier.
    pub h3_index: String,
    /// Centroid latitude.
    pub hex_centroid_lat: f64,
    /// Centroid longitude.
    pub hex_centroid_lon: f64,
    /// Cell area in km².
    pub hex_area_km2: f64,
    /// Intersections per km².
    pub intersection_density_per_km2: f64,
    /// Road km per km².
    pub road_density_km_per_km2: f64,
    /// Signals per km².
    pub signal_density_per_km2: f64,
    /// Intersection density z-score.
    pub z_intersection_density: f64,
    /// Road density z-score.
    pub z_road_density: f64,
    /// Signal density z-score (`None` when signals were dropped).
    pub z_signal_density: Option<f64>,
    /// Composite score.
    pub urbanicity_score_continuous: f64,
    /// Band ordinal (1, 2, or 3).
    pub urbanicity_band_3_2_1: u8,
    /// Lower band threshold.
    pub t_low_q30: f64,
    /// Upper band threshold.
    pub t_high_q70: f64,
}

impl UrbanicityRecord {
    /// Builds one output row from the parallel per-cell columns.
    #[must_use]
    pub fn new(
        city: &str,
        h3_res: u8,
        cell: &Cell,
        density: &DensityRow,
        score: &ScoreRow,
        band: Band,
        thresholds: &Thresholds,
    ) -> Self {
        Self {
            city: city.to_string(),
            h3_res,
            h3_index: cell.id.clone(),
            hex_centroid_lat: cell.centroid_lat,
            hex_centroid_lon: cell.centroid_lon,
            hex_area_km2: cell.area_km2,
            intersection_density_per_km2: density.intersection,
            road_density_km_per_km2: density.road,
            signal_density_per_km2: density.signal,
            z_intersection_density: score.z_intersection,
            z_road_density: score.z_road,
            z_signal_density: score.z_signal,
            urbanicity_score_continuous: score.score,
            urbanicity_band_3_2_1: band.value(),
            t_low_q30: thresholds.t_low,
            t_high_q70: thresholds.t_high,
        }
    }
}
