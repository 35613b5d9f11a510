#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Road network and traffic-control features from OpenStreetMap.
//!
//! Reads a local OSM PBF extract, keeps the drivable network, derives
//! intersection nodes and intersection-to-intersection road edges, and
//! collects traffic signals and stop signs. Results are cached per city
//! as JSON in geographic coordinates and projected into the city's UTM
//! zone on demand.

pub mod cache;
pub mod graph;
pub mod pbf;
pub mod tags;

use std::collections::BTreeMap;
use std::path::Path;

use geo::{BoundingRect, Coord, Haversine, Intersects, Length, LineString, Point, Rect};
use serde::{Deserialize, Serialize};
use urbanicity_grid::UtmZone;
use urbanicity_models::{FeatureSet, RoadEdge};

pub use graph::{INTERSECTION_MIN_DEGREE, RoadGraph};
pub use pbf::{RawExtract, read_extract};

/// Errors from feature extraction and caching.
#[derive(Debug, thiserror::Error)]
pub enum OsmError {
    /// PBF file not found.
    #[error("OSM PBF file not found: {0}")]
    FileNotFound(String),

    /// PBF parsing error.
    #[error("OSM PBF parse error in {path}: {message}")]
    Parse {
        /// Path to the PBF file.
        path: String,
        /// Error description.
        message: String,
    },

    /// I/O error reading or writing the cache.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Cache file could not be encoded or decoded.
    #[error("Feature cache error at {path}: {source}")]
    Cache {
        /// Path to the cache file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// A road edge in geographic coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographicEdge {
    /// Polyline vertices as `[lon, lat]`.
    pub coords: Vec<[f64; 2]>,
    /// Great-circle length in metres.
    pub length_m: f64,
}

/// A city's features in geographic (`[lon, lat]`) coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeographicFeatures {
    /// Intersection nodes.
    pub intersections: Vec<[f64; 2]>,
    /// Drivable road edges.
    pub edges: Vec<GeographicEdge>,
    /// Traffic signals and stop controls.
    pub signals: Vec<[f64; 2]>,
}

fn coord(c: [f64; 2]) -> Coord<f64> {
    Coord { x: c[0], y: c[1] }
}

impl GeographicFeatures {
    /// Every road edge vertex, as points. Used for the convex-hull boundary
    /// fallback.
    #[must_use]
    pub fn road_nodes(&self) -> Vec<Point<f64>> {
        self.edges
            .iter()
            .flat_map(|e| e.coords.iter().map(|&c| Point::from(coord(c))))
            .collect()
    }

    /// Keeps only features touching `bbox`. Edges are kept whole if any
    /// part of the polyline crosses the box, even with every vertex
    /// outside it.
    #[must_use]
    pub fn within(&self, bbox: Rect<f64>) -> Self {
        let inside = |c: &[f64; 2]| {
            (bbox.min().x..=bbox.max().x).contains(&c[0])
                && (bbox.min().y..=bbox.max().y).contains(&c[1])
        };
        Self {
            intersections: self.intersections.iter().copied().filter(inside).collect(),
            edges: self
                .edges
                .iter()
                .filter(|e| {
                    let line: LineString<f64> = e.coords.iter().map(|&c| coord(c)).collect();
                    line.intersects(&bbox)
                })
                .cloned()
                .collect(),
            signals: self.signals.iter().copied().filter(inside).collect(),
        }
    }

    /// Projects every collection into `zone`. Edge lengths stay the
    /// great-circle lengths computed at extraction.
    #[must_use]
    pub fn project(&self, zone: UtmZone) -> FeatureSet {
        let point = |c: &[f64; 2]| Point::from(zone.forward(coord(*c)));
        FeatureSet {
            intersections: self.intersections.iter().map(point).collect(),
            edges: self
                .edges
                .iter()
                .map(|e| RoadEdge {
                    geometry: e.coords.iter().map(|&c| zone.forward(coord(c))).collect(),
                    length_m: e.length_m,
                })
                .collect(),
            signals: self.signals.iter().map(point).collect(),
        }
    }

    /// Bounding box of all road vertices.
    #[must_use]
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        let line: LineString<f64> = self
            .edges
            .iter()
            .flat_map(|e| e.coords.iter().map(|&c| coord(c)))
            .collect();
        line.bounding_rect()
    }
}

/// Builds intersections, split road edges, and deduplicated signals from a
/// raw extract.
///
/// Way nodes without coordinates are dropped from their edge; an edge left
/// with fewer than two vertices is discarded.
#[must_use]
pub fn assemble_features(raw: RawExtract) -> GeographicFeatures {
    let graph = RoadGraph::new(raw.ways);
    let intersection_ids = graph.intersections(INTERSECTION_MIN_DEGREE);
    log::debug!(
        "Road graph: {} ways, {} nodes, {} with degree >= {INTERSECTION_MIN_DEGREE}",
        graph.way_count(),
        graph.node_count(),
        intersection_ids.len()
    );

    let intersections: Vec<[f64; 2]> = intersection_ids
        .iter()
        .filter_map(|id| raw.coords.get(id).copied())
        .collect();

    let mut dropped = 0usize;
    let edges: Vec<GeographicEdge> = graph
        .split_edges(&intersection_ids)
        .into_iter()
        .filter_map(|nodes| {
            let coords: Vec<[f64; 2]> = nodes
                .iter()
                .filter_map(|id| raw.coords.get(id).copied())
                .collect();
            if coords.len() < 2 {
                dropped += 1;
                return None;
            }
            let line: LineString<f64> = coords.iter().map(|&c| coord(c)).collect();
            Some(GeographicEdge {
                length_m: Haversine.length(&line),
                coords,
            })
        })
        .collect();
    if dropped > 0 {
        log::debug!("Dropped {dropped} edges with unresolved node coordinates");
    }

    let signals: Vec<[f64; 2]> = raw
        .signals
        .into_iter()
        .collect::<BTreeMap<i64, [f64; 2]>>()
        .into_values()
        .collect();

    GeographicFeatures {
        intersections,
        edges,
        signals,
    }
}

/// Loads a city's features from the cache, or extracts and caches them.
///
/// With `force`, the cache is ignored and overwritten.
///
/// # Errors
///
/// Returns an [`OsmError`] if the extract or the cache cannot be read, or
/// the cache cannot be written.
pub fn load_features(
    slug: &str,
    extract: &Path,
    cache_dir: &Path,
    force: bool,
) -> Result<GeographicFeatures, OsmError> {
    let path = cache::cache_path(cache_dir, slug);

    if !force && let Some(features) = cache::read_cache(&path)? {
        log::info!("[{slug}] Loaded features from cache: {}", path.display());
        log_counts(slug, &features);
        return Ok(features);
    }

    log::info!("[{slug}] Extracting features from {}", extract.display());
    let features = assemble_features(read_extract(extract)?);
    log_counts(slug, &features);

    cache::write_cache(&path, &features)?;
    log::info!("[{slug}] Features cached to {}", path.display());
    Ok(features)
}

fn log_counts(slug: &str, features: &GeographicFeatures) {
    log::info!(
        "[{slug}] {} intersections, {} road edges, {} signals",
        features.intersections.len(),
        features.edges.len(),
        features.signals.len()
    );
    for (name, empty) in [
        ("intersection", features.intersections.is_empty()),
        ("road edge", features.edges.is_empty()),
        ("signal", features.signals.is_empty()),
    ] {
        if empty {
            log::warn!("[{slug}] No {name} features found");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use geo::Euclidean;

    use super::*;

    /// A T-junction at node 2 on a ~0.01° grid near Seattle.
    fn t_junction() -> RawExtract {
        let coords: HashMap<i64, [f64; 2]> = [
            (1, [-122.34, 47.60]),
            (2, [-122.33, 47.60]),
            (3, [-122.32, 47.60]),
            (4, [-122.33, 47.61]),
        ]
        .into_iter()
        .collect();
        RawExtract {
            ways: vec![vec![1, 2, 3], vec![2, 4]],
            signals: vec![(2, [-122.33, 47.60]), (2, [-122.33, 47.60]), (9, [-122.3, 47.6])],
            coords,
        }
    }

    #[test]
    fn assembles_intersections_edges_and_signals() {
        let features = assemble_features(t_junction());

        assert_eq!(features.intersections, vec![[-122.33, 47.60]]);
        assert_eq!(features.edges.len(), 3);
        assert_eq!(features.signals.len(), 2, "duplicate signal ids collapse");

        // 0.01° of longitude at 47.6°N is ~750 m.
        let first = &features.edges[0];
        assert_eq!(first.coords, vec![[-122.34, 47.60], [-122.33, 47.60]]);
        assert!((first.length_m - 750.0).abs() < 5.0, "{}", first.length_m);
    }

    #[test]
    fn drops_edges_without_coordinates() {
        let mut raw = t_junction();
        raw.coords.remove(&4);
        let features = assemble_features(raw);
        assert_eq!(features.edges.len(), 2);
    }

    #[test]
    fn projection_keeps_lengths_and_counts() {
        let features = assemble_features(t_junction());
        let zone = UtmZone::for_lon_lat(-122.33, 47.60);
        let projected = features.project(zone);

        assert_eq!(projected.intersections.len(), 1);
        assert_eq!(projected.signals.len(), 2);
        assert_eq!(projected.edges.len(), 3);
        assert!(projected.intersections[0].x() > 500_000.0);

        let planar = Euclidean.length(&projected.edges[0].geometry);
        assert!((planar - projected.edges[0].length_m).abs() < 5.0);
        assert!((projected.edges[0].length_m - features.edges[0].length_m).abs() < f64::EPSILON);
    }

    #[test]
    fn bbox_filter_keeps_touching_edges() {
        let features = assemble_features(t_junction());
        let bbox = Rect::new(
            Coord { x: -122.345, y: 47.595 },
            Coord { x: -122.335, y: 47.605 },
        );
        let clipped = features.within(bbox);
        assert_eq!(clipped.edges.len(), 1);
        assert!(clipped.intersections.is_empty());
        assert!(clipped.signals.is_empty());
    }

    #[test]
    fn bbox_filter_keeps_edges_crossing_without_a_vertex_inside() {
        let features = GeographicFeatures {
            intersections: Vec::new(),
            edges: vec![
                GeographicEdge {
                    coords: vec![[-1.0, 0.5], [2.0, 0.5]],
                    length_m: 333_000.0,
                },
                GeographicEdge {
                    coords: vec![[-0.25, 0.5], [0.5, 1.25]],
                    length_m: 118_000.0,
                },
                GeographicEdge {
                    coords: vec![[-1.0, 2.0], [2.0, 2.0]],
                    length_m: 333_000.0,
                },
            ],
            signals: Vec::new(),
        };
        let bbox = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 });

        let clipped = features.within(bbox);
        assert_eq!(
            clipped.edges,
            features.edges[..2].to_vec(),
            "edges crossing the box or clipping its corner must be kept"
        );
    }

    #[test]
    fn road_nodes_and_bounds() {
        let features = assemble_features(t_junction());
        assert_eq!(features.road_nodes().len(), 6);
        let rect = features.bounding_rect().unwrap();
        assert!((rect.min().x - -122.34).abs() < 1e-12);
        assert!((rect.max().y - 47.61).abs() < 1e-12);
        assert!(GeographicFeatures::default().bounding_rect().is_none());
    }

    #[test]
    fn uses_cache_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let cached = assemble_features(t_junction());
        cache::write_cache(&cache::cache_path(dir.path(), "tiny"), &cached).unwrap();

        // The extract does not exist, so only the cache can satisfy this.
        let missing = Path::new("/nonexistent/tiny.osm.pbf");
        let loaded = load_features("tiny", missing, dir.path(), false).unwrap();
        assert_eq!(loaded.edges.len(), 3);

        let err = load_features("tiny", missing, dir.path(), true).unwrap_err();
        assert!(matches!(err, OsmError::FileNotFound(_)));
    }
}
