//! Per-cell density computation.
//!
//! Point densities count features per cell; road density apportions each
//! edge's length across the cells it crosses by clipping the edge to each
//! cell polygon. All inputs must share the cells' metric projection.

use std::collections::BTreeMap;
use std::sync::Arc;

use geo::{
    BooleanOps, Contains, Coord, Euclidean, Length, LineString, MultiLineString, Point, Polygon,
};
use urbanicity_models::progress::ProgressCallback;
use urbanicity_models::{Cell, DensityRow, FeatureSet, RoadEdge};

use crate::{CellIndex, EdgeIndex, GeometryError};

/// Number of cells clipped per road-density batch.
pub const DEFAULT_BATCH_SIZE: usize = 5_000;

/// Count point features per cell and divide by cell area (per km²).
///
/// Every cell gets a value; cells without a feature get `0.0`. Points
/// outside every cell are ignored.
#[must_use]
pub fn compute_point_density(
    slug: &str,
    label: &str,
    cells: &[Cell],
    points: &[Point<f64>],
) -> Vec<f64> {
    if points.is_empty() {
        log::warn!("[{slug}] No {label} features; {label} density set to 0.");
        return vec![0.0; cells.len()];
    }

    let index = CellIndex::new(cells);
    let mut counts = vec![0_u64; cells.len()];
    let mut unassigned = 0_usize;

    for point in points {
        match index.locate(point) {
            Some(position) => counts[position] += 1,
            None => unassigned += 1,
        }
    }

    if unassigned > 0 {
        log::debug!("[{slug}] {unassigned} {label} features fell outside every cell");
    }

    #[allow(clippy::cast_precision_loss)]
    let density: Vec<f64> = counts
        .iter()
        .zip(cells)
        .map(|(&count, cell)| count as f64 / cell.area_km2)
        .collect();

    log_range(slug, label, &density);
    density
}

/// Road length in km accumulated per cell position.
///
/// Partial results from disjoint or overlapping batches combine with
/// [`RoadLengths::merge`]; merging is associative and commutative, so the
/// final sums do not depend on how the work was partitioned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoadLengths {
    km: BTreeMap<usize, f64>,
    skipped: usize,
}

impl RoadLengths {
    /// Adds `km` to the cell at `position`.
    pub fn add(&mut self, position: usize, km: f64) {
        *self.km.entry(position).or_insert(0.0) += km;
    }

    /// Records an edge/cell pair that could not be clipped.
    pub const fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// Combines two partial results.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        for (position, km) in other.km {
            self.add(position, km);
        }
        self.skipped += other.skipped;
        self
    }

    /// Accumulated km for a cell position.
    #[must_use]
    pub fn get(&self, position: usize) -> f64 {
        self.km.get(&position).copied().unwrap_or(0.0)
    }

    /// Number of skipped edge/cell pairs.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Apportion road edge lengths to cells and divide by cell area
/// (km per km²).
///
/// Each edge contributes to a cell exactly the length of its clipped
/// intersection with that cell polygon. Cells are processed in batches of
/// `batch_size`; each batch yields a [`RoadLengths`] partial that is folded
/// into the total.
#[must_use]
pub fn compute_line_density(
    slug: &str,
    cells: &[Cell],
    edges: &[RoadEdge],
    batch_size: usize,
    progress: &Arc<dyn ProgressCallback>,
) -> Vec<f64> {
    if edges.is_empty() {
        log::warn!("[{slug}] No road edges; road density set to 0.");
        return vec![0.0; cells.len()];
    }

    let (valid, malformed): (Vec<&RoadEdge>, Vec<&RoadEdge>) =
        edges.iter().partition(|e| check_line(&e.geometry).is_ok());
    if !malformed.is_empty() {
        log::warn!(
            "[{slug}] Skipping {} malformed road edges",
            malformed.len()
        );
    }

    let index = EdgeIndex::new(valid.iter().map(|e| &e.geometry));
    let batch_size = batch_size.max(1);
    let n_batches = cells.len().div_ceil(batch_size);

    progress.set_total(n_batches as u64);
    progress.set_message(format!("[{slug}] Apportioning road length"));

    let lengths = cells
        .chunks(batch_size)
        .enumerate()
        .map(|(batch_i, batch)| {
            let partial = apportion_batch(&index, batch, batch_i * batch_size);
            progress.inc(1);
            if (batch_i + 1) % 10 == 0 || batch_i + 1 == n_batches {
                log::info!(
                    "[{slug}] Road density: processed batch {}/{n_batches}",
                    batch_i + 1
                );
            }
            partial
        })
        .fold(RoadLengths::default(), RoadLengths::merge);

    progress.finish_and_clear();

    if lengths.skipped() > 0 {
        log::warn!(
            "[{slug}] Skipped {} edge/cell pairs with invalid geometry",
            lengths.skipped()
        );
    }

    let density: Vec<f64> = cells
        .iter()
        .enumerate()
        .map(|(position, cell)| lengths.get(position) / cell.area_km2)
        .collect();

    log_range(slug, "road", &density);
    density
}

/// Clips every candidate edge to every cell in `batch`. `offset` is the
/// position of the batch's first cell in the full cell slice.
fn apportion_batch(index: &EdgeIndex<'_>, batch: &[Cell], offset: usize) -> RoadLengths {
    let mut lengths = RoadLengths::default();

    for (i, cell) in batch.iter().enumerate() {
        for line in index.candidates(&cell.geometry) {
            match clipped_length_m(&cell.geometry, line) {
                Ok(length_m) if length_m > 0.0 => lengths.add(offset + i, length_m / 1_000.0),
                Ok(_) => {}
                Err(e) => {
                    log::debug!("Skipping edge in cell {}: {e}", cell.id);
                    lengths.record_skip();
                }
            }
        }
    }

    lengths
}

/// Length in metres of the part of `line` inside `polygon`.
///
/// Clipped pieces that collapse to a point (tangential touches) add
/// nothing.
///
/// # Errors
///
/// Returns [`GeometryError`] if either geometry is malformed.
pub fn clipped_length_m(
    polygon: &Polygon<f64>,
    line: &LineString<f64>,
) -> Result<f64, GeometryError> {
    check_line(line)?;
    check_polygon(polygon)?;

    if polygon.contains(line) {
        return Ok(Euclidean.length(line));
    }

    let clipped = polygon.clip(&MultiLineString::new(vec![line.clone()]), false);

    Ok(clipped
        .iter()
        .map(|part| Euclidean.length(part))
        .filter(|&len| len > 0.0)
        .sum())
}

fn check_line(line: &LineString<f64>) -> Result<(), GeometryError> {
    if line.0.len() < 2 {
        return Err(GeometryError::TooFewVertices(line.0.len()));
    }
    check_coords(&line.0)
}

fn check_polygon(polygon: &Polygon<f64>) -> Result<(), GeometryError> {
    let ring = polygon.exterior();
    if ring.0.len() < 4 || !ring.is_closed() {
        return Err(GeometryError::DegeneratePolygon);
    }
    check_coords(&ring.0)
}

fn check_coords(coords: &[Coord<f64>]) -> Result<(), GeometryError> {
    if coords.iter().all(|c| c.x.is_finite() && c.y.is_finite()) {
        Ok(())
    } else {
        Err(GeometryError::NonFinite)
    }
}

/// Computes all three density columns for a city.
#[must_use]
pub fn compute_densities(
    slug: &str,
    cells: &[Cell],
    features: &FeatureSet,
    batch_size: usize,
    progress: &Arc<dyn ProgressCallback>,
) -> Vec<DensityRow> {
    log::info!("[{slug}] Computing intersection density...");
    let intersection = compute_point_density(slug, "intersection", cells, &features.intersections);

    log::info!("[{slug}] Computing road network density (apportioned)...");
    let road = compute_line_density(slug, cells, &features.edges, batch_size, progress);

    log::info!("[{slug}] Computing signal density...");
    let signal = compute_point_density(slug, "signal", cells, &features.signals);

    intersection
        .into_iter()
        .zip(road)
        .zip(signal)
        .map(|((intersection, road), signal)| DensityRow {
            intersection,
            road,
            signal,
        })
        .collect()
}

fn log_range(slug: &str, label: &str, values: &[f64]) {
    if values.is_empty() {
        return;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    #[allow(clippy::cast_precision_loss)]
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    log::info!("[{slug}] {label} density: min={min:.4}, mean={mean:.4}, max={max:.4}");
}

#[cfg(test)]
mod tests {
    use geo::{Point, line_string};
    use urbanicity_models::progress::null_progress;

    use super::*;
    use crate::test_support::{cell_row, square_cell};

    fn edge(line: LineString<f64>) -> RoadEdge {
        let length_m = Euclidean.length(&line);
        RoadEdge {
            geometry: line,
            length_m,
        }
    }

    #[test]
    fn empty_points_give_zero_for_every_cell() {
        let cells = cell_row(4);
        let density = compute_point_density("test", "signal", &cells, &[]);
        assert_eq!(density, vec![0.0; 4]);
    }

    #[test]
    fn counts_points_per_km2() {
        let cells = vec![
            square_cell("a", 0.0, 0.0, 1000.0),
            square_cell("b", 1000.0, 0.0, 2000.0),
        ];
        let points = vec![
            Point::new(100.0, 100.0),
            Point::new(200.0, 900.0),
            Point::new(1500.0, 1500.0),
            Point::new(9000.0, 9000.0),
        ];
        let density = compute_point_density("test", "intersection", &cells, &points);
        assert!((density[0] - 2.0).abs() < 1e-12);
        // 1 point over 4 km².
        assert!((density[1] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn shared_boundary_point_is_counted_once() {
        let cells = cell_row(2);
        let density =
            compute_point_density("test", "intersection", &cells, &[Point::new(1000.0, 500.0)]);
        assert!((density.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_edges_give_zero_for_every_cell() {
        let cells = cell_row(3);
        let density = compute_line_density("test", &cells, &[], 2, &null_progress());
        assert_eq!(density, vec![0.0; 3]);
    }

    #[test]
    fn contained_edge_contributes_full_length() {
        let cells = cell_row(2);
        let edges = vec![edge(line_string![(x: 100.0, y: 500.0), (x: 600.0, y: 500.0)])];
        let density = compute_line_density("test", &cells, &edges, 10, &null_progress());
        assert!((density[0] - 0.5).abs() < 1e-9, "{density:?}");
        assert!(density[1].abs() < 1e-12);
    }

    #[test]
    fn crossing_edge_is_apportioned_and_conserved() {
        let cells = cell_row(3);
        // 2.5 km total: 0.75 in c0, 1.0 in c1, 0.75 in c2.
        let road = edge(line_string![(x: 250.0, y: 400.0), (x: 2750.0, y: 400.0)]);
        let total_km = road.length_m / 1_000.0;

        let density = compute_line_density("test", &cells, &[road], 10, &null_progress());

        assert!((density[0] - 0.75).abs() < 1e-6, "{density:?}");
        assert!((density[1] - 1.0).abs() < 1e-6, "{density:?}");
        assert!((density[2] - 0.75).abs() < 1e-6, "{density:?}");

        // Cells are 1 km², so density sums equal km sums.
        let apportioned: f64 = density.iter().sum();
        assert!((apportioned - total_km).abs() < 1e-6);
    }

    #[test]
    fn diagonal_polyline_is_conserved() {
        let cells: Vec<Cell> = (0..3)
            .flat_map(|row| {
                (0..3).map(move |col| {
                    square_cell(
                        &format!("r{row}c{col}"),
                        f64::from(col) * 1000.0,
                        f64::from(row) * 1000.0,
                        1000.0,
                    )
                })
            })
            .collect();
        let road = edge(line_string![
            (x: 100.0, y: 150.0),
            (x: 1700.0, y: 900.0),
            (x: 2200.0, y: 2800.0),
            (x: 400.0, y: 2600.0),
        ]);
        let total_km = road.length_m / 1_000.0;

        let density = compute_line_density("test", &cells, &[road], 4, &null_progress());
        let apportioned: f64 = density.iter().sum();
        assert!(
            (apportioned - total_km).abs() < 1e-6,
            "apportioned {apportioned} km vs original {total_km} km"
        );
        assert!(density.iter().all(|&d| d >= 0.0));
    }

    #[test]
    fn tangential_touch_adds_no_length() {
        let cells = cell_row(2);
        // Touches c1 only at its corner (1000, 1000) from outside c1.
        let road = edge(line_string![
            (x: 500.0, y: 1500.0),
            (x: 1000.0, y: 1000.0),
            (x: 500.0, y: 1200.0),
        ]);
        let density = compute_line_density("test", &cells, &[road], 10, &null_progress());
        assert!(density[1].abs() < 1e-9, "{density:?}");
    }

    #[test]
    fn edge_on_shared_cell_boundary_counts_in_both_cells() {
        let cells = cell_row(2);
        // Runs along x = 1000, the edge shared by c0 and c1.
        let road = edge(line_string![(x: 1000.0, y: 100.0), (x: 1000.0, y: 900.0)]);
        let density = compute_line_density("test", &cells, &[road], 10, &null_progress());
        assert!((density[0] - 0.8).abs() < 1e-6, "{density:?}");
        assert!((density[1] - 0.8).abs() < 1e-6, "{density:?}");
    }

    #[test]
    fn batch_size_does_not_change_result() {
        let cells = cell_row(7);
        let edges = vec![
            edge(line_string![(x: 10.0, y: 10.0), (x: 6900.0, y: 990.0)]),
            edge(line_string![
                (x: 3500.0, y: 100.0),
                (x: 3500.0, y: 900.0),
                (x: 4200.0, y: 900.0),
            ]),
            edge(line_string![(x: 6100.0, y: 50.0), (x: 6900.0, y: 50.0)]),
        ];
        let one = compute_line_density("test", &cells, &edges, 1, &null_progress());
        let all = compute_line_density("test", &cells, &edges, cells.len(), &null_progress());
        let three = compute_line_density("test", &cells, &edges, 3, &null_progress());

        for ((a, b), c) in one.iter().zip(&all).zip(&three) {
            assert!((a - b).abs() < 1e-12);
            assert!((a - c).abs() < 1e-12);
        }
    }

    #[test]
    fn invalid_edge_is_skipped_without_aborting() {
        let cells = cell_row(2);
        let edges = vec![
            RoadEdge {
                geometry: line_string![(x: 100.0, y: 100.0), (x: f64::NAN, y: 100.0)],
                length_m: 1.0,
            },
            edge(line_string![(x: 1100.0, y: 500.0), (x: 1300.0, y: 500.0)]),
        ];
        let density = compute_line_density("test", &cells, &edges, 1, &null_progress());
        assert!((density[1] - 0.2).abs() < 1e-9, "{density:?}");
        assert!(density.iter().all(|d| d.is_finite()));
    }

    #[test]
    fn clipped_length_rejects_malformed_input() {
        let cell = square_cell("a", 0.0, 0.0, 1000.0);
        let single = LineString::from(vec![(1.0, 1.0)]);
        assert_eq!(
            clipped_length_m(&cell.geometry, &single),
            Err(GeometryError::TooFewVertices(1))
        );
    }

    #[test]
    fn road_lengths_merge_is_order_independent() {
        let mut a = RoadLengths::default();
        a.add(0, 1.0);
        a.add(2, 0.5);
        let mut b = RoadLengths::default();
        b.add(2, 0.25);
        b.record_skip();
        let mut c = RoadLengths::default();
        c.add(1, 2.0);

        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = c.merge(b.merge(a));
        assert_eq!(left, right);
        assert!((left.get(2) - 0.75).abs() < 1e-12);
        assert_eq!(left.skipped(), 1);
    }

    #[test]
    fn compute_densities_returns_row_per_cell() {
        let cells = cell_row(3);
        let features = FeatureSet {
            intersections: vec![Point::new(500.0, 500.0)],
            edges: vec![],
            signals: vec![],
        };
        let rows = compute_densities("test", &cells, &features, 2, &null_progress());
        assert_eq!(rows.len(), 3);
        assert!((rows[0].intersection - 1.0).abs() < 1e-12);
        assert!(rows.iter().all(|r| r.road == 0.0 && r.signal == 0.0));
    }
}
