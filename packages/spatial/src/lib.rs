#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial indexing and density aggregation for a city's cells.
//!
//! Builds R-tree indexes over cell polygons (for point assignment) and
//! road edges (for length apportionment), and computes per-cell
//! densities in the city's metric projection.

pub mod density;

use geo::{BoundingRect, Contains, Intersects, LineString, Point, Polygon};
use rstar::{AABB, RTree, RTreeObject};
use urbanicity_models::Cell;

pub use density::{
    DEFAULT_BATCH_SIZE, RoadLengths, compute_densities, compute_line_density,
    compute_point_density,
};

/// A single edge/cell pair could not be intersected.
///
/// Recoverable: the pair's contribution is skipped and the rest of the
/// city is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// A coordinate is NaN or infinite.
    #[error("non-finite coordinate")]
    NonFinite,

    /// A line has fewer than two vertices.
    #[error("line has {0} vertices, need at least 2")]
    TooFewVertices(usize),

    /// A polygon ring is not closed or has fewer than four vertices.
    #[error("polygon exterior ring is degenerate")]
    DegeneratePolygon,
}

/// A cell polygon stored in the R-tree, with its position in the city's
/// cell slice.
struct CellEntry<'a> {
    position: usize,
    cell: &'a Cell,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for CellEntry<'_> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over a city's cell polygons.
///
/// Point lookups return the cell's position in the slice the index was
/// built from.
pub struct CellIndex<'a> {
    cells: RTree<CellEntry<'a>>,
}

impl<'a> CellIndex<'a> {
    /// Builds the index from a slice of cells.
    #[must_use]
    pub fn new(cells: &'a [Cell]) -> Self {
        let entries = cells
            .iter()
            .enumerate()
            .map(|(position, cell)| CellEntry {
                position,
                cell,
                envelope: polygon_envelope(&cell.geometry),
            })
            .collect();

        Self {
            cells: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.size()
    }

    /// Whether the index holds no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.size() == 0
    }

    /// Finds the single cell a point belongs to.
    ///
    /// Cells tile without overlap, so the first cell whose interior
    /// contains the point wins. A point lying on a shared edge or vertex
    /// is in no interior; it goes to the touching cell with the smallest
    /// identifier so it is counted exactly once.
    #[must_use]
    pub fn locate(&self, point: &Point<f64>) -> Option<usize> {
        let query_env = AABB::from_point([point.x(), point.y()]);

        let mut boundary: Option<&CellEntry<'a>> = None;

        for entry in self.cells.locate_in_envelope_intersecting(&query_env) {
            if entry.cell.geometry.contains(point) {
                return Some(entry.position);
            }
            if entry.cell.geometry.intersects(point) {
                match boundary {
                    Some(current) if current.cell.id <= entry.cell.id => {}
                    _ => boundary = Some(entry),
                }
            }
        }

        boundary.map(|e| e.position)
    }
}

/// A road edge polyline stored in the R-tree.
struct EdgeEntry<'a> {
    line: &'a LineString<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for EdgeEntry<'_> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over road edge polylines, queried by cell envelope.
pub struct EdgeIndex<'a> {
    edges: RTree<EdgeEntry<'a>>,
}

impl<'a> EdgeIndex<'a> {
    /// Builds the index. Lines without a bounding box (no vertices) are
    /// left out.
    #[must_use]
    pub fn new<I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a LineString<f64>>,
    {
        let entries = lines
            .into_iter()
            .filter_map(|line| {
                line.bounding_rect().map(|rect| EdgeEntry {
                    line,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        Self {
            edges: RTree::bulk_load(entries),
        }
    }

    /// Edges whose bounding boxes intersect the polygon's bounding box.
    #[must_use]
    pub fn candidates(&self, polygon: &Polygon<f64>) -> Vec<&'a LineString<f64>> {
        let env = polygon_envelope(polygon);
        self.edges
            .locate_in_envelope_intersecting(&env)
            .map(|entry| entry.line)
            .collect()
    }
}

/// Compute the bounding box envelope for a [`Polygon`].
fn polygon_envelope(polygon: &Polygon<f64>) -> AABB<[f64; 2]> {
    polygon.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use geo::{Polygon, polygon};
    use urbanicity_models::Cell;

    /// Axis-aligned square cell with its lower-left corner at
    /// (`x0`, `y0`) metres and side `side_m`.
    pub fn square_cell(id: &str, x0: f64, y0: f64, side_m: f64) -> Cell {
        let geometry: Polygon<f64> = polygon![
            (x: x0, y: y0),
            (x: x0 + side_m, y: y0),
            (x: x0 + side_m, y: y0 + side_m),
            (x: x0, y: y0 + side_m),
            (x: x0, y: y0),
        ];
        Cell {
            id: id.to_string(),
            area_km2: side_m * side_m / 1_000_000.0,
            centroid_lat: 0.0,
            centroid_lon: 0.0,
            geometry: geometry.clone(),
            geometry_wgs84: geometry,
        }
    }

    /// A row of `n` adjacent 1 km² square cells along the x axis.
    pub fn cell_row(n: usize) -> Vec<Cell> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let x0 = i as f64 * 1000.0;
                square_cell(&format!("c{i}"), x0, 0.0, 1000.0)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use geo::{Point, line_string};

    use super::test_support::{cell_row, square_cell};
    use super::*;

    #[test]
    fn locates_interior_point() {
        let cells = cell_row(3);
        let index = CellIndex::new(&cells);
        assert_eq!(index.len(), 3);
        assert_eq!(index.locate(&Point::new(1500.0, 500.0)), Some(1));
        assert_eq!(index.locate(&Point::new(2999.0, 1.0)), Some(2));
    }

    #[test]
    fn point_outside_all_cells_is_unassigned() {
        let cells = cell_row(2);
        let index = CellIndex::new(&cells);
        assert_eq!(index.locate(&Point::new(-10.0, 500.0)), None);
        assert_eq!(index.locate(&Point::new(500.0, 5000.0)), None);
    }

    #[test]
    fn shared_edge_point_goes_to_smallest_id() {
        // "b" sits left of "a" so the tie-break is not just slice order.
        let cells = vec![
            square_cell("b", 1000.0, 0.0, 1000.0),
            square_cell("a", 0.0, 0.0, 1000.0),
        ];
        let index = CellIndex::new(&cells);
        let on_edge = Point::new(1000.0, 500.0);
        assert_eq!(index.locate(&on_edge), Some(1), "cell 'a' should win");
    }

    #[test]
    fn edge_index_returns_overlapping_candidates() {
        let cells = cell_row(3);
        let near = line_string![(x: 100.0, y: 100.0), (x: 400.0, y: 400.0)];
        let far = line_string![(x: 2500.0, y: 100.0), (x: 2600.0, y: 900.0)];
        let lines = [near, far];
        let index = EdgeIndex::new(lines.iter());

        let found = index.candidates(&cells[0].geometry);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], &lines[0]);
    }
}
