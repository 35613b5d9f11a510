#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! H3 tessellation of a city boundary.
//!
//! The boundary is buffered in a local UTM zone, polyfilled with H3 cells
//! by centroid containment, and every cell is materialized as a
//! [`Cell`] carrying both its geographic polygon and its projected
//! polygon, whose area in km² the density computations divide by.

pub mod boundary;
pub mod utm;

use std::collections::BTreeSet;

use geo::{Area, LineString, MultiPolygon, Polygon};
use h3o::geom::{ContainmentMode, TilerBuilder};
use h3o::{CellIndex, LatLng, Resolution};
use urbanicity_models::{Cell, GridConfig};

pub use boundary::{
    boundary_zone, buffer_boundary, convex_hull_boundary, load_boundary, parse_boundary,
};
pub use utm::UtmZone;

/// Errors that can occur while building a city's cell grid.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// Boundary file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Boundary file is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// No polygonal area to tessellate.
    #[error("boundary has no polygonal area")]
    EmptyBoundary,

    /// Resolution not accepted by H3.
    #[error("invalid H3 resolution: {0}")]
    Resolution(u8),

    /// H3 rejected the boundary polygon.
    #[error("boundary cannot be polyfilled: {0}")]
    InvalidGeometry(String),

    /// A cell's projected polygon has no area.
    #[error("cell {0} has non-positive projected area")]
    DegenerateCell(String),
}

/// H3 cells whose centroid lies inside `boundary`, deduplicated and sorted.
///
/// # Errors
///
/// Returns [`GridError::Resolution`] or [`GridError::InvalidGeometry`].
pub fn polyfill(boundary: &MultiPolygon<f64>, resolution: u8) -> Result<Vec<CellIndex>, GridError> {
    let res = Resolution::try_from(resolution).map_err(|_| GridError::Resolution(resolution))?;

    let mut tiler = TilerBuilder::new(res)
        .containment_mode(ContainmentMode::ContainsCentroid)
        .build();
    for polygon in &boundary.0 {
        tiler
            .add(polygon.clone())
            .map_err(|e| GridError::InvalidGeometry(e.to_string()))?;
    }

    let cells: BTreeSet<CellIndex> = tiler.into_coverage().collect();
    log::debug!(
        "Polyfilled {} H3 cells at resolution {resolution}",
        cells.len()
    );
    Ok(cells.into_iter().collect())
}

/// Geographic (lon/lat) hexagon of an H3 cell.
#[must_use]
pub fn cell_polygon(cell: CellIndex) -> Polygon<f64> {
    let ring: Vec<(f64, f64)> = cell
        .boundary()
        .iter()
        .map(|ll| (ll.lng(), ll.lat()))
        .collect();
    Polygon::new(LineString::from(ring), vec![])
}

/// Materializes H3 cells as [`Cell`]s projected into `zone`.
///
/// # Errors
///
/// Returns [`GridError::DegenerateCell`] if a projected polygon has no
/// area.
pub fn build_cells(indices: &[CellIndex], zone: UtmZone) -> Result<Vec<Cell>, GridError> {
    indices
        .iter()
        .map(|&index| {
            let geometry_wgs84 = cell_polygon(index);
            let geometry = zone.project(&geometry_wgs84);
            let area_km2 = geometry.unsigned_area() / 1_000_000.0;
            let id = index.to_string();

            if !(area_km2.is_finite() && area_km2 > 0.0) {
                return Err(GridError::DegenerateCell(id));
            }

            let centroid = LatLng::from(index);
            Ok(Cell {
                id,
                area_km2,
                centroid_lat: centroid.lat(),
                centroid_lon: centroid.lng(),
                geometry,
                geometry_wgs84,
            })
        })
        .collect()
}

/// Buffers, polyfills, and materializes the cells covering a city.
///
/// # Errors
///
/// Returns a [`GridError`] if polyfilling or cell construction fails.
pub fn build_grid(
    slug: &str,
    boundary: &MultiPolygon<f64>,
    config: &GridConfig,
    zone: UtmZone,
) -> Result<Vec<Cell>, GridError> {
    let buffered = buffer_boundary(boundary, config.buffer_m, zone);
    let indices = polyfill(&buffered, config.resolution)?;
    if indices.is_empty() {
        log::warn!(
            "[{slug}] Boundary produced no H3 cells at resolution {}",
            config.resolution
        );
    }

    let cells = build_cells(&indices, zone)?;
    let total_km2: f64 = cells.iter().map(|c| c.area_km2).sum();
    log::info!(
        "[{slug}] Built {} H3 cells at resolution {} ({total_km2:.1} km² in {zone})",
        cells.len(),
        config.resolution
    );
    Ok(cells)
}
