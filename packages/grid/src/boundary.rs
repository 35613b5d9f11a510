//! City boundary loading, fallback hull, and metric buffering.

use std::path::Path;

use geo::{Buffer, Centroid, ConvexHull, MultiPoint, MultiPolygon, Point};
use geojson::GeoJson;

use crate::{GridError, UtmZone};

/// Loads a city boundary from a `GeoJSON` file.
///
/// Accepts a bare geometry, a `Feature`, or a `FeatureCollection`; every
/// `Polygon`/`MultiPolygon` found is merged into one [`MultiPolygon`].
///
/// # Errors
///
/// * [`GridError::Io`] if the file cannot be read
/// * [`GridError::GeoJson`] if it is not valid `GeoJSON`
/// * [`GridError::EmptyBoundary`] if it holds no polygonal geometry
pub fn load_boundary(path: &Path) -> Result<MultiPolygon<f64>, GridError> {
    let text = std::fs::read_to_string(path).map_err(|source| GridError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let boundary = parse_boundary(&text)?;
    log::info!(
        "Loaded boundary from {} ({} polygon(s))",
        path.display(),
        boundary.0.len()
    );
    Ok(boundary)
}

/// Parses boundary `GeoJSON` text into a [`MultiPolygon`].
///
/// # Errors
///
/// Returns [`GridError::GeoJson`] or [`GridError::EmptyBoundary`].
pub fn parse_boundary(text: &str) -> Result<MultiPolygon<f64>, GridError> {
    let geojson: GeoJson = text.parse()?;

    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::Geometry(geometry) => vec![geometry],
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
    };

    let mut polygons = Vec::new();
    for geometry in geometries {
        let converted: geo::Geometry<f64> = geometry.try_into()?;
        match converted {
            geo::Geometry::Polygon(p) => polygons.push(p),
            geo::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
            other => log::debug!("Ignoring non-polygonal boundary geometry: {other:?}"),
        }
    }

    if polygons.is_empty() {
        return Err(GridError::EmptyBoundary);
    }
    Ok(MultiPolygon(polygons))
}

/// Convex hull of a set of lon/lat points, used when a city has no
/// boundary file.
///
/// # Errors
///
/// Returns [`GridError::EmptyBoundary`] when fewer than three points are
/// given or the hull has no area.
pub fn convex_hull_boundary(points: &[Point<f64>]) -> Result<MultiPolygon<f64>, GridError> {
    if points.len() < 3 {
        return Err(GridError::EmptyBoundary);
    }

    let hull = MultiPoint::new(points.to_vec()).convex_hull();
    if hull.exterior().0.len() < 4 {
        return Err(GridError::EmptyBoundary);
    }

    log::info!(
        "Using convex hull of {} road network nodes as boundary",
        points.len()
    );
    Ok(MultiPolygon(vec![hull]))
}

/// UTM zone of the boundary's centroid.
///
/// # Errors
///
/// Returns [`GridError::EmptyBoundary`] if the boundary has no centroid.
pub fn boundary_zone(boundary: &MultiPolygon<f64>) -> Result<UtmZone, GridError> {
    let centroid = boundary.centroid().ok_or(GridError::EmptyBoundary)?;
    Ok(UtmZone::for_lon_lat(centroid.x(), centroid.y()))
}

/// Grows the boundary by `buffer_m` metres, measured in `zone`.
///
/// A zero buffer returns the boundary unchanged.
#[must_use]
pub fn buffer_boundary(
    boundary: &MultiPolygon<f64>,
    buffer_m: f64,
    zone: UtmZone,
) -> MultiPolygon<f64> {
    if buffer_m <= 0.0 {
        return boundary.clone();
    }

    let projected = zone.project(boundary);
    let buffered = projected.buffer(buffer_m);
    log::debug!("Buffered boundary by {buffer_m} m in {zone}");
    zone.unproject(&buffered)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use geo::{Area, Contains};

    use super::*;

    const SQUARE: &str = r#"{
        "type": "Polygon",
        "coordinates": [[[-122.34, 47.60], [-122.33, 47.60], [-122.33, 47.61], [-122.34, 47.61], [-122.34, 47.60]]]
    }"#;

    #[test]
    fn parses_bare_polygon() {
        let mp = parse_boundary(SQUARE).unwrap();
        assert_eq!(mp.0.len(), 1);
    }

    #[test]
    fn merges_feature_collection_polygons() {
        let text = format!(
            r#"{{"type": "FeatureCollection", "features": [
                {{"type": "Feature", "properties": {{}}, "geometry": {SQUARE}}},
                {{"type": "Feature", "properties": {{}}, "geometry": {{"type": "Point", "coordinates": [0.0, 0.0]}}}},
                {{"type": "Feature", "properties": {{}}, "geometry": {SQUARE}}}
            ]}}"#
        );
        let mp = parse_boundary(&text).unwrap();
        assert_eq!(mp.0.len(), 2);
    }

    #[test]
    fn rejects_boundary_without_polygons() {
        let err =
            parse_boundary(r#"{"type": "Point", "coordinates": [0.0, 0.0]}"#).unwrap_err();
        assert!(matches!(err, GridError::EmptyBoundary), "{err:?}");
        assert!(matches!(
            parse_boundary("not json").unwrap_err(),
            GridError::GeoJson(_)
        ));
    }

    #[test]
    fn loads_boundary_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SQUARE.as_bytes()).unwrap();
        let mp = load_boundary(file.path()).unwrap();
        assert_eq!(mp.0.len(), 1);

        let missing = load_boundary(Path::new("/nonexistent/boundary.geojson")).unwrap_err();
        assert!(matches!(missing, GridError::Io { .. }));
    }

    #[test]
    fn convex_hull_needs_three_points() {
        let pts = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        assert!(matches!(
            convex_hull_boundary(&pts),
            Err(GridError::EmptyBoundary)
        ));

        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.5, 0.2),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        let hull = convex_hull_boundary(&pts).unwrap();
        assert!((hull.unsigned_area() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn buffer_grows_boundary() {
        let mp = parse_boundary(SQUARE).unwrap();
        let zone = boundary_zone(&mp).unwrap();
        assert_eq!(zone.number, 10);

        let buffered = buffer_boundary(&mp, 300.0, zone);
        assert!(buffered.unsigned_area() > mp.unsigned_area());
        // A point ~150 m west of the square's west edge.
        assert!(buffered.contains(&Point::new(-122.342, 47.605)));
        assert!(!mp.contains(&Point::new(-122.342, 47.605)));

        let unchanged = buffer_boundary(&mp, 0.0, zone);
        assert_eq!(unchanged, mp);
    }
}
