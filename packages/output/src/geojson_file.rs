//! `GeoJSON` export: one feature per cell with its geographic hexagon.

use std::io::Write as _;
use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry, Value};
use urbanicity_models::{Cell, UrbanicityRecord};

use crate::OutputError;

/// Builds the feature collection. `cells` and `records` are parallel.
///
/// # Errors
///
/// Returns [`OutputError::RowMismatch`] if the slices differ in length, or
/// [`OutputError::Json`] if a record cannot be converted to properties.
pub fn feature_collection(
    cells: &[Cell],
    records: &[UrbanicityRecord],
) -> Result<FeatureCollection, OutputError> {
    if cells.len() != records.len() {
        return Err(OutputError::RowMismatch {
            cells: cells.len(),
            records: records.len(),
        });
    }

    let features = cells
        .iter()
        .zip(records)
        .map(|(cell, record)| {
            let properties = match serde_json::to_value(record)? {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            };
            Ok(Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::from(&cell.geometry_wgs84))),
                id: Some(geojson::feature::Id::String(cell.id.clone())),
                properties,
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Writes the cells as a `GeoJSON` `FeatureCollection`.
///
/// # Errors
///
/// Returns an [`OutputError`] if the collection cannot be built or written.
pub fn write_geojson(
    path: &Path,
    cells: &[Cell],
    records: &[UrbanicityRecord],
) -> Result<(), OutputError> {
    let collection = feature_collection(cells, records)?;

    let io_err = |source| OutputError::Io {
        path: path.display().to_string(),
        source,
    };
    let file = std::fs::File::create(path).map_err(io_err)?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer(&mut writer, &collection)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cell, record};

    #[test]
    fn one_feature_per_cell_with_null_signal() {
        let cells = vec![cell("a"), cell("b")];
        let records = vec![record("a", 1.0, None, 3), record("b", -1.0, None, 1)];
        let collection = feature_collection(&cells, &records).unwrap();

        assert_eq!(collection.features.len(), 2);
        let props = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(props["h3_index"], "a");
        assert_eq!(props["urbanicity_band_3_2_1"], 3);
        assert!(props["z_signal_density"].is_null());
        assert!(matches!(
            collection.features[0].geometry.as_ref().unwrap().value,
            Value::Polygon(_)
        ));
    }

    #[test]
    fn mismatched_rows_are_rejected() {
        let err = feature_collection(&[cell("a")], &[]).unwrap_err();
        assert!(matches!(
            err,
            OutputError::RowMismatch {
                cells: 1,
                records: 0
            }
        ));
    }

    #[test]
    fn written_file_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.geojson");
        write_geojson(&path, &[cell("a")], &[record("a", 0.0, Some(0.2), 2)]).unwrap();

        let parsed: geojson::GeoJson = std::fs::read_to_string(&path).unwrap().parse().unwrap();
        let geojson::GeoJson::FeatureCollection(fc) = parsed else {
            panic!("expected a FeatureCollection");
        };
        assert_eq!(fc.features.len(), 1);
    }
}
