//! CSV export of the per-cell table.

use std::path::Path;

use urbanicity_models::UrbanicityRecord;

use crate::OutputError;

/// Writes one row per cell with the canonical column header.
///
/// An undefined signal z-score is written as an empty field.
///
/// # Errors
///
/// Returns [`OutputError::Csv`] if the file cannot be created or written.
pub fn write_csv(path: &Path, records: &[UrbanicityRecord]) -> Result<(), OutputError> {
    let csv_err = |source| OutputError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    if records.is_empty() {
        writer
            .write_record(urbanicity_models::OUTPUT_COLUMNS)
            .map_err(csv_err)?;
    }
    for record in records {
        writer.serialize(record).map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|source| OutputError::Io {
            path: path.display().to_string(),
            source,
        })?;
    Ok(())
}
