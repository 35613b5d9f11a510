#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Output writers for a completed city run.
//!
//! Everything for one city lands in `<output_dir>/<slug>/`:
//!
//! * `h3_urbanicity_res<R>.csv`: the per-cell table
//! * `h3_urbanicity_res<R>.geojson`: the same table with hexagon geometry
//! * `summary.json`: band distribution, metric statistics, rankings
//! * `thresholds.json`: band quantiles, thresholds, and counts

pub mod geojson_file;
pub mod summary;
pub mod table;

use std::path::{Path, PathBuf};

use urbanicity_models::{Cell, RunMetadata, UrbanicityRecord};

pub use geojson_file::write_geojson;
pub use summary::{Summary, ThresholdsFile, build_summary, write_json};
pub use table::write_csv;

/// Errors from writing city outputs.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// I/O error creating a directory or writing a file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV serialization error.
    #[error("CSV error at {path}: {source}")]
    Csv {
        /// Path to the CSV file.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Cell and record slices are not parallel.
    #[error("{cells} cells but {records} records")]
    RowMismatch {
        /// Number of cells.
        cells: usize,
        /// Number of records.
        records: usize,
    },
}

/// Which optional outputs to write. The CSV table is always written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    /// Write the `GeoJSON` export.
    pub geojson: bool,
    /// Write `summary.json`.
    pub summary: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            geojson: true,
            summary: true,
        }
    }
}

/// A city's identity and resolution, for naming outputs.
#[derive(Debug, Clone, Copy)]
pub struct CityOutput<'a> {
    /// City slug (directory name).
    pub slug: &'a str,
    /// City display name.
    pub name: &'a str,
    /// H3 resolution.
    pub h3_res: u8,
}

/// Base file name (without extension) of the per-cell table.
#[must_use]
pub fn table_stem(h3_res: u8) -> String {
    format!("h3_urbanicity_res{h3_res}")
}

/// Creates and returns `<output_dir>/<slug>/`.
///
/// # Errors
///
/// Returns [`OutputError::Io`] if the directory cannot be created.
pub fn city_output_dir(output_dir: &Path, slug: &str) -> Result<PathBuf, OutputError> {
    let dir = output_dir.join(slug);
    std::fs::create_dir_all(&dir).map_err(|source| OutputError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    Ok(dir)
}

/// Writes every enabled output for a city and returns the written paths.
///
/// # Errors
///
/// Returns the first [`OutputError`] encountered.
pub fn write_city_outputs(
    output_dir: &Path,
    city: CityOutput<'_>,
    cells: &[Cell],
    records: &[UrbanicityRecord],
    metadata: &RunMetadata,
    options: OutputOptions,
) -> Result<Vec<PathBuf>, OutputError> {
    let dir = city_output_dir(output_dir, city.slug)?;
    let stem = table_stem(city.h3_res);
    let mut written = Vec::new();

    let csv_path = dir.join(format!("{stem}.csv"));
    write_csv(&csv_path, records)?;
    log::info!(
        "[{}] CSV written: {} ({} rows)",
        city.slug,
        csv_path.display(),
        records.len()
    );
    written.push(csv_path);

    if options.geojson {
        let path = dir.join(format!("{stem}.geojson"));
        write_geojson(&path, cells, records)?;
        log::info!(
            "[{}] GeoJSON written: {} ({} features)",
            city.slug,
            path.display(),
            cells.len()
        );
        written.push(path);
    }

    if options.summary {
        let path = dir.join("summary.json");
        let summary = build_summary(city.name, city.slug, city.h3_res, records, metadata);
        write_json(&path, &summary)?;
        log::info!("[{}] Summary written: {}", city.slug, path.display());
        written.push(path);
    }

    let path = dir.join("thresholds.json");
    write_json(&path, &ThresholdsFile::from(metadata))?;
    log::debug!("[{}] Thresholds written: {}", city.slug, path.display());
    written.push(path);

    Ok(written)
}
