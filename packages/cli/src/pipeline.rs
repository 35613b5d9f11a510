//! Per-city pipeline.
//!
//! Chains features -> boundary -> grid -> densities -> scores -> bands ->
//! validation -> outputs for one city. Every step logs with the city slug
//! as prefix, and any failure aborts only the city it belongs to.

use std::path::PathBuf;
use std::time::Instant;

use geo::{BoundingRect, MultiPolygon, Rect};
use indicatif::MultiProgress;
use urbanicity_grid::GridError;
use urbanicity_models::{
    Cell, CityConfig, ConfigError, GridConfig, RunMetadata, ScoreConfig, UrbanicityRecord,
};
use urbanicity_osm::OsmError;
use urbanicity_output::{CityOutput, OutputError, OutputOptions};
use urbanicity_score::ValidationError;
use urbanicity_spatial::density::{DEFAULT_BATCH_SIZE, compute_densities};

use crate::progress::IndicatifProgress;

/// Errors that abort a single city.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid run configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Feature extraction or cache failure.
    #[error(transparent)]
    Osm(#[from] OsmError),

    /// Boundary or tessellation failure.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// The finished table failed its acceptance checks.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Output files could not be written.
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Settings shared by every city in one invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Scoring and banding settings.
    pub score: ScoreConfig,
    /// Tessellation settings.
    pub grid: GridConfig,
    /// Optional output toggles.
    pub outputs: OutputOptions,
    /// Ignore and overwrite feature caches.
    pub force: bool,
    /// Directory holding OSM extracts and boundary files.
    pub data_dir: PathBuf,
    /// Directory for feature caches.
    pub cache_dir: PathBuf,
    /// Root directory for per-city outputs.
    pub output_dir: PathBuf,
}

impl RunConfig {
    /// Validates every setting once, before any city runs.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.score.validate()?;
        self.grid.validate()
    }
}

/// What a successful city run produced.
#[derive(Debug, Clone)]
pub struct CityReport {
    /// Number of cells scored.
    pub cells: usize,
    /// Scoring decisions.
    pub metadata: RunMetadata,
    /// Files written.
    pub outputs: Vec<PathBuf>,
}

/// Runs the full pipeline for one city.
///
/// # Errors
///
/// Returns a [`PipelineError`] from the first step that fails.
pub fn run_city(
    city: &CityConfig,
    config: &RunConfig,
    multi: &MultiProgress,
) -> Result<CityReport, PipelineError> {
    let slug = city.slug.as_str();
    let start = Instant::now();
    log::info!("[{slug}] Processing {} ({})", city.name, city.osm_query);

    // --- 1. Features ---
    let extract = config.data_dir.join(&city.extract);
    let features =
        urbanicity_osm::load_features(slug, &extract, &config.cache_dir, config.force)?;

    // --- 2. Boundary and projection ---
    let boundary = city_boundary(city, config, &features)?;
    let zone = urbanicity_grid::boundary_zone(&boundary)?;
    log::info!("[{slug}] Projecting to {zone}");

    // --- 3. Grid ---
    let cells = urbanicity_grid::build_grid(slug, &boundary, &config.grid, zone)?;

    // --- 4. Densities ---
    let features = match cells_extent(&cells) {
        Some(extent) => features.within(extent),
        None => features,
    };
    let projected = features.project(zone);
    let progress = IndicatifProgress::batch_bar(multi, &format!("[{slug}] Apportioning roads"));
    let densities = compute_densities(slug, &cells, &projected, DEFAULT_BATCH_SIZE, &progress);

    // --- 5. Scores and bands ---
    let outcome = urbanicity_score::compute_scores(slug, &densities, &config.score)?;
    let scores: Vec<f64> = outcome.rows.iter().map(|r| r.score).collect();
    let banding =
        urbanicity_score::assign_bands(slug, &scores, config.score.q_low, config.score.q_high);
    let metadata = RunMetadata::new(&outcome.signal, banding.thresholds, &banding.bands);

    let records: Vec<UrbanicityRecord> = cells
        .iter()
        .zip(&densities)
        .zip(&outcome.rows)
        .zip(&banding.bands)
        .map(|(((cell, density), score), &band)| {
            UrbanicityRecord::new(
                &city.name,
                config.grid.resolution,
                cell,
                density,
                score,
                band,
                &banding.thresholds,
            )
        })
        .collect();

    // --- 6. Validate and write ---
    urbanicity_score::validate_city_output(slug, &records, &metadata)?;

    let outputs = urbanicity_output::write_city_outputs(
        &config.output_dir,
        CityOutput {
            slug,
            name: &city.name,
            h3_res: config.grid.resolution,
        },
        &cells,
        &records,
        &metadata,
        config.outputs,
    )?;

    log::info!(
        "[{slug}] Done: {} cells in {:.1}s",
        cells.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(CityReport {
        cells: cells.len(),
        metadata,
        outputs,
    })
}

/// The configured boundary file, or the convex hull of the road network.
fn city_boundary(
    city: &CityConfig,
    config: &RunConfig,
    features: &urbanicity_osm::GeographicFeatures,
) -> Result<MultiPolygon<f64>, GridError> {
    if let Some(file) = &city.boundary {
        return urbanicity_grid::load_boundary(&config.data_dir.join(file));
    }

    log::info!(
        "[{}] No boundary file configured, using the road network's convex hull",
        city.slug
    );
    urbanicity_grid::convex_hull_boundary(&features.road_nodes())
}

/// Geographic bounding box of all cells.
fn cells_extent(cells: &[Cell]) -> Option<Rect<f64>> {
    cells
        .iter()
        .filter_map(|c| c.geometry_wgs84.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
            )
        })
}
