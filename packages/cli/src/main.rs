#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the H3 urbanicity pipeline.
//!
//! Scores every H3 cell of one or more registered cities by intersection,
//! road, and traffic-control density, labels each cell with an urbanicity
//! band, and writes per-city tables and summaries.
//!
//! Configuration is validated once up front. Cities then run one after
//! another; a failing city is logged and counted, and the process exits
//! non-zero after every city has been attempted.

mod pipeline;
mod progress;
mod registry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use urbanicity_models::config::{
    DEFAULT_BUFFER_M, DEFAULT_Q_HIGH, DEFAULT_Q_LOW, DEFAULT_RESOLUTION,
    DEFAULT_SPARSITY_THRESHOLD,
};
use urbanicity_models::{GridConfig, ScoreConfig, SignalMode, Weights};
use urbanicity_output::OutputOptions;

use crate::pipeline::{RunConfig, run_city};
use crate::progress::{IndicatifProgress, init_logger, parse_level};

#[derive(Parser)]
#[command(name = "urbanicity", about = "H3 urbanicity scoring from OpenStreetMap")]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Cities to process: `all`, or a comma-separated list of slugs
    #[arg(long, default_value = "all")]
    cities: String,

    /// H3 resolution (0-15)
    #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
    h3_res: u8,

    /// Boundary buffer in metres applied before polyfilling
    #[arg(long, default_value_t = DEFAULT_BUFFER_M)]
    buffer_m: f64,

    /// Whether signal density contributes to the score: auto, on, or off
    #[arg(long, default_value = "auto", value_parser = parse_signal_mode)]
    signal_mode: SignalMode,

    /// Minimum fraction of cells with a signal for `auto` mode to use it
    #[arg(long, default_value_t = DEFAULT_SPARSITY_THRESHOLD)]
    sparsity_threshold: f64,

    /// Lower band quantile
    #[arg(long, default_value_t = DEFAULT_Q_LOW)]
    q_low: f64,

    /// Upper band quantile
    #[arg(long, default_value_t = DEFAULT_Q_HIGH)]
    q_high: f64,

    /// Score weights as `W_INT,W_ROAD,W_SIG` (must sum to 1.0)
    #[arg(long, value_parser = parse_weights)]
    weights: Option<Weights>,

    /// Skip the `GeoJSON` export
    #[arg(long)]
    no_geojson: bool,

    /// Skip `summary.json`
    #[arg(long)]
    no_summary: bool,

    /// Re-extract features even when a cache exists
    #[arg(long)]
    force: bool,

    /// Directory holding OSM extracts and boundary files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory for feature caches
    #[arg(long, default_value = "cache")]
    cache_dir: PathBuf,

    /// Root directory for per-city outputs
    #[arg(long, default_value = "outputs")]
    output_dir: PathBuf,

    /// Default log level (`RUST_LOG` takes precedence when set)
    #[arg(long, default_value = "info", value_parser = parse_level)]
    log_level: LevelFilter,
}

#[derive(Subcommand)]
enum Commands {
    /// List all registered cities
    Cities,
}

fn parse_signal_mode(value: &str) -> Result<SignalMode, String> {
    value
        .parse()
        .map_err(|_| format!("invalid signal mode '{value}': expected auto, on, or off"))
}

fn parse_weights(value: &str) -> Result<Weights, String> {
    value.parse().map_err(|e: urbanicity_models::ConfigError| e.to_string())
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            score: ScoreConfig {
                signal_mode: self.signal_mode,
                sparsity_threshold: self.sparsity_threshold,
                weights: self.weights.unwrap_or_default(),
                q_low: self.q_low,
                q_high: self.q_high,
            },
            grid: GridConfig {
                resolution: self.h3_res,
                buffer_m: self.buffer_m,
            },
            outputs: OutputOptions {
                geojson: !self.no_geojson,
                summary: !self.no_summary,
            },
            force: self.force,
            data_dir: self.data_dir.clone(),
            cache_dir: self.cache_dir.clone(),
            output_dir: self.output_dir.clone(),
        }
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let multi = init_logger(cli.log_level);

    if let Some(Commands::Cities) = cli.command {
        println!("{:<14} {:<14} EXTRACT", "SLUG", "NAME");
        println!("{}", "-".repeat(50));
        for city in registry::all_cities() {
            println!("{:<14} {:<14} {}", city.slug, city.name, city.extract);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let config = cli.run_config();
    config.validate()?;
    let cities = registry::select_cities(&cli.cities)?;

    log::info!(
        "Processing {} city(ies) at H3 resolution {}: {}",
        cities.len(),
        config.grid.resolution,
        cities
            .iter()
            .map(|c| c.slug.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let start = Instant::now();
    let overall = IndicatifProgress::cities_bar(&multi, cities.len() as u64);
    let mut failed = Vec::new();

    for city in &cities {
        match run_city(city, &config, &multi) {
            Ok(report) => log::info!(
                "[{}] {} cells, {} file(s) written",
                city.slug,
                report.cells,
                report.outputs.len()
            ),
            Err(e) => {
                log::error!("[{}] Failed: {e}", city.slug);
                failed.push(city.slug.as_str());
            }
        }
        overall.inc(1);
    }
    overall.finish_and_clear();

    let elapsed = start.elapsed().as_secs_f64();
    if failed.is_empty() {
        log::info!("All {} city(ies) completed in {elapsed:.1}s", cities.len());
        Ok(ExitCode::SUCCESS)
    } else {
        log::error!(
            "{} of {} city(ies) failed in {elapsed:.1}s: {}",
            failed.len(),
            cities.len(),
            failed.join(", ")
        );
        Ok(ExitCode::FAILURE)
    }
}
