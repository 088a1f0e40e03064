#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-district crime aggregation from the command line.
//!
//! ```text
//! crime_districts counts [--filter gun]
//! crime_districts density [--region 11] [--filter gun]
//! crime_districts top --region 11 [--attribute block] [-k 5]
//! crime_districts farthest [--region 11] --filter gun
//! crime_districts nearest [--region 11]
//! crime_districts arrests --region 11
//! crime_districts summary --region 11 [-k 5]
//! crime_districts regions
//! ```
//!
//! Sources and named filters come from a TOML config (see [`config`]).
//! Results are printed to stdout as JSON; logs go to stderr and are
//! controlled with `RUST_LOG`.

mod config;
mod load;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crime_districts_aggregate::{AggregateError, AggregationEngine};
use crime_districts_dataset::{DatasetError, ReferenceLocations};
use crime_districts_dataset_models::{IncidentAttribute, IncidentFilter};
use crime_districts_region::RegionError;
use crime_districts_region_models::normalize_region_id;
use serde::Serialize;
use thiserror::Error;

use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::load::{Loaded, load_all};

/// Errors surfaced by the `crime_districts` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// The config file could not be read.
    #[error("Failed to read config {}: {source}", .path.display())]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid.
    #[error("Invalid config: {0}")]
    ParseConfig(#[from] toml::de::Error),

    /// A config value is out of range.
    #[error("Invalid config: {message}")]
    InvalidConfig { message: String },

    /// `--filter` names a filter the config does not define.
    #[error("Unknown filter '{name}' (available: all, {})", .available.join(", "))]
    UnknownFilter {
        name: String,
        available: Vec<String>,
    },

    /// `--region` is blank.
    #[error("Invalid district identifier '{raw}'")]
    InvalidRegionId { raw: String },

    /// A command needs stations but the config has none, or none for the
    /// requested district.
    #[error("No station configured for {0}")]
    MissingStation(String),

    /// The config selects `DuckDB` incidents in a build without the
    /// `duckdb` feature.
    #[error(
        "Incidents at {} are DuckDB but this build has no DuckDB support",
        .path.display()
    )]
    DuckDbDisabled { path: PathBuf },

    /// A loader thread panicked.
    #[error("The {what} loader panicked")]
    LoaderPanicked { what: &'static str },

    /// Boundaries failed to load.
    #[error(transparent)]
    Region(#[from] RegionError),

    /// Incidents or stations failed to load.
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// An aggregation rejected the requested district.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// A result could not be serialized.
    #[error("Failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser)]
#[command(
    name = "crime_districts",
    about = "Per-district crime counts, densities, rankings and distance extremes"
)]
struct Cli {
    /// Path to the TOML config
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Named filter from the config applied to the aggregation
    #[arg(long, short, global = true)]
    filter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count incidents in every district
    Counts,
    /// Incidents per 100 hectares, for one district or all of them
    Density {
        /// District identifier
        #[arg(long, short)]
        region: Option<String>,
    },
    /// Most frequent values of an attribute in a district
    Top {
        /// District identifier
        #[arg(long, short)]
        region: String,
        /// Attribute to rank (category, description, location_description, block, arrest)
        #[arg(long, short, default_value = "description", value_parser = parse_attribute)]
        attribute: IncidentAttribute,
        /// Number of values to show
        #[arg(short, default_value = "10")]
        k: usize,
    },
    /// Incident farthest from the district station
    Farthest {
        /// District identifier (every station when omitted)
        #[arg(long, short)]
        region: Option<String>,
    },
    /// Incident nearest to the district station
    Nearest {
        /// District identifier (every station when omitted)
        #[arg(long, short)]
        region: Option<String>,
    },
    /// Arrested versus not-arrested incidents in a district
    Arrests {
        /// District identifier
        #[arg(long, short)]
        region: String,
    },
    /// Count, density, top values, arrests and farthest incident for a district
    Summary {
        /// District identifier
        #[arg(long, short)]
        region: String,
        /// Number of top values to include
        #[arg(short, default_value = "5")]
        k: usize,
    },
    /// List indexed districts with their areas
    Regions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DensityValue<'a> {
    region_id: &'a str,
    density: f64,
}

fn parse_attribute(raw: &str) -> Result<IncidentAttribute, String> {
    raw.parse().map_err(|_| {
        let expected: Vec<&str> = IncidentAttribute::all()
            .iter()
            .map(AsRef::<str>::as_ref)
            .collect();
        format!("expected one of: {}", expected.join(", "))
    })
}

fn region_arg(raw: &str) -> Result<String, CliError> {
    normalize_region_id(raw).ok_or_else(|| CliError::InvalidRegionId {
        raw: raw.to_string(),
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn stations(loaded: &Loaded) -> Result<&ReferenceLocations, CliError> {
    loaded
        .stations
        .as_ref()
        .ok_or_else(|| CliError::MissingStation("any district: add a [stations] section".into()))
}

fn extreme(
    loaded: &Loaded,
    engine: &AggregationEngine<'_>,
    region: Option<&str>,
    filter: &IncidentFilter,
    farthest: bool,
) -> Result<(), CliError> {
    let stations = stations(loaded)?;

    let Some(region) = region else {
        let points = if farthest {
            engine.farthest_per_region(stations, filter)
        } else {
            engine.nearest_per_region(stations, filter)
        };
        return print_json(&points);
    };

    let region_id = region_arg(region)?;
    let station = stations
        .get(&region_id)
        .ok_or_else(|| CliError::MissingStation(format!("district {region_id}")))?;
    let point = if farthest {
        engine.farthest_point(&region_id, &station.coordinate, filter)?
    } else {
        engine.nearest_point(&region_id, &station.coordinate, filter)?
    };
    print_json(&point)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::load(&cli.config)?;
    let filter = config.filter(cli.filter.as_deref())?;

    let loaded = load_all(&config)?;
    let engine = AggregationEngine::new(&loaded.regions, &loaded.dataset);

    match cli.command {
        Commands::Counts => print_json(&engine.count_by_region(&filter)),
        Commands::Density { region: None } => print_json(&engine.density_table(&filter)),
        Commands::Density {
            region: Some(region),
        } => {
            let region_id = region_arg(&region)?;
            let density = engine.density(&region_id, &filter)?;
            print_json(&DensityValue {
                region_id: &region_id,
                density,
            })
        }
        Commands::Top {
            region,
            attribute,
            k,
        } => {
            let region_id = region_arg(&region)?;
            print_json(&engine.top_k_by_attribute(&region_id, attribute, k, &filter)?)
        }
        Commands::Farthest { region } => {
            extreme(&loaded, &engine, region.as_deref(), &filter, true)
        }
        Commands::Nearest { region } => {
            extreme(&loaded, &engine, region.as_deref(), &filter, false)
        }
        Commands::Arrests { region } => {
            let region_id = region_arg(&region)?;
            print_json(&engine.arrest_breakdown(&region_id, &filter)?)
        }
        Commands::Summary { region, k } => {
            let region_id = region_arg(&region)?;
            let station = loaded
                .stations
                .as_ref()
                .and_then(|s| s.get(&region_id))
                .map(|s| &s.coordinate);
            print_json(&engine.summarize(&region_id, station, &filter, k)?)
        }
        Commands::Regions => {
            let regions: Vec<_> = loaded.regions.regions().collect();
            print_json(&regions)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    run(cli)?;

    Ok(())
}
