//! TOML configuration for the `crime_districts` binary.
//!
//! ```toml
//! [boundaries]
//! path = "Boundaries.geojson"
//! id_property = "dist_num"
//!
//! [incidents]
//! path = "crimes.csv"
//!
//! [stations]
//! path = "police_stations.csv"
//!
//! [filters.gun]
//! type = "description"
//! matches = { contains = "GUN" }
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crime_districts_dataset::DEFAULT_EXCLUDED_STATIONS;
use crime_districts_dataset::providers::{IncidentColumns, StationColumns};
use crime_districts_dataset_models::IncidentFilter;
use crime_districts_region_models::BoundaryFieldMapping;
use crime_districts_retry::RetryPolicy;
use serde::Deserialize;

use crate::CliError;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "crime_districts.toml";

/// Filter name that selects every incident unless the config redefines it.
pub const ALL_FILTER: &str = "all";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub boundaries: BoundariesConfig,
    pub incidents: IncidentsConfig,
    pub stations: Option<StationsConfig>,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Named filters, selectable with `--filter NAME`.
    #[serde(default)]
    pub filters: BTreeMap<String, IncidentFilter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoundariesConfig {
    /// `GeoJSON` `FeatureCollection` of district polygons.
    pub path: PathBuf,
    #[serde(flatten)]
    pub fields: BoundaryFieldMapping,
}

/// Storage format of the incident source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentFormat {
    #[default]
    Csv,
    Duckdb,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncidentsConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: IncidentFormat,
    /// CSV column names.
    #[serde(default)]
    pub columns: IncidentColumns,
    /// CSV field delimiter, a single ASCII character.
    pub delimiter: Option<char>,
    /// `DuckDB` query overriding the default incident query.
    pub query: Option<String>,
    /// Named filter applied while loading. Rows it rejects are never kept.
    pub filter: Option<String>,
    /// Assign a district from the boundary polygons to rows that have
    /// coordinates but no district. Loads incidents after boundaries.
    #[serde(default)]
    pub locate_missing_districts: bool,
}

impl IncidentsConfig {
    /// The delimiter as a byte, `,` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::InvalidConfig`] for a non-ASCII delimiter.
    pub fn delimiter_byte(&self) -> Result<u8, CliError> {
        let delimiter = self.delimiter.unwrap_or(',');
        u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| CliError::InvalidConfig {
                message: format!("incident delimiter {delimiter:?} is not a single ASCII character"),
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationsConfig {
    pub path: PathBuf,
    /// Station identifiers that are not districts.
    #[serde(default = "default_excluded_stations")]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub columns: StationColumns,
}

fn default_excluded_stations() -> Vec<String> {
    DEFAULT_EXCLUDED_STATIONS
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Config {
    /// Reads a config file and resolves its relative paths.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&text)?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        log::debug!("Loaded config from {}", path.display());

        Ok(config)
    }

    /// Parses config text without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::ParseConfig`] for invalid TOML or missing
    /// sections.
    pub fn parse(text: &str) -> Result<Self, CliError> {
        let config: Self = toml::from_str(text)?;
        if config.incidents.format == IncidentFormat::Csv && config.incidents.query.is_some() {
            log::warn!("incidents.query is ignored for CSV sources");
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.boundaries.path);
        resolve(&mut self.incidents.path);
        if let Some(stations) = &mut self.stations {
            resolve(&mut stations.path);
        }
    }

    /// Looks up a named filter. `None` and `"all"` select every incident
    /// unless the config defines its own `all`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::UnknownFilter`] if no filter has that name.
    pub fn filter(&self, name: Option<&str>) -> Result<IncidentFilter, CliError> {
        let Some(name) = name else {
            return Ok(IncidentFilter::All);
        };
        match self.filters.get(name) {
            Some(filter) => Ok(filter.clone()),
            None if name == ALL_FILTER => Ok(IncidentFilter::All),
            None => Err(CliError::UnknownFilter {
                name: name.to_string(),
                available: self.filters.keys().cloned().collect(),
            }),
        }
    }
}
