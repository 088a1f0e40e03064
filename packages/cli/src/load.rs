//! Loads boundaries, incidents and stations on scoped threads.

use std::thread::ScopedJoinHandle;

use crime_districts_dataset::providers::{
    CsvIncidentProvider, CsvSource, CsvStationProvider, RowProvider,
};
use crime_districts_dataset::{LoadOptions, PointDataset, ReferenceLocations};
use crime_districts_dataset_models::{IncidentFilter, IncidentRow};
use crime_districts_region::RegionIndex;
use crime_districts_region_models::RegionLocator;

use crate::CliError;
use crate::config::{Config, IncidentFormat, IncidentsConfig};

/// Everything an aggregation needs, fully loaded.
pub struct Loaded {
    pub regions: RegionIndex,
    pub dataset: PointDataset,
    pub stations: Option<ReferenceLocations>,
}

/// Loads all configured sources.
///
/// The three sources load in parallel. When
/// `incidents.locate_missing_districts` is set, incidents wait for the
/// boundaries so the index can assign districts.
///
/// # Errors
///
/// Returns the first [`CliError`] raised by any loader.
pub fn load_all(config: &Config) -> Result<Loaded, CliError> {
    let load_filter = config.filter(config.incidents.filter.as_deref())?;

    std::thread::scope(|scope| -> Result<Loaded, CliError> {
        let stations = scope.spawn(|| load_stations(config));

        let (regions, dataset) = if config.incidents.locate_missing_districts {
            let regions = load_regions(config)?;
            let dataset = load_incidents(config, &load_filter, Some(&regions))?;
            (regions, dataset)
        } else {
            let incidents = scope.spawn(|| load_incidents(config, &load_filter, None));
            let regions = load_regions(config)?;
            (regions, join(incidents, "incidents")?)
        };

        let stations = join(stations, "stations")?;

        Ok(Loaded {
            regions,
            dataset,
            stations,
        })
    })
}

fn join<T>(
    handle: ScopedJoinHandle<'_, Result<T, CliError>>,
    what: &'static str,
) -> Result<T, CliError> {
    handle
        .join()
        .map_err(|_| CliError::LoaderPanicked { what })?
}

fn load_regions(config: &Config) -> Result<RegionIndex, CliError> {
    let boundaries = &config.boundaries;
    Ok(RegionIndex::from_file(
        &boundaries.path,
        &boundaries.fields,
        &config.retry,
    )?)
}

fn load_incidents(
    config: &Config,
    filter: &IncidentFilter,
    regions: Option<&RegionIndex>,
) -> Result<PointDataset, CliError> {
    let provider = incident_provider(&config.incidents)?;
    let options = LoadOptions {
        retry: config.retry,
        locator: regions.map(|r| r as &dyn RegionLocator),
    };
    Ok(PointDataset::load_with(provider.as_ref(), filter, &options)?)
}

fn incident_provider(
    incidents: &IncidentsConfig,
) -> Result<Box<dyn RowProvider<IncidentRow>>, CliError> {
    match incidents.format {
        IncidentFormat::Csv => Ok(Box::new(
            CsvIncidentProvider::new(CsvSource::Path(incidents.path.clone()))
                .with_columns(incidents.columns.clone())
                .with_delimiter(incidents.delimiter_byte()?),
        )),
        IncidentFormat::Duckdb => duckdb_provider(incidents),
    }
}

#[cfg(feature = "duckdb")]
#[allow(clippy::unnecessary_wraps)]
fn duckdb_provider(
    incidents: &IncidentsConfig,
) -> Result<Box<dyn RowProvider<IncidentRow>>, CliError> {
    use crime_districts_dataset::providers::DuckDbIncidentProvider;

    let mut provider = DuckDbIncidentProvider::new(incidents.path.clone());
    if let Some(query) = &incidents.query {
        provider = provider.with_query(query);
    }
    Ok(Box::new(provider))
}

#[cfg(not(feature = "duckdb"))]
fn duckdb_provider(
    incidents: &IncidentsConfig,
) -> Result<Box<dyn RowProvider<IncidentRow>>, CliError> {
    Err(CliError::DuckDbDisabled {
        path: incidents.path.clone(),
    })
}

fn load_stations(config: &Config) -> Result<Option<ReferenceLocations>, CliError> {
    let Some(stations) = &config.stations else {
        return Ok(None);
    };
    let provider = CsvStationProvider::new(CsvSource::Path(stations.path.clone()))
        .with_columns(stations.columns.clone());
    Ok(Some(ReferenceLocations::load(
        &provider,
        &stations.exclude,
        &config.retry,
    )?))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "crime_districts_cli_{name}_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    const BOUNDARIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "dist_num": "11" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [-87.75, 41.85], [-87.68, 41.85], [-87.68, 41.90],
                        [-87.75, 41.90], [-87.75, 41.85]
                    ]]
                }
            }
        ]
    }"#;

    const INCIDENTS: &str = "\
Case Number,District,Primary Type,Description,Arrest,Location Description,Block,Latitude,Longitude
JA1,011,WEAPONS VIOLATION,UNLAWFUL POSS OF HANDGUN,true,STREET,039XX W MADISON ST,41.88,-87.72
JA2,,ROBBERY,ARMED: HANDGUN,false,SIDEWALK,040XX W MADISON ST,41.87,-87.71
JA3,011,THEFT,$500 AND UNDER,false,RESIDENCE,041XX W MADISON ST,41.86,-87.70
";

    const STATIONS: &str = "\
DISTRICT,DISTRICT NAME,LATITUDE,LONGITUDE
Headquarters,Headquarters,41.83,-87.62
11,Harrison,41.873,-87.705
";

    fn write_fixture(name: &str, extra: &str) -> Config {
        let dir = temp_dir(name);
        std::fs::write(dir.join("boundaries.geojson"), BOUNDARIES).unwrap();
        std::fs::write(dir.join("crimes.csv"), INCIDENTS).unwrap();
        std::fs::write(dir.join("stations.csv"), STATIONS).unwrap();

        let text = format!(
            r#"
            [boundaries]
            path = "boundaries.geojson"

            [incidents]
            path = "crimes.csv"
            {extra}

            [stations]
            path = "stations.csv"

            [retry]
            max_attempts = 1

            [filters.gun]
            type = "description"
            matches = {{ contains = "GUN" }}
            "#
        );
        let path = dir.join("crime_districts.toml");
        std::fs::write(&path, text).unwrap();
        Config::load(&path).unwrap()
    }

    #[test]
    fn loads_all_sources_in_parallel() {
        let config = write_fixture("parallel", "");
        let loaded = load_all(&config).unwrap();

        assert_eq!(loaded.regions.len(), 1);
        assert_eq!(loaded.dataset.len(), 2);
        assert_eq!(loaded.dataset.skipped().missing_region, 1);

        let stations = loaded.stations.unwrap();
        assert_eq!(stations.len(), 1);
        assert!(stations.get("11").is_some());
    }

    #[test]
    fn locates_missing_districts_and_applies_load_filter() {
        let config = write_fixture(
            "locate",
            "filter = \"gun\"\nlocate_missing_districts = true",
        );
        let loaded = load_all(&config).unwrap();

        let cases: Vec<&str> = loaded
            .dataset
            .points_in("11")
            .map(|i| i.case_number.as_str())
            .collect();
        assert_eq!(cases, vec!["JA1", "JA2"]);
        assert_eq!(loaded.dataset.skipped().filtered, 1);
    }

    #[test]
    fn missing_boundary_file_fails() {
        let mut config = write_fixture("missing", "");
        config.boundaries.path = PathBuf::from("/nonexistent/boundaries.geojson");
        let err = load_all(&config).err().unwrap();
        assert!(matches!(err, CliError::Region(_)), "unexpected error: {err}");
    }
}
