//! CSV row providers for incident and station exports.
//!
//! Parses a CSV with a header row and maps configured column names onto
//! [`IncidentRow`] / [`StationRow`]. Column defaults match the Chicago data
//! portal exports (`Crimes - 2001 to Present` and `Police Stations`).
//! Unparseable numbers and flags become `None` so that the loader, not the
//! parser, decides whether the row is usable.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

use crime_districts_dataset_models::{IncidentRow, StationRow};
use serde::{Deserialize, Serialize};

use super::{ProviderError, RowIter, RowProvider};

/// Where the CSV text comes from.
#[derive(Debug, Clone)]
pub enum CsvSource {
    /// A file on disk, opened afresh for every pass.
    Path(PathBuf),
    /// CSV text held in memory.
    Inline(String),
}

impl CsvSource {
    fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Inline(text) => format!("<inline csv, {} bytes>", text.len()),
        }
    }

    fn open(&self, delimiter: u8) -> Result<csv::Reader<Box<dyn Read + '_>>, ProviderError> {
        let reader: Box<dyn Read + '_> = match self {
            Self::Path(path) => Box::new(std::io::BufReader::new(std::fs::File::open(path)?)),
            Self::Inline(text) => Box::new(text.as_bytes()),
        };

        Ok(csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(reader))
    }
}

/// Column names for incident exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentColumns {
    /// Case number column.
    pub case_number: String,
    /// District column. Optional in the file.
    pub region_id: String,
    /// Primary type column.
    pub category: String,
    /// Description column.
    pub description: String,
    /// Arrest flag column. Optional in the file.
    pub arrest: String,
    /// Location description column. Optional in the file.
    pub location_description: String,
    /// Block address column. Optional in the file.
    pub block: String,
    /// Latitude column.
    pub latitude: String,
    /// Longitude column.
    pub longitude: String,
}

impl Default for IncidentColumns {
    fn default() -> Self {
        Self {
            case_number: "Case Number".to_string(),
            region_id: "District".to_string(),
            category: "Primary Type".to_string(),
            description: "Description".to_string(),
            arrest: "Arrest".to_string(),
            location_description: "Location Description".to_string(),
            block: "Block".to_string(),
            latitude: "Latitude".to_string(),
            longitude: "Longitude".to_string(),
        }
    }
}

/// Column names for station exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationColumns {
    /// District column.
    pub region_id: String,
    /// Station name column. Optional in the file.
    pub name: String,
    /// Latitude column.
    pub latitude: String,
    /// Longitude column.
    pub longitude: String,
}

impl Default for StationColumns {
    fn default() -> Self {
        Self {
            region_id: "DISTRICT".to_string(),
            name: "DISTRICT NAME".to_string(),
            latitude: "LATITUDE".to_string(),
            longitude: "LONGITUDE".to_string(),
        }
    }
}

/// Header name to column position.
struct HeaderIndex(BTreeMap<String, usize>);

impl HeaderIndex {
    fn read<R: Read>(reader: &mut csv::Reader<R>) -> Result<Self, ProviderError> {
        let positions = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_owned(), i))
            .collect();
        Ok(Self(positions))
    }

    fn required(&self, column: &str) -> Result<usize, ProviderError> {
        self.0
            .get(column)
            .copied()
            .ok_or_else(|| ProviderError::MissingColumn {
                column: column.to_string(),
            })
    }

    fn optional(&self, column: &str) -> Option<usize> {
        self.0.get(column).copied()
    }
}

fn text(record: &csv::StringRecord, position: Option<usize>) -> Option<String> {
    position
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

fn number(record: &csv::StringRecord, position: usize) -> Option<f64> {
    record.get(position).and_then(|s| s.trim().parse().ok())
}

/// Parses the flag spellings seen in open-data exports.
fn flag(record: &csv::StringRecord, position: Option<usize>) -> Option<bool> {
    let value = text(record, position)?;
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "y" | "yes" | "1" => Some(true),
        "false" | "f" | "n" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Reads incidents from a CSV export.
#[derive(Debug, Clone)]
pub struct CsvIncidentProvider {
    source: CsvSource,
    columns: IncidentColumns,
    delimiter: u8,
    name: String,
}

impl CsvIncidentProvider {
    /// Creates a provider with the default Chicago column names.
    #[must_use]
    pub fn new(source: CsvSource) -> Self {
        let name = source.describe();
        Self {
            source,
            columns: IncidentColumns::default(),
            delimiter: b',',
            name,
        }
    }

    /// Overrides the column names.
    #[must_use]
    pub fn with_columns(mut self, columns: IncidentColumns) -> Self {
        self.columns = columns;
        self
    }

    /// Sets the field delimiter (e.g. `b'\t'` for TSV files).
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl RowProvider<IncidentRow> for CsvIncidentProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn rows(&self) -> Result<RowIter<'_, IncidentRow>, ProviderError> {
        let mut reader = self.source.open(self.delimiter)?;
        let headers = HeaderIndex::read(&mut reader)?;
        let cols = &self.columns;

        let case_number = headers.required(&cols.case_number)?;
        let category = headers.required(&cols.category)?;
        let description = headers.required(&cols.description)?;
        let latitude = headers.required(&cols.latitude)?;
        let longitude = headers.required(&cols.longitude)?;
        let region_id = headers.optional(&cols.region_id);
        let arrest = headers.optional(&cols.arrest);
        let location_description = headers.optional(&cols.location_description);
        let block = headers.optional(&cols.block);

        let rows = reader.into_records().map(move |result| -> Result<_, ProviderError> {
            let record = result?;
            Ok(IncidentRow {
                case_number: text(&record, Some(case_number)).unwrap_or_default(),
                region_id: text(&record, region_id),
                category: text(&record, Some(category)).unwrap_or_default(),
                description: text(&record, Some(description)).unwrap_or_default(),
                arrest: flag(&record, arrest),
                location_description: text(&record, location_description),
                block: text(&record, block),
                latitude: number(&record, latitude),
                longitude: number(&record, longitude),
            })
        });

        Ok(Box::new(rows))
    }
}

/// Reads police stations from a CSV export.
#[derive(Debug, Clone)]
pub struct CsvStationProvider {
    source: CsvSource,
    columns: StationColumns,
    delimiter: u8,
    name: String,
}

impl CsvStationProvider {
    /// Creates a provider with the default Chicago column names.
    #[must_use]
    pub fn new(source: CsvSource) -> Self {
        let name = source.describe();
        Self {
            source,
            columns: StationColumns::default(),
            delimiter: b',',
            name,
        }
    }

    /// Overrides the column names.
    #[must_use]
    pub fn with_columns(mut self, columns: StationColumns) -> Self {
        self.columns = columns;
        self
    }
}

impl RowProvider<StationRow> for CsvStationProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn rows(&self) -> Result<RowIter<'_, StationRow>, ProviderError> {
        let mut reader = self.source.open(self.delimiter)?;
        let headers = HeaderIndex::read(&mut reader)?;
        let cols = &self.columns;

        let region_id = headers.required(&cols.region_id)?;
        let latitude = headers.required(&cols.latitude)?;
        let longitude = headers.required(&cols.longitude)?;
        let name = headers.optional(&cols.name);

        let rows = reader.into_records().map(move |result| -> Result<_, ProviderError> {
            let record = result?;
            Ok(StationRow {
                region_id: text(&record, Some(region_id)).unwrap_or_default(),
                name: text(&record, name),
                latitude: number(&record, latitude),
                longitude: number(&record, longitude),
            })
        });

        Ok(Box::new(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRIMES: &str = "\
Case Number,Block,Primary Type,Description,Location Description,Arrest,District,Latitude,Longitude
JB100001,039XX W MADISON ST,WEAPONS VIOLATION,UNLAWFUL POSS OF HANDGUN,STREET,true,011,41.8809,-87.7236
JB100002,001XX N STATE ST,THEFT,$500 AND UNDER,RESIDENCE,false,001,41.8834,-87.6278
JB100003,,BATTERY,SIMPLE,,N,,not-a-number,-87.6
";

    fn collect(provider: &CsvIncidentProvider) -> Vec<IncidentRow> {
        provider
            .rows()
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn maps_default_chicago_columns() {
        let provider = CsvIncidentProvider::new(CsvSource::Inline(CRIMES.to_string()));
        let rows = collect(&provider);
        assert_eq!(rows.len(), 3);

        let first = &rows[0];
        assert_eq!(first.case_number, "JB100001");
        assert_eq!(first.region_id.as_deref(), Some("011"));
        assert_eq!(first.description, "UNLAWFUL POSS OF HANDGUN");
        assert_eq!(first.arrest, Some(true));
        assert_eq!(first.block.as_deref(), Some("039XX W MADISON ST"));
        assert_eq!(first.latitude, Some(41.8809));
    }

    #[test]
    fn blanks_and_garbage_become_none() {
        let provider = CsvIncidentProvider::new(CsvSource::Inline(CRIMES.to_string()));
        let rows = collect(&provider);
        let third = &rows[2];
        assert!(third.region_id.is_none());
        assert!(third.block.is_none());
        assert!(third.location_description.is_none());
        assert_eq!(third.arrest, Some(false));
        assert!(third.latitude.is_none());
        assert_eq!(third.longitude, Some(-87.6));
    }

    #[test]
    fn every_pass_starts_from_the_first_row() {
        let provider = CsvIncidentProvider::new(CsvSource::Inline(CRIMES.to_string()));
        assert_eq!(collect(&provider).len(), collect(&provider).len());
    }

    #[test]
    fn missing_required_column_is_reported() {
        let text = "Case Number,Primary Type,Description,Latitude\nJB1,THEFT,X,41.0\n";
        let provider = CsvIncidentProvider::new(CsvSource::Inline(text.to_string()));
        let Err(err) = provider.rows() else {
            panic!("expected missing column error");
        };
        assert!(
            matches!(err, ProviderError::MissingColumn { ref column } if column == "Longitude"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn custom_columns_and_delimiter() {
        let text = "case\tdist\ttype\tdesc\tlat\tlon\nX1\t7\tROBBERY\tARMED: HANDGUN\t41.77\t-87.65\n";
        let columns = IncidentColumns {
            case_number: "case".to_string(),
            region_id: "dist".to_string(),
            category: "type".to_string(),
            description: "desc".to_string(),
            latitude: "lat".to_string(),
            longitude: "lon".to_string(),
            ..IncidentColumns::default()
        };
        let provider = CsvIncidentProvider::new(CsvSource::Inline(text.to_string()))
            .with_columns(columns)
            .with_delimiter(b'\t');
        let rows = collect(&provider);
        assert_eq!(rows[0].region_id.as_deref(), Some("7"));
        assert!(rows[0].arrest.is_none());
    }

    #[test]
    fn reads_station_export() {
        let text = "\
DISTRICT,DISTRICT NAME,ADDRESS,LATITUDE,LONGITUDE
Headquarters,Headquarters,3510 S Michigan Ave,41.8307,-87.6233
11,Harrison,3151 W Harrison St,41.8737,-87.7052
";
        let provider = CsvStationProvider::new(CsvSource::Inline(text.to_string()));
        let rows: Vec<StationRow> = provider
            .rows()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].region_id, "11");
        assert_eq!(rows[1].name.as_deref(), Some("Harrison"));
        assert_eq!(rows[1].longitude, Some(-87.7052));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let provider =
            CsvIncidentProvider::new(CsvSource::Path(PathBuf::from("/nonexistent/crimes.csv")));
        assert!(matches!(provider.rows(), Err(ProviderError::Io(_))));
    }
}
