//! `DuckDB` row provider for incident tables.
//!
//! Runs a single `SELECT` against a `DuckDB` file. The query must return
//! columns in this order: case number, district, primary type,
//! description, arrest, location description, block, latitude, longitude.
//!
//! Integer district columns are read as their decimal text, and text
//! coordinate columns are parsed. A value that cannot be converted fails
//! only its own row.

use std::path::PathBuf;

use crime_districts_dataset_models::IncidentRow;
use duckdb::types::{Type, ValueRef};
use duckdb::{Connection, Row};

use super::{ProviderError, RowIter, RowProvider};

/// Default query against a `crimes` table shaped like the Chicago export.
pub const DEFAULT_INCIDENT_QUERY: &str = "SELECT case_number, district, primary_type, \
     description, arrest, location_description, block, latitude, longitude \
     FROM crimes";

/// Reads incidents from a `DuckDB` database file.
#[derive(Debug, Clone)]
pub struct DuckDbIncidentProvider {
    path: PathBuf,
    query: String,
    name: String,
}

impl DuckDbIncidentProvider {
    /// Creates a provider that runs [`DEFAULT_INCIDENT_QUERY`].
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        let name = format!("duckdb {}", path.display());
        Self {
            path,
            query: DEFAULT_INCIDENT_QUERY.to_string(),
            name,
        }
    }

    /// Replaces the query. Column order must match the module docs.
    #[must_use]
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = query.to_string();
        self
    }
}

impl RowProvider<IncidentRow> for DuckDbIncidentProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn rows(&self) -> Result<RowIter<'_, IncidentRow>, ProviderError> {
        let conn = Connection::open(&self.path)?;
        let mut stmt = conn.prepare(&self.query)?;

        // The statement borrows the connection, so rows are materialized
        // before both are dropped.
        let rows: Vec<Result<IncidentRow, ProviderError>> = stmt
            .query_map([], |row| {
                Ok(IncidentRow {
                    case_number: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    region_id: region_id(row, 1)?,
                    category: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    description: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    arrest: row.get(4)?,
                    location_description: row.get(5)?,
                    block: row.get(6)?,
                    latitude: degrees(row, 7)?,
                    longitude: degrees(row, 8)?,
                })
            })?
            .map(|r| r.map_err(ProviderError::from))
            .collect();

        log::debug!("{}: fetched {} rows", self.name, rows.len());

        Ok(Box::new(rows.into_iter()))
    }
}

fn conversion_failure(idx: usize, data_type: Type, message: String) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(idx, data_type, message.into())
}

/// District identifier from a text or integer column.
fn region_id(row: &Row<'_>, idx: usize) -> duckdb::Result<Option<String>> {
    let id = match row.get_ref(idx)? {
        ValueRef::Null => return Ok(None),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::TinyInt(v) => v.to_string(),
        ValueRef::SmallInt(v) => v.to_string(),
        ValueRef::Int(v) => v.to_string(),
        ValueRef::BigInt(v) => v.to_string(),
        ValueRef::HugeInt(v) => v.to_string(),
        ValueRef::UTinyInt(v) => v.to_string(),
        ValueRef::USmallInt(v) => v.to_string(),
        ValueRef::UInt(v) => v.to_string(),
        ValueRef::UBigInt(v) => v.to_string(),
        other => {
            let data_type = other.data_type();
            return Err(conversion_failure(
                idx,
                data_type.clone(),
                format!("unsupported district type {data_type:?}"),
            ));
        }
    };
    Ok(Some(id))
}

/// Latitude or longitude from a floating-point, small integer, or text
/// column.
fn degrees(row: &Row<'_>, idx: usize) -> duckdb::Result<Option<f64>> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        ValueRef::Double(v) => Ok(Some(v)),
        ValueRef::Float(v) => Ok(Some(f64::from(v))),
        ValueRef::TinyInt(v) => Ok(Some(f64::from(v))),
        ValueRef::SmallInt(v) => Ok(Some(f64::from(v))),
        ValueRef::Int(v) => Ok(Some(f64::from(v))),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse().map(Some).map_err(|e| {
                conversion_failure(idx, Type::Text, format!("'{text}' is not a number: {e}"))
            })
        }
        other => {
            let data_type = other.data_type();
            Err(conversion_failure(
                idx,
                data_type.clone(),
                format!("unsupported coordinate type {data_type:?}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use crime_districts_dataset_models::IncidentFilter;

    use super::*;
    use crate::PointDataset;

    fn temp_db(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "crime_districts_duckdb_{name}_{}.duckdb",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn bad_rows_are_skipped_and_integer_districts_are_read() {
        let path = temp_db("rows");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE crimes (
                case_number VARCHAR, district INTEGER, primary_type VARCHAR,
                description VARCHAR, arrest BOOLEAN, location_description VARCHAR,
                block VARCHAR, latitude VARCHAR, longitude DOUBLE
            );
            INSERT INTO crimes VALUES
                ('J1', 11, 'WEAPONS VIOLATION', 'UNLAWFUL POSS OF HANDGUN', true,
                 'STREET', '039XX W MADISON ST', '41.88', -87.72),
                ('J2', 11, 'ROBBERY', 'ARMED: HANDGUN', false,
                 'SIDEWALK', '040XX W MADISON ST', 'north', -87.71),
                ('J3', NULL, 'THEFT', '$500 AND UNDER', NULL,
                 NULL, NULL, '41.86', -87.70),
                ('J4', 1, 'THEFT', 'OVER $500', false,
                 'RESIDENCE', NULL, ' 41.87 ', -87.63);",
        )
        .unwrap();
        drop(conn);

        let provider = DuckDbIncidentProvider::new(path.clone());
        let dataset = PointDataset::load(&provider, &IncidentFilter::All).unwrap();
        std::fs::remove_file(&path).ok();

        let ids: Vec<&str> = dataset.region_ids().collect();
        assert_eq!(ids, vec!["1", "11"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.skipped().malformed, 1);
        assert_eq!(dataset.skipped().missing_region, 1);

        let j1 = dataset.points_in("11").next().unwrap();
        assert_eq!(j1.case_number, "J1");
        assert!(j1.arrest);
        assert!((j1.coordinate.latitude - 41.88).abs() < 1e-12);
    }

    #[test]
    fn conversion_errors_are_row_level() {
        let err = ProviderError::from(conversion_failure(7, Type::Text, "bad".to_string()));
        assert!(err.is_row_level());

        let err = ProviderError::from(duckdb::Error::InvalidColumnType(
            1,
            "district".to_string(),
            Type::Blob,
        ));
        assert!(err.is_row_level());
    }

    #[test]
    fn missing_table_fails_the_load() {
        let path = temp_db("empty");
        drop(Connection::open(&path).unwrap());

        let provider = DuckDbIncidentProvider::new(path.clone());
        let err = PointDataset::load(&provider, &IncidentFilter::All).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(
            matches!(err, crate::DatasetError::LoadFailure { attempts: 1, .. }),
            "unexpected error: {err}"
        );
    }
}
