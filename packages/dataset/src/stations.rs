//! District reference locations (police stations).

use std::collections::BTreeMap;

use crime_districts_dataset_models::{
    Coordinate, ReferenceLocation, SkipReason, SkippedRecords, StationRow,
};
use crime_districts_region_models::normalize_region_id;
use crime_districts_retry::RetryPolicy;

use crate::DatasetError;
use crate::providers::{ProviderError, RowProvider};

/// Station identifiers that do not belong to a district.
pub const DEFAULT_EXCLUDED_STATIONS: &[&str] = &["Headquarters"];

/// One reference location per district.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLocations {
    by_region: BTreeMap<String, ReferenceLocation>,
    skipped: SkippedRecords,
}

impl ReferenceLocations {
    /// Loads stations, dropping rows whose identifier is in `exclude`.
    ///
    /// Excluded rows count as filtered. Rows with a bad coordinate or an
    /// empty identifier are dropped and counted.
    ///
    /// # Errors
    ///
    /// * [`DatasetError::LoadFailure`] if the provider fails after retries
    /// * [`DatasetError::DuplicateReference`] if two stations claim the same
    ///   district
    pub fn load(
        provider: &dyn RowProvider<StationRow>,
        exclude: &[String],
        retry: &RetryPolicy,
    ) -> Result<Self, DatasetError> {
        let label = format!("stations from {}", provider.name());

        let rows = crime_districts_retry::run(retry, &label, |_| {
            provider.rows()?.collect::<Result<Vec<StationRow>, ProviderError>>()
        })
        .map_err(|e| DatasetError::LoadFailure {
            label: label.clone(),
            attempts: e.attempts,
            source: e.last,
        })?;

        let locations = Self::from_rows(rows, exclude)?;
        log::info!(
            "{label}: loaded {} reference locations ({} excluded, {} invalid)",
            locations.len(),
            locations.skipped.filtered,
            locations.skipped.rejected(),
        );
        Ok(locations)
    }

    /// Builds the table from already-read rows.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::DuplicateReference`] if two stations claim
    /// the same district.
    pub fn from_rows(
        rows: impl IntoIterator<Item = StationRow>,
        exclude: &[String],
    ) -> Result<Self, DatasetError> {
        let mut locations = Self::default();

        for row in rows {
            let raw_id = row.region_id.trim();
            if exclude.iter().any(|x| x.trim() == raw_id) {
                locations.skipped.record(SkipReason::Filtered);
                continue;
            }

            let Some(region_id) = normalize_region_id(raw_id) else {
                locations.skipped.record(SkipReason::MissingRegion);
                continue;
            };

            let coordinate = match Coordinate::from_parts(row.latitude, row.longitude) {
                Ok(c) => c,
                Err(e) => {
                    log::warn!("Dropping station for district {region_id}: {e}");
                    locations.skipped.record(SkipReason::InvalidCoordinate);
                    continue;
                }
            };

            if locations.by_region.contains_key(&region_id) {
                return Err(DatasetError::DuplicateReference { region_id });
            }

            locations.by_region.insert(
                region_id.clone(),
                ReferenceLocation {
                    region_id,
                    name: row.name,
                    coordinate,
                },
            );
        }

        Ok(locations)
    }

    /// The reference location of a district.
    #[must_use]
    pub fn get(&self, region_id: &str) -> Option<&ReferenceLocation> {
        self.by_region.get(region_id)
    }

    /// All reference locations in district order.
    pub fn iter(&self) -> impl Iterator<Item = &ReferenceLocation> {
        self.by_region.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_region.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_region.is_empty()
    }

    /// Rows dropped during the load, by reason.
    #[must_use]
    pub const fn skipped(&self) -> &SkippedRecords {
        &self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MemoryProvider;

    fn station(id: &str, lat: Option<f64>, lon: Option<f64>) -> StationRow {
        StationRow {
            region_id: id.to_string(),
            name: Some(format!("District {id}")),
            latitude: lat,
            longitude: lon,
        }
    }

    fn excluded() -> Vec<String> {
        DEFAULT_EXCLUDED_STATIONS
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn headquarters_is_excluded() {
        let provider = MemoryProvider::new(
            "stations",
            vec![
                station("Headquarters", Some(41.83), Some(-87.62)),
                station("1", Some(41.858), Some(-87.627)),
                station("011", Some(41.873), Some(-87.705)),
            ],
        );
        let locations =
            ReferenceLocations::load(&provider, &excluded(), &RetryPolicy::once()).unwrap();

        assert_eq!(locations.len(), 2);
        assert!(locations.get("Headquarters").is_none());
        assert!(locations.get("11").is_some());
        assert_eq!(locations.skipped().filtered, 1);
    }

    #[test]
    fn invalid_station_coordinates_are_dropped() {
        let locations = ReferenceLocations::from_rows(
            vec![
                station("1", Some(41.858), Some(-87.627)),
                station("2", None, Some(-87.61)),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations.skipped().invalid_coordinate, 1);
    }

    #[test]
    fn second_station_for_a_district_is_an_error() {
        let err = ReferenceLocations::from_rows(
            vec![
                station("7", Some(41.78), Some(-87.66)),
                station("07", Some(41.79), Some(-87.65)),
            ],
            &[],
        )
        .unwrap_err();
        assert!(
            matches!(err, DatasetError::DuplicateReference { ref region_id } if region_id == "7")
        );
    }

    #[test]
    fn iteration_is_in_district_order() {
        let locations = ReferenceLocations::from_rows(
            vec![
                station("12", Some(41.86), Some(-87.66)),
                station("3", Some(41.77), Some(-87.6)),
            ],
            &[],
        )
        .unwrap();
        let ids: Vec<&str> = locations.iter().map(|l| l.region_id.as_str()).collect();
        assert_eq!(ids, vec!["12", "3"]);
    }
}
