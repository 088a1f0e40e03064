//! The in-memory incident dataset.
//!
//! Incidents are loaded once through a [`RowProvider`], validated, and kept
//! in provider order. A per-district position list makes
//! [`PointDataset::points_in`] a lazy walk over that district's incidents
//! without copying.

use std::collections::{BTreeMap, BTreeSet};

use crime_districts_dataset_models::{
    Coordinate, Incident, IncidentAttribute, IncidentFilter, IncidentRow, SkipReason,
    SkippedRecords,
};
use crime_districts_region_models::{RegionLocator, normalize_region_id};
use crime_districts_retry::RetryPolicy;

use crate::DatasetError;
use crate::providers::{ProviderError, RowProvider};

/// Knobs for [`PointDataset::load_with`].
#[derive(Clone, Copy, Default)]
pub struct LoadOptions<'a> {
    /// Retry policy for provider failures.
    pub retry: RetryPolicy,
    /// Assigns a district to rows that carry coordinates but no district.
    pub locator: Option<&'a dyn RegionLocator>,
}

/// Validated incidents grouped by district.
#[derive(Debug, Clone, Default)]
pub struct PointDataset {
    incidents: Vec<Incident>,
    by_region: BTreeMap<String, Vec<usize>>,
    skipped: SkippedRecords,
}

impl PointDataset {
    /// Loads every row that passes `filter`, in a single attempt.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::LoadFailure`] if the provider fails. Invalid
    /// individual rows are skipped and counted, not reported as errors.
    pub fn load(
        provider: &dyn RowProvider<IncidentRow>,
        filter: &IncidentFilter,
    ) -> Result<Self, DatasetError> {
        Self::load_with(
            provider,
            filter,
            &LoadOptions {
                retry: RetryPolicy::once(),
                locator: None,
            },
        )
    }

    /// Loads every row that passes `filter`, retrying transient provider
    /// failures per `options.retry`.
    ///
    /// Each attempt starts a fresh pass over the provider and discards
    /// whatever the failed attempt had accumulated.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::LoadFailure`] once the retry budget is spent
    /// or the provider fails permanently.
    pub fn load_with(
        provider: &dyn RowProvider<IncidentRow>,
        filter: &IncidentFilter,
        options: &LoadOptions<'_>,
    ) -> Result<Self, DatasetError> {
        let label = format!("incidents from {}", provider.name());

        let dataset = crime_districts_retry::run(&options.retry, &label, |_| {
            Self::load_attempt(provider, filter, options.locator)
        })
        .map_err(|e| DatasetError::LoadFailure {
            label: label.clone(),
            attempts: e.attempts,
            source: e.last,
        })?;

        let skipped = dataset.skipped;
        log::info!(
            "{label}: loaded {} incidents in {} districts ({} filtered out)",
            dataset.len(),
            dataset.by_region.len(),
            skipped.filtered,
        );
        if skipped.rejected() > 0 {
            log::warn!(
                "{label}: dropped {} rows (invalid coordinate: {}, missing district: {}, \
                 duplicate case: {}, malformed: {})",
                skipped.rejected(),
                skipped.invalid_coordinate,
                skipped.missing_region,
                skipped.duplicate_case,
                skipped.malformed,
            );
        }

        Ok(dataset)
    }

    fn load_attempt(
        provider: &dyn RowProvider<IncidentRow>,
        filter: &IncidentFilter,
        locator: Option<&dyn RegionLocator>,
    ) -> Result<Self, ProviderError> {
        let mut builder = Builder::default();

        for item in provider.rows()? {
            match item {
                Ok(row) => builder.push(row, filter, locator),
                Err(e) if e.is_row_level() => {
                    log::debug!("Skipping undecodable row: {e}");
                    builder.skipped.record(SkipReason::Malformed);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(builder.finish())
    }

    /// Number of loaded incidents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    /// Whether no incidents were loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    /// Rows dropped during the load, by reason.
    #[must_use]
    pub const fn skipped(&self) -> &SkippedRecords {
        &self.skipped
    }

    /// All incidents in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Incident> {
        self.incidents.iter()
    }

    /// Districts that have at least one incident, in identifier order.
    pub fn region_ids(&self) -> impl Iterator<Item = &str> {
        self.by_region.keys().map(String::as_str)
    }

    /// The incidents of one district, in load order.
    ///
    /// Lazy and restartable: every call returns a new iterator. Padded
    /// identifiers such as `"011"` find district `"11"`; unknown districts
    /// yield nothing.
    pub fn points_in<'a>(&'a self, region_id: &str) -> impl Iterator<Item = &'a Incident> + use<'a> {
        self.by_region
            .get(region_id)
            .or_else(|| self.by_region.get(&normalize_region_id(region_id)?))
            .into_iter()
            .flatten()
            .filter_map(|&i| self.incidents.get(i))
    }

    /// Counts a district's incidents by the value of `attribute`.
    ///
    /// Incidents with no value for the attribute are not counted.
    #[must_use]
    pub fn group_by(&self, region_id: &str, attribute: IncidentAttribute) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for incident in self.points_in(region_id) {
            if let Some(value) = incident.attribute(attribute) {
                *counts.entry(value.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[derive(Default)]
struct Builder {
    incidents: Vec<Incident>,
    by_region: BTreeMap<String, Vec<usize>>,
    seen_cases: BTreeSet<String>,
    skipped: SkippedRecords,
}

impl Builder {
    fn push(
        &mut self,
        row: IncidentRow,
        filter: &IncidentFilter,
        locator: Option<&dyn RegionLocator>,
    ) {
        if !filter.matches(&row) {
            self.skipped.record(SkipReason::Filtered);
            return;
        }

        let case_number = row.case_number.trim();
        if case_number.is_empty() {
            log::debug!("Dropping row without a case number");
            self.skipped.record(SkipReason::Malformed);
            return;
        }

        let coordinate = match Coordinate::from_parts(row.latitude, row.longitude) {
            Ok(coordinate) => coordinate,
            Err(e) => {
                log::debug!("Dropping case {case_number}: {e}");
                self.skipped.record(SkipReason::InvalidCoordinate);
                return;
            }
        };

        let region_id = row
            .region_id
            .as_deref()
            .and_then(normalize_region_id)
            .or_else(|| {
                locator
                    .and_then(|l| l.locate(coordinate.longitude, coordinate.latitude))
                    .map(ToString::to_string)
            });
        let Some(region_id) = region_id else {
            log::debug!("Dropping case {case_number}: no district");
            self.skipped.record(SkipReason::MissingRegion);
            return;
        };

        // First accepted row for a case number wins.
        if !self.seen_cases.insert(case_number.to_string()) {
            log::debug!("Dropping repeated case {case_number}");
            self.skipped.record(SkipReason::DuplicateCase);
            return;
        }

        let position = self.incidents.len();
        self.by_region
            .entry(region_id.clone())
            .or_default()
            .push(position);
        self.incidents.push(Incident {
            case_number: case_number.to_string(),
            region_id,
            coordinate,
            category: row.category,
            description: row.description,
            arrest: row.arrest.unwrap_or(false),
            location_description: row.location_description,
            block: row.block,
        });
    }

    fn finish(self) -> PointDataset {
        PointDataset {
            incidents: self.incidents,
            by_region: self.by_region,
            skipped: self.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::providers::{MemoryProvider, RowIter};

    fn row(case: &str, district: &str, description: &str, lat: f64, lon: f64) -> IncidentRow {
        IncidentRow {
            case_number: case.to_string(),
            region_id: Some(district.to_string()),
            category: "WEAPONS VIOLATION".to_string(),
            description: description.to_string(),
            arrest: Some(false),
            location_description: Some("STREET".to_string()),
            block: Some("001XX W MADISON ST".to_string()),
            latitude: Some(lat),
            longitude: Some(lon),
        }
    }

    fn sample() -> Vec<IncidentRow> {
        vec![
            row("A1", "011", "UNLAWFUL POSS OF HANDGUN", 41.88, -87.72),
            row("A2", "11", "RECKLESS FIREARM DISCHARGE", 41.87, -87.71),
            row("A3", "001", "UNLAWFUL POSS OF HANDGUN", 41.88, -87.63),
            row("A4", "011", "ARMED: HANDGUN", 200.0, -87.72),
            row("A5", "011", "$500 AND UNDER", 41.88, -87.72),
        ]
    }

    #[test]
    fn invalid_coordinate_rows_are_dropped_and_counted() {
        let provider = MemoryProvider::new("sample", sample());
        let dataset = PointDataset::load(&provider, &IncidentFilter::All).unwrap();

        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.skipped().invalid_coordinate, 1);
        assert!(dataset.iter().all(|i| i.case_number != "A4"));
        assert_eq!(dataset.points_in("11").count(), 3);
    }

    #[test]
    fn filter_runs_before_coordinate_validation() {
        let provider = MemoryProvider::new("sample", sample());
        let gun = IncidentFilter::description_contains("HANDGUN");
        let dataset = PointDataset::load(&provider, &gun).unwrap();

        // A4 passes the filter, so its bad latitude is counted.
        assert_eq!(dataset.skipped().invalid_coordinate, 1);
        assert_eq!(dataset.skipped().filtered, 2);
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn padded_district_ids_are_normalized() {
        let provider = MemoryProvider::new("sample", sample());
        let dataset = PointDataset::load(&provider, &IncidentFilter::All).unwrap();
        let ids: Vec<&str> = dataset.region_ids().collect();
        assert_eq!(ids, vec!["1", "11"]);
        assert_eq!(dataset.points_in("011").count(), dataset.points_in("11").count());
        assert_eq!(dataset.points_in(" 0011 ").count(), 3);
    }

    #[test]
    fn points_in_is_restartable_and_ordered() {
        let provider = MemoryProvider::new("sample", sample());
        let dataset = PointDataset::load(&provider, &IncidentFilter::All).unwrap();

        let first: Vec<&str> = dataset.points_in("11").map(|i| i.case_number.as_str()).collect();
        let second: Vec<&str> = dataset.points_in("11").map(|i| i.case_number.as_str()).collect();
        assert_eq!(first, vec!["A1", "A2", "A5"]);
        assert_eq!(first, second);
        assert_eq!(dataset.points_in("99").count(), 0);
    }

    #[test]
    fn group_by_counts_values_and_skips_missing() {
        let mut rows = sample();
        rows[1].location_description = None;
        let provider = MemoryProvider::new("sample", rows);
        let dataset = PointDataset::load(&provider, &IncidentFilter::All).unwrap();

        let by_description = dataset.group_by("11", IncidentAttribute::Description);
        assert_eq!(by_description.get("UNLAWFUL POSS OF HANDGUN"), Some(&1));
        assert_eq!(by_description.values().sum::<u64>(), 3);

        let by_location = dataset.group_by("11", IncidentAttribute::LocationDescription);
        assert_eq!(by_location.get("STREET"), Some(&2));
    }

    #[test]
    fn duplicate_case_numbers_keep_first_row() {
        let mut rows = sample();
        rows.push(row("A1", "001", "ARMED: HANDGUN", 41.88, -87.63));
        let provider = MemoryProvider::new("sample", rows);
        let dataset = PointDataset::load(&provider, &IncidentFilter::All).unwrap();

        assert_eq!(dataset.skipped().duplicate_case, 1);
        let a1: Vec<&Incident> = dataset.iter().filter(|i| i.case_number == "A1").collect();
        assert_eq!(a1.len(), 1);
        assert_eq!(a1[0].region_id, "11");
    }

    struct FixedLocator;

    impl RegionLocator for FixedLocator {
        fn locate(&self, longitude: f64, _latitude: f64) -> Option<&str> {
            (longitude < -87.7).then_some("11")
        }
    }

    #[test]
    fn rows_without_district_use_locator_or_are_dropped() {
        let mut rows = sample();
        rows[0].region_id = None;
        rows[2].region_id = Some("  ".to_string());
        let provider = MemoryProvider::new("sample", rows);

        let without = PointDataset::load(&provider, &IncidentFilter::All).unwrap();
        assert_eq!(without.skipped().missing_region, 2);

        let locator = FixedLocator;
        let options = LoadOptions {
            retry: RetryPolicy::once(),
            locator: Some(&locator),
        };
        let with = PointDataset::load_with(&provider, &IncidentFilter::All, &options).unwrap();
        // A1 is west of -87.7 and gets located; A3 is not.
        assert_eq!(with.skipped().missing_region, 1);
        assert_eq!(with.points_in("11").count(), 3);
    }

    /// Fails with a transient error for the first `failures` passes.
    struct FlakyProvider {
        inner: MemoryProvider<IncidentRow>,
        failures: Cell<u32>,
    }

    impl RowProvider<IncidentRow> for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn rows(&self) -> Result<RowIter<'_, IncidentRow>, ProviderError> {
            let remaining = self.failures.get();
            if remaining == 0 {
                return self.inner.rows();
            }
            self.failures.set(remaining - 1);
            // Fail midway so a partial pass has to be discarded.
            let partial = self.inner.rows()?.take(2);
            let failure = std::iter::once(Err(ProviderError::Transient {
                message: "connection reset".to_string(),
            }));
            Ok(Box::new(partial.chain(failure)))
        }
    }

    #[test]
    fn transient_failures_are_retried_from_scratch() {
        let provider = FlakyProvider {
            inner: MemoryProvider::new("sample", sample()),
            failures: Cell::new(2),
        };
        let options = LoadOptions {
            retry: RetryPolicy::immediate(3),
            locator: None,
        };
        let dataset = PointDataset::load_with(&provider, &IncidentFilter::All, &options).unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.skipped().duplicate_case, 0);
    }

    #[test]
    fn exhausted_retries_surface_load_failure() {
        let provider = FlakyProvider {
            inner: MemoryProvider::new("sample", sample()),
            failures: Cell::new(5),
        };
        let options = LoadOptions {
            retry: RetryPolicy::immediate(3),
            locator: None,
        };
        let err = PointDataset::load_with(&provider, &IncidentFilter::All, &options).unwrap_err();
        assert!(
            matches!(err, DatasetError::LoadFailure { attempts: 3, .. }),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn row_level_errors_are_skipped_not_fatal() {
        struct OneBadRow(MemoryProvider<IncidentRow>);

        impl RowProvider<IncidentRow> for OneBadRow {
            fn name(&self) -> &str {
                "one-bad-row"
            }

            fn rows(&self) -> Result<RowIter<'_, IncidentRow>, ProviderError> {
                let bad = std::iter::once(Err(ProviderError::Row {
                    message: "garbled".to_string(),
                }));
                Ok(Box::new(bad.chain(self.0.rows()?)))
            }
        }

        let provider = OneBadRow(MemoryProvider::new("sample", sample()));
        let dataset = PointDataset::load(&provider, &IncidentFilter::All).unwrap();
        assert_eq!(dataset.skipped().malformed, 1);
        assert_eq!(dataset.len(), 4);
    }
}
