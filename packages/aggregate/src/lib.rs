#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-district aggregation over a loaded incident dataset.
//!
//! [`AggregationEngine`] borrows a [`RegionIndex`] and a [`PointDataset`]
//! and answers every per-district question (counts, density, top values,
//! distance extremes) as a pure function over them. Nothing is cached;
//! repeating a call with the same arguments yields the same result.
//!
//! Every operation takes an [`IncidentFilter`] that is applied on top of
//! whatever filter the dataset was loaded with.

use std::collections::BTreeMap;

use crime_districts_aggregate_models::{
    ArrestBreakdown, AttributeCount, DensityRow, ExtremePoint, RegionCounts, RegionReport,
};
use crime_districts_dataset::{PointDataset, ReferenceLocations};
use crime_districts_dataset_models::{Coordinate, Incident, IncidentAttribute, IncidentFilter};
use crime_districts_region::RegionIndex;
use crime_districts_region_models::RegionSummary;
use geo::{Distance, Geodesic, Point};
use thiserror::Error;

/// Two distances closer than this (in metres) are treated as equal.
pub const DISTANCE_TOLERANCE_METRES: f64 = 1e-6;

/// Errors that can occur while aggregating one district.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// The district is not in the region index.
    #[error("Unknown district '{region_id}'")]
    UnknownRegion {
        /// The requested district.
        region_id: String,
    },

    /// Density was requested for a district with zero area.
    #[error("District '{region_id}' has zero area")]
    DivisionByZeroArea {
        /// The zero-area district.
        region_id: String,
    },

    /// No incidents in the district match the filter.
    #[error("No matching incidents in district '{region_id}'")]
    EmptyRegion {
        /// The empty district.
        region_id: String,
    },
}

/// Which end of the distance range to select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    Farthest,
    Nearest,
}

impl Extreme {
    /// Whether `candidate` strictly beats `best`. Near-equal distances keep
    /// the earlier point.
    fn improves(self, candidate: f64, best: f64) -> bool {
        match self {
            Self::Farthest => candidate > best + DISTANCE_TOLERANCE_METRES,
            Self::Nearest => candidate < best - DISTANCE_TOLERANCE_METRES,
        }
    }
}

/// Geodesic (WGS84) distance between two coordinates, in metres.
#[must_use]
pub fn geodesic_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    Geodesic.distance(
        Point::new(a.longitude, a.latitude),
        Point::new(b.longitude, b.latitude),
    )
}

#[allow(clippy::cast_precision_loss)]
fn per_hundred_hectares(count: u64, area_hectares: f64) -> f64 {
    count as f64 / (area_hectares / 100.0)
}

/// Answers per-district questions over borrowed, immutable data.
#[derive(Debug, Clone, Copy)]
pub struct AggregationEngine<'a> {
    regions: &'a RegionIndex,
    dataset: &'a PointDataset,
}

impl<'a> AggregationEngine<'a> {
    #[must_use]
    pub const fn new(regions: &'a RegionIndex, dataset: &'a PointDataset) -> Self {
        Self { regions, dataset }
    }

    #[must_use]
    pub const fn regions(&self) -> &'a RegionIndex {
        self.regions
    }

    #[must_use]
    pub const fn dataset(&self) -> &'a PointDataset {
        self.dataset
    }

    /// Resolves a district, accepting padded identifiers such as `"011"`.
    fn summary(&self, region_id: &str) -> Result<&'a RegionSummary, AggregateError> {
        self.regions
            .get(region_id)
            .ok_or_else(|| AggregateError::UnknownRegion {
                region_id: region_id.to_string(),
            })
    }

    /// Incidents of an indexed district that pass `filter`.
    fn matching<'f>(
        &self,
        region_id: &str,
        filter: &'f IncidentFilter,
    ) -> Result<impl Iterator<Item = &'a Incident> + use<'a, 'f>, AggregateError> {
        let region_id = self.summary(region_id)?.id.as_str();
        let dataset: &'a PointDataset = self.dataset;
        Ok(dataset
            .points_in(region_id)
            .filter(move |incident| filter.matches(*incident)))
    }

    /// Counts matching incidents for every district in one pass.
    ///
    /// Every indexed district appears in the result, with `0` if nothing
    /// matched. Incidents whose district is not indexed are tallied under
    /// [`RegionCounts::unknown_regions`] rather than failing the pass.
    #[must_use]
    pub fn count_by_region(&self, filter: &IncidentFilter) -> RegionCounts {
        let mut counts = RegionCounts {
            by_region: self.regions.regions().map(|r| (r.id.clone(), 0)).collect(),
            unknown_regions: BTreeMap::new(),
        };

        for incident in self.dataset.iter().filter(|i| filter.matches(*i)) {
            if let Some(count) = counts.by_region.get_mut(&incident.region_id) {
                *count += 1;
            } else {
                *counts
                    .unknown_regions
                    .entry(incident.region_id.clone())
                    .or_insert(0) += 1;
            }
        }

        if !counts.unknown_regions.is_empty() {
            log::warn!(
                "{} incidents reference districts missing from the boundary index: {:?}",
                counts.unknown_total(),
                counts.unknown_regions.keys().collect::<Vec<_>>(),
            );
        }

        counts
    }

    /// Matching incidents per 100 hectares of district area.
    ///
    /// # Errors
    ///
    /// * [`AggregateError::UnknownRegion`] if the district is not indexed
    /// * [`AggregateError::DivisionByZeroArea`] if its area is zero
    pub fn density(&self, region_id: &str, filter: &IncidentFilter) -> Result<f64, AggregateError> {
        let summary = self.summary(region_id)?;
        let area = summary.area_hectares;
        if area <= 0.0 {
            return Err(AggregateError::DivisionByZeroArea {
                region_id: summary.id.clone(),
            });
        }
        let count = self.matching(region_id, filter)?.count() as u64;
        Ok(per_hundred_hectares(count, area))
    }

    /// Density of every indexed district, ordered by district identifier.
    ///
    /// Zero-area districts are listed with no density instead of failing
    /// the table.
    #[must_use]
    pub fn density_table(&self, filter: &IncidentFilter) -> Vec<DensityRow> {
        let counts = self.count_by_region(filter);

        self.regions
            .regions()
            .map(|region| {
                let count = counts.get(&region.id);
                let density = (region.area_hectares > 0.0)
                    .then(|| per_hundred_hectares(count, region.area_hectares));
                if density.is_none() {
                    log::warn!("District {} has zero area, density undefined", region.id);
                }
                DensityRow {
                    region_id: region.id.clone(),
                    name: region.name.clone(),
                    count,
                    area_hectares: region.area_hectares,
                    density,
                    rounded_density: density.map(f64::round_ties_even),
                }
            })
            .collect()
    }

    /// The `k` most frequent values of `attribute` in a district.
    ///
    /// Sorted by descending count; equal counts are ordered by ascending
    /// value. Incidents without a value for the attribute are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnknownRegion`] if the district is not
    /// indexed.
    pub fn top_k_by_attribute(
        &self,
        region_id: &str,
        attribute: IncidentAttribute,
        k: usize,
        filter: &IncidentFilter,
    ) -> Result<Vec<AttributeCount>, AggregateError> {
        let incidents = self.matching(region_id, filter)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut tally: BTreeMap<&str, u64> = BTreeMap::new();
        for incident in incidents {
            if let Some(value) = incident.attribute(attribute) {
                *tally.entry(value).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<AttributeCount> = tally
            .into_iter()
            .map(|(value, count)| AttributeCount::new(value, count))
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        ranked.truncate(k);

        Ok(ranked)
    }

    /// The matching incident farthest from `reference`.
    ///
    /// Among incidents at the same distance the first one in load order is
    /// returned.
    ///
    /// # Errors
    ///
    /// * [`AggregateError::UnknownRegion`] if the district is not indexed
    /// * [`AggregateError::EmptyRegion`] if no incident matches
    pub fn farthest_point(
        &self,
        region_id: &str,
        reference: &Coordinate,
        filter: &IncidentFilter,
    ) -> Result<ExtremePoint, AggregateError> {
        self.extreme_point(region_id, reference, None, filter, Extreme::Farthest)
    }

    /// The matching incident nearest to `reference`.
    ///
    /// Among incidents at the same distance the first one in load order is
    /// returned.
    ///
    /// # Errors
    ///
    /// * [`AggregateError::UnknownRegion`] if the district is not indexed
    /// * [`AggregateError::EmptyRegion`] if no incident matches
    pub fn nearest_point(
        &self,
        region_id: &str,
        reference: &Coordinate,
        filter: &IncidentFilter,
    ) -> Result<ExtremePoint, AggregateError> {
        self.extreme_point(region_id, reference, None, filter, Extreme::Nearest)
    }

    fn extreme_point(
        &self,
        region_id: &str,
        reference: &Coordinate,
        reference_name: Option<&str>,
        filter: &IncidentFilter,
        extreme: Extreme,
    ) -> Result<ExtremePoint, AggregateError> {
        let region_id = self.summary(region_id)?.id.as_str();
        let mut best: Option<(&Incident, f64)> = None;

        for incident in self.matching(region_id, filter)? {
            let distance = geodesic_distance(reference, &incident.coordinate);
            match best {
                Some((_, best_distance)) if !extreme.improves(distance, best_distance) => {}
                _ => best = Some((incident, distance)),
            }
        }

        let (incident, distance_metres) = best.ok_or_else(|| AggregateError::EmptyRegion {
            region_id: region_id.to_string(),
        })?;

        Ok(ExtremePoint {
            region_id: region_id.to_string(),
            incident: incident.clone(),
            reference: *reference,
            reference_name: reference_name.map(ToString::to_string),
            distance_metres,
        })
    }

    /// The farthest matching incident from every station.
    ///
    /// Stations whose district is not indexed or has no matching incident
    /// are logged and left out.
    #[must_use]
    pub fn farthest_per_region(
        &self,
        stations: &ReferenceLocations,
        filter: &IncidentFilter,
    ) -> Vec<ExtremePoint> {
        self.extreme_per_region(stations, filter, Extreme::Farthest)
    }

    /// The nearest matching incident to every station.
    ///
    /// Stations whose district is not indexed or has no matching incident
    /// are logged and left out.
    #[must_use]
    pub fn nearest_per_region(
        &self,
        stations: &ReferenceLocations,
        filter: &IncidentFilter,
    ) -> Vec<ExtremePoint> {
        self.extreme_per_region(stations, filter, Extreme::Nearest)
    }

    fn extreme_per_region(
        &self,
        stations: &ReferenceLocations,
        filter: &IncidentFilter,
        extreme: Extreme,
    ) -> Vec<ExtremePoint> {
        stations
            .iter()
            .filter_map(|station| {
                self.extreme_point(
                    &station.region_id,
                    &station.coordinate,
                    station.name.as_deref(),
                    filter,
                    extreme,
                )
                .inspect_err(|e| {
                    log::warn!("Skipping station for district {}: {e}", station.region_id);
                })
                .ok()
            })
            .collect()
    }

    /// Arrested versus not-arrested counts for a district.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnknownRegion`] if the district is not
    /// indexed.
    pub fn arrest_breakdown(
        &self,
        region_id: &str,
        filter: &IncidentFilter,
    ) -> Result<ArrestBreakdown, AggregateError> {
        let mut breakdown = ArrestBreakdown::default();
        for incident in self.matching(region_id, filter)? {
            if incident.arrest {
                breakdown.arrested += 1;
            } else {
                breakdown.not_arrested += 1;
            }
        }
        Ok(breakdown)
    }

    /// The matching incidents of a district, in load order.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnknownRegion`] if the district is not
    /// indexed.
    pub fn points(
        &self,
        region_id: &str,
        filter: &IncidentFilter,
    ) -> Result<Vec<&'a Incident>, AggregateError> {
        Ok(self.matching(region_id, filter)?.collect())
    }

    /// Collects count, density, top descriptions and blocks, the arrest
    /// split and, when `station` is given, the farthest incident.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnknownRegion`] if the district is not
    /// indexed. An empty district yields a report with zero counts and no
    /// farthest incident.
    pub fn summarize(
        &self,
        region_id: &str,
        station: Option<&Coordinate>,
        filter: &IncidentFilter,
        k: usize,
    ) -> Result<RegionReport, AggregateError> {
        let summary = self.summary(region_id)?;
        let region_id = summary.id.as_str();
        let arrests = self.arrest_breakdown(region_id, filter)?;

        let density = match self.density(region_id, filter) {
            Ok(density) => Some(density),
            Err(AggregateError::DivisionByZeroArea { .. }) => None,
            Err(e) => return Err(e),
        };

        let farthest = match station {
            Some(reference) => match self.farthest_point(region_id, reference, filter) {
                Ok(point) => Some(point),
                Err(AggregateError::EmptyRegion { .. }) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        Ok(RegionReport {
            region_id: summary.id.clone(),
            name: summary.name.clone(),
            area_hectares: summary.area_hectares,
            count: arrests.total(),
            density,
            top_descriptions: self.top_k_by_attribute(
                region_id,
                IncidentAttribute::Description,
                k,
                filter,
            )?,
            top_blocks: self.top_k_by_attribute(region_id, IncidentAttribute::Block, k, filter)?,
            arrests,
            farthest,
        })
    }
}
