#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result types produced by the aggregation engine.
//!
//! Every type here is recomputed on demand and never persisted. All of
//! them serialize with `camelCase` field names so a map renderer can
//! consume them directly.

use std::collections::BTreeMap;

use crime_districts_dataset_models::{Coordinate, Incident};
use serde::Serialize;

/// Incident counts for every indexed district.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionCounts {
    /// Count per indexed district. Districts without matches are present
    /// with `0`.
    pub by_region: BTreeMap<String, u64>,
    /// Count per district identifier that the incidents reference but the
    /// index does not contain.
    pub unknown_regions: BTreeMap<String, u64>,
}

impl RegionCounts {
    /// Count for one district, `0` if it is not present.
    #[must_use]
    pub fn get(&self, region_id: &str) -> u64 {
        self.by_region.get(region_id).copied().unwrap_or(0)
    }

    /// Total of the indexed districts' counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.by_region.values().sum()
    }

    /// Total of the counts attributed to unknown districts.
    #[must_use]
    pub fn unknown_total(&self) -> u64 {
        self.unknown_regions.values().sum()
    }
}

/// One value of a grouping attribute and how often it occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeCount {
    /// Attribute value (e.g. `"UNLAWFUL POSS OF HANDGUN"`).
    pub value: String,
    /// Number of incidents with that value.
    pub count: u64,
}

impl AttributeCount {
    #[must_use]
    pub fn new(value: impl Into<String>, count: u64) -> Self {
        Self {
            value: value.into(),
            count,
        }
    }
}

/// Crime density of one district.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DensityRow {
    /// District identifier.
    pub region_id: String,
    /// District name, if the boundary file has one.
    pub name: Option<String>,
    /// Matching incidents in the district.
    pub count: u64,
    /// District area in hectares.
    pub area_hectares: f64,
    /// Incidents per 100 hectares. `None` for a district with zero area.
    pub density: Option<f64>,
    /// `density` rounded to the nearest integer, ties to even.
    pub rounded_density: Option<f64>,
}

/// The incident farthest from or nearest to a reference coordinate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtremePoint {
    /// District the incident belongs to.
    pub region_id: String,
    /// The selected incident.
    pub incident: Incident,
    /// The coordinate distances were measured from.
    pub reference: Coordinate,
    /// Name of the reference location, if it has one.
    pub reference_name: Option<String>,
    /// Geodesic distance in metres.
    pub distance_metres: f64,
}

/// Arrested versus not-arrested incident counts for one district.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrestBreakdown {
    /// Incidents with an arrest.
    pub arrested: u64,
    /// Incidents without an arrest.
    pub not_arrested: u64,
}

impl ArrestBreakdown {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.arrested + self.not_arrested
    }
}

/// Everything the engine knows about one district under one filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionReport {
    /// District identifier.
    pub region_id: String,
    /// District name, if the boundary file has one.
    pub name: Option<String>,
    /// District area in hectares.
    pub area_hectares: f64,
    /// Matching incidents in the district.
    pub count: u64,
    /// Incidents per 100 hectares, `None` for zero area.
    pub density: Option<f64>,
    /// Most frequent descriptions.
    pub top_descriptions: Vec<AttributeCount>,
    /// Most frequent blocks.
    pub top_blocks: Vec<AttributeCount>,
    /// Arrest split.
    pub arrests: ArrestBreakdown,
    /// Incident farthest from the district's station, when a station is
    /// known and the district has matching incidents.
    pub farthest: Option<ExtremePoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_helpers() {
        let counts = RegionCounts {
            by_region: [("1".to_string(), 3), ("2".to_string(), 0)]
                .into_iter()
                .collect(),
            unknown_regions: [("31".to_string(), 2)].into_iter().collect(),
        };
        assert_eq!(counts.get("1"), 3);
        assert_eq!(counts.get("2"), 0);
        assert_eq!(counts.get("99"), 0);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.unknown_total(), 2);
    }

    #[test]
    fn serializes_camel_case() {
        let row = DensityRow {
            region_id: "11".to_string(),
            name: None,
            count: 25,
            area_hectares: 500.0,
            density: Some(5.0),
            rounded_density: Some(5.0),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["regionId"], "11");
        assert_eq!(json["areaHectares"], 500.0);
        assert_eq!(json["roundedDensity"], 5.0);

        let breakdown = ArrestBreakdown {
            arrested: 2,
            not_arrested: 5,
        };
        assert_eq!(breakdown.total(), 7);
        let json = serde_json::to_value(breakdown).unwrap();
        assert_eq!(json["notArrested"], 5);
    }
}
