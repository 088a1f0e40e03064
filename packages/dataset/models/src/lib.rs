#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident, station, and filter types for the district incident dataset.
//!
//! Raw rows ([`IncidentRow`], [`StationRow`]) come from a row provider with
//! every field optional. Loading validates them into immutable
//! [`Incident`] and [`ReferenceLocation`] values; rows that cannot be
//! validated are counted in [`SkippedRecords`] under a [`SkipReason`].

pub mod filter;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use filter::{IncidentFields, IncidentFilter, TextMatch};

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    /// Latitude in degrees, -90..=90.
    pub latitude: f64,
    /// Longitude in degrees, -180..=180.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate, rejecting non-finite or out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError`] if either component is non-finite
    /// or outside its valid range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinateError> {
        let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
        let lon_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);
        if lat_ok && lon_ok {
            Ok(Self {
                latitude,
                longitude,
            })
        } else {
            Err(InvalidCoordinateError {
                latitude: Some(latitude),
                longitude: Some(longitude),
            })
        }
    }

    /// Creates a coordinate from optional components as read from a row.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError`] if a component is missing or out
    /// of range.
    pub fn from_parts(
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Self, InvalidCoordinateError> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Self::new(lat, lon),
            _ => Err(InvalidCoordinateError {
                latitude,
                longitude,
            }),
        }
    }
}

/// Error returned when a latitude/longitude pair is missing or out of range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidCoordinateError {
    /// The latitude that was provided, if any.
    pub latitude: Option<f64>,
    /// The longitude that was provided, if any.
    pub longitude: Option<f64>,
}

impl std::fmt::Display for InvalidCoordinateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid coordinate (lat={:?}, lon={:?}): expected lat -90..90, lon -180..180",
            self.latitude, self.longitude
        )
    }
}

impl std::error::Error for InvalidCoordinateError {}

/// A raw incident row as yielded by a row provider, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRow {
    /// Case number (e.g. `"JB123456"`).
    pub case_number: String,
    /// District identifier, if the source assigned one.
    pub region_id: Option<String>,
    /// Primary crime type (e.g. `"WEAPONS VIOLATION"`).
    pub category: String,
    /// Secondary description (e.g. `"UNLAWFUL POSS OF HANDGUN"`).
    pub description: String,
    /// Whether an arrest was made. Missing values are treated as `false`.
    pub arrest: Option<bool>,
    /// Type of location (e.g. `"STREET"`, `"RESIDENCE"`).
    pub location_description: Option<String>,
    /// Block-level address (e.g. `"047XX W MADISON ST"`).
    pub block: Option<String>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
}

/// A validated, immutable incident tagged with its district.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Case number, unique within the dataset.
    pub case_number: String,
    /// District identifier.
    pub region_id: String,
    /// Where the incident occurred.
    pub coordinate: Coordinate,
    /// Primary crime type.
    pub category: String,
    /// Secondary description.
    pub description: String,
    /// Whether an arrest was made.
    pub arrest: bool,
    /// Type of location, if recorded.
    pub location_description: Option<String>,
    /// Block-level address, if recorded.
    pub block: Option<String>,
}

impl Incident {
    /// Returns the value of a grouping attribute, or `None` when the
    /// incident has no value recorded for it.
    #[must_use]
    pub fn attribute(&self, attribute: IncidentAttribute) -> Option<&str> {
        match attribute {
            IncidentAttribute::Category => Some(&self.category),
            IncidentAttribute::Description => Some(&self.description),
            IncidentAttribute::LocationDescription => self.location_description.as_deref(),
            IncidentAttribute::Block => self.block.as_deref(),
            IncidentAttribute::Arrest => Some(if self.arrest { "true" } else { "false" }),
        }
    }
}

/// Incident attributes that results can be grouped by.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentAttribute {
    /// Primary crime type.
    Category,
    /// Secondary description.
    Description,
    /// Type of location.
    LocationDescription,
    /// Block-level address.
    Block,
    /// Arrest flag, grouped as `"true"` / `"false"`.
    Arrest,
}

impl IncidentAttribute {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Category,
            Self::Description,
            Self::LocationDescription,
            Self::Block,
            Self::Arrest,
        ]
    }
}

/// A raw station row as yielded by a row provider, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationRow {
    /// District the station serves (e.g. `"11"` or `"Headquarters"`).
    pub region_id: String,
    /// Station name.
    pub name: Option<String>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
}

/// The anchor point of a district (its police station).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceLocation {
    /// District identifier.
    pub region_id: String,
    /// Station name, if known.
    pub name: Option<String>,
    /// Station position.
    pub coordinate: Coordinate,
}

/// Why a row was left out of a loaded dataset.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// Did not pass the load filter (informational, not an error).
    Filtered,
    /// Latitude/longitude missing, non-finite, or out of range.
    InvalidCoordinate,
    /// No district on the row and none could be located.
    MissingRegion,
    /// Case number already seen earlier in the same load.
    DuplicateCase,
    /// The provider could not decode the row, or it has no case number.
    Malformed,
}

/// Per-reason tally of rows dropped during a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecords {
    /// Rows that did not pass the load filter.
    pub filtered: u64,
    /// Rows dropped for a missing or out-of-range coordinate.
    pub invalid_coordinate: u64,
    /// Rows dropped because no district could be assigned.
    pub missing_region: u64,
    /// Rows dropped as repeats of an earlier case number.
    pub duplicate_case: u64,
    /// Rows the provider could not decode.
    pub malformed: u64,
}

impl SkippedRecords {
    /// Counts one dropped row.
    pub const fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Filtered => self.filtered += 1,
            SkipReason::InvalidCoordinate => self.invalid_coordinate += 1,
            SkipReason::MissingRegion => self.missing_region += 1,
            SkipReason::DuplicateCase => self.duplicate_case += 1,
            SkipReason::Malformed => self.malformed += 1,
        }
    }

    /// Number of rows dropped for the given reason.
    #[must_use]
    pub const fn count(&self, reason: SkipReason) -> u64 {
        match reason {
            SkipReason::Filtered => self.filtered,
            SkipReason::InvalidCoordinate => self.invalid_coordinate,
            SkipReason::MissingRegion => self.missing_region,
            SkipReason::DuplicateCase => self.duplicate_case,
            SkipReason::Malformed => self.malformed,
        }
    }

    /// Rows dropped because they were unusable. Filtered rows are not
    /// counted here.
    #[must_use]
    pub const fn rejected(&self) -> u64 {
        self.invalid_coordinate + self.missing_region + self.duplicate_case + self.malformed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_range_is_enforced() {
        assert!(Coordinate::new(41.88, -87.63).is_ok());
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(200.0, -87.63).is_err());
        assert!(Coordinate::new(41.88, -181.0).is_err());
        assert!(Coordinate::new(f64::NAN, -87.63).is_err());
        assert!(Coordinate::new(41.88, f64::INFINITY).is_err());
    }

    #[test]
    fn missing_component_is_invalid() {
        let err = Coordinate::from_parts(Some(41.88), None).unwrap_err();
        assert_eq!(err.latitude, Some(41.88));
        assert!(err.longitude.is_none());
    }

    #[test]
    fn attribute_values() {
        let incident = Incident {
            case_number: "JA100".to_string(),
            region_id: "11".to_string(),
            coordinate: Coordinate::new(41.88, -87.72).unwrap(),
            category: "WEAPONS VIOLATION".to_string(),
            description: "UNLAWFUL POSS OF HANDGUN".to_string(),
            arrest: true,
            location_description: None,
            block: Some("039XX W MADISON ST".to_string()),
        };
        assert_eq!(
            incident.attribute(IncidentAttribute::Description),
            Some("UNLAWFUL POSS OF HANDGUN")
        );
        assert_eq!(incident.attribute(IncidentAttribute::Arrest), Some("true"));
        assert_eq!(incident.attribute(IncidentAttribute::LocationDescription), None);
    }

    #[test]
    fn attribute_parses_from_snake_case() {
        for attribute in IncidentAttribute::all() {
            let parsed: IncidentAttribute = attribute.as_ref().parse().unwrap();
            assert_eq!(parsed, *attribute);
        }
        assert_eq!(
            "location_description".parse::<IncidentAttribute>().unwrap(),
            IncidentAttribute::LocationDescription
        );
    }

    #[test]
    fn rejected_excludes_filtered_rows() {
        let mut skipped = SkippedRecords::default();
        skipped.record(SkipReason::Filtered);
        skipped.record(SkipReason::Filtered);
        skipped.record(SkipReason::InvalidCoordinate);
        skipped.record(SkipReason::DuplicateCase);
        assert_eq!(skipped.count(SkipReason::Filtered), 2);
        assert_eq!(skipped.rejected(), 2);
    }
}
