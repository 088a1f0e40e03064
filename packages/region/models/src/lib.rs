#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! District boundary source mapping and region summary types.
//!
//! Defines how district identifiers are read out of a boundary
//! `FeatureCollection`, the summary row exposed for each loaded district,
//! and the [`RegionLocator`] seam used to attribute incidents that arrive
//! without a district.

use serde::{Deserialize, Serialize};

/// Square metres in one hectare.
pub const SQUARE_METRES_PER_HECTARE: f64 = 10_000.0;

/// Default feature property holding the district identifier in the
/// Chicago police district boundary export.
pub const DEFAULT_ID_PROPERTY: &str = "dist_num";

/// Field mapping for extracting district identity from boundary features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryFieldMapping {
    /// Property containing the unique district identifier. String and
    /// integer values are both accepted.
    pub id_property: String,
    /// Optional property containing a human-readable district label.
    pub name_property: Option<String>,
}

impl Default for BoundaryFieldMapping {
    fn default() -> Self {
        Self {
            id_property: DEFAULT_ID_PROPERTY.to_string(),
            name_property: None,
        }
    }
}

impl BoundaryFieldMapping {
    /// Creates a mapping that reads the identifier from `id_property`.
    #[must_use]
    pub fn with_id_property(id_property: &str) -> Self {
        Self {
            id_property: id_property.to_string(),
            name_property: None,
        }
    }
}

/// A loaded district as seen by callers of the region index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSummary {
    /// Unique district identifier (e.g. `"11"`).
    pub id: String,
    /// Human-readable label, when the boundary source provides one.
    pub name: Option<String>,
    /// Geodesic area of the district in hectares.
    pub area_hectares: f64,
}

/// Canonicalizes a raw district identifier.
///
/// Trims whitespace and drops leading zeros from purely numeric ids, so the
/// crimes export's `"011"` and the boundary file's `"11"` name the same
/// district. Returns `None` for blank input.
#[must_use]
pub fn normalize_region_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let stripped = trimmed.trim_start_matches('0');
        return Some(if stripped.is_empty() { "0" } else { stripped }.to_string());
    }
    Some(trimmed.to_string())
}

/// Resolves a coordinate to the district that contains it.
///
/// Implemented by the region index; consumed by the incident loader to
/// attribute rows that carry coordinates but no district.
pub trait RegionLocator {
    /// Returns the identifier of the district containing the point, if any.
    fn locate(&self, longitude: f64, latitude: f64) -> Option<&str>;
}
