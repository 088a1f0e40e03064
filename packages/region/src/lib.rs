#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory index of police district boundaries.
//!
//! Loads district polygons from a `GeoJSON` `FeatureCollection`, computes
//! each district's geodesic area once at load time, and builds an R-tree
//! over district envelopes for fast point-in-polygon lookups. The index is
//! immutable after load and shared by reference with the aggregation
//! engine.

pub mod geometry;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crime_districts_region_models::{
    BoundaryFieldMapping, RegionLocator, RegionSummary, normalize_region_id,
};
use crime_districts_retry::RetryPolicy;
use geo::{Contains, MultiPolygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

/// Errors that can occur while loading or querying the region index.
#[derive(Debug, Error)]
pub enum RegionError {
    /// A feature's geometry is missing, not polygonal, or unusable.
    #[error("Malformed geometry for region {region_id}: {message}")]
    MalformedGeometry {
        /// Region whose geometry failed to parse.
        region_id: String,
        /// Description of what went wrong.
        message: String,
    },

    /// Two features share the same region identifier.
    #[error("Duplicate region identifier: {region_id}")]
    DuplicateRegion {
        /// The repeated identifier.
        region_id: String,
    },

    /// A feature has no usable value in the identifier property.
    #[error("Feature {feature_index} has no '{property}' identifier")]
    MissingRegionId {
        /// Zero-based position of the feature in the collection.
        feature_index: usize,
        /// Property that was expected to hold the identifier.
        property: String,
    },

    /// The requested region is not in the index.
    #[error("Unknown region: {region_id}")]
    UnknownRegion {
        /// The identifier that was looked up.
        region_id: String,
    },

    /// The boundary document is valid `GeoJSON` but not a `FeatureCollection`.
    #[error("Boundary source is not a GeoJSON FeatureCollection")]
    NotAFeatureCollection,

    /// The boundary document is not valid `GeoJSON`.
    #[error("GeoJSON parse error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Reading the boundary file kept failing until retries ran out.
    #[error("Failed to load boundaries after {attempts} attempt(s): {source}")]
    LoadFailure {
        /// Number of attempts made.
        attempts: u32,
        /// The I/O error from the last attempt.
        source: std::io::Error,
    },
}

/// A district ready to be indexed: identifier, geometry, and optionally a
/// precomputed area that overrides the geodesic computation.
#[derive(Debug, Clone)]
pub struct RegionRecord {
    /// Unique district identifier.
    pub id: String,
    /// Human-readable label.
    pub name: Option<String>,
    /// District boundary in `(longitude, latitude)` order.
    pub polygon: MultiPolygon<f64>,
    /// Area in hectares when already known (e.g. from a land-area column).
    pub area_hectares: Option<f64>,
}

/// A boundary polygon stored in the R-tree with its identifier.
struct BoundaryEntry {
    region_id: String,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built index of district boundaries and areas.
///
/// Constructed once and shared across all consumers.
pub struct RegionIndex {
    summaries: BTreeMap<String, RegionSummary>,
    tree: RTree<BoundaryEntry>,
}

impl std::fmt::Debug for RegionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionIndex")
            .field("regions", &self.summaries.len())
            .finish_non_exhaustive()
    }
}

impl RegionIndex {
    /// Builds an index from already-parsed district records.
    ///
    /// Identifiers are normalized, so `"001"` is indexed as `"1"`.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::MissingRegionId`] for a blank identifier,
    /// [`RegionError::DuplicateRegion`] if two records share an identifier,
    /// or [`RegionError::MalformedGeometry`] if a polygon is degenerate or a
    /// precomputed area is negative or not finite.
    pub fn from_records(
        records: impl IntoIterator<Item = RegionRecord>,
    ) -> Result<Self, RegionError> {
        let mut summaries = BTreeMap::new();
        let mut entries = Vec::new();

        for (index, record) in records.into_iter().enumerate() {
            let Some(region_id) = normalize_region_id(&record.id) else {
                return Err(RegionError::MissingRegionId {
                    feature_index: index,
                    property: "id".to_string(),
                });
            };
            if summaries.contains_key(&region_id) {
                return Err(RegionError::DuplicateRegion { region_id });
            }

            let malformed = |message: String| RegionError::MalformedGeometry {
                region_id: region_id.clone(),
                message,
            };
            geometry::validate(&record.polygon).map_err(malformed)?;

            let area_hectares = match record.area_hectares {
                Some(area) if !area.is_finite() || area < 0.0 => {
                    return Err(malformed(format!("invalid precomputed area {area} ha")));
                }
                Some(area) => area,
                None => geometry::area_hectares(&record.polygon),
            };
            let envelope = geometry::envelope(&record.polygon)
                .ok_or_else(|| malformed("geometry has no extent".to_string()))?;

            summaries.insert(
                region_id.clone(),
                RegionSummary {
                    id: region_id.clone(),
                    name: record.name,
                    area_hectares,
                },
            );
            entries.push(BoundaryEntry {
                region_id,
                envelope,
                polygon: record.polygon,
            });
        }

        log::info!("Loaded {} districts into region index", summaries.len());

        Ok(Self {
            summaries,
            tree: RTree::bulk_load(entries),
        })
    }

    /// Parses a `GeoJSON` `FeatureCollection` of district boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError`] if the document is not a feature collection,
    /// a feature lacks an identifier, a geometry is malformed, or two
    /// features share an identifier.
    pub fn from_geojson(
        geojson: GeoJson,
        fields: &BoundaryFieldMapping,
    ) -> Result<Self, RegionError> {
        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(RegionError::NotAFeatureCollection);
        };

        let mut records = Vec::with_capacity(collection.features.len());

        for (feature_index, feature) in collection.features.into_iter().enumerate() {
            let properties = feature.properties.unwrap_or_default();

            let Some(region_id) = properties
                .get(&fields.id_property)
                .and_then(region_id_from_value)
            else {
                return Err(RegionError::MissingRegionId {
                    feature_index,
                    property: fields.id_property.clone(),
                });
            };

            let name = fields
                .name_property
                .as_ref()
                .and_then(|prop| properties.get(prop))
                .and_then(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string);

            let Some(geom) = feature.geometry else {
                return Err(RegionError::MalformedGeometry {
                    region_id,
                    message: "feature has no geometry".to_string(),
                });
            };

            let polygon = geometry::to_multipolygon(geom)
                .map_err(|message| RegionError::MalformedGeometry {
                    region_id: region_id.clone(),
                    message,
                })?;

            records.push(RegionRecord {
                id: region_id,
                name,
                polygon,
                area_hectares: None,
            });
        }

        Self::from_records(records)
    }

    /// Parses a `GeoJSON` string of district boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError`] if the text is not valid `GeoJSON` or any of
    /// the [`Self::from_geojson`] checks fail.
    pub fn from_geojson_str(
        geojson_str: &str,
        fields: &BoundaryFieldMapping,
    ) -> Result<Self, RegionError> {
        let geojson: GeoJson = geojson_str.parse()?;
        Self::from_geojson(geojson, fields)
    }

    /// Reads and parses a boundary file, retrying transient I/O failures.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::LoadFailure`] once the retry budget is spent
    /// or the file cannot be read for a permanent reason, or any parse
    /// error from [`Self::from_geojson_str`].
    pub fn from_file(
        path: &Path,
        fields: &BoundaryFieldMapping,
        retry: &RetryPolicy,
    ) -> Result<Self, RegionError> {
        let label = format!("boundaries {}", path.display());
        let text = crime_districts_retry::run(retry, &label, |_| std::fs::read_to_string(path))
            .map_err(|e| RegionError::LoadFailure {
                attempts: e.attempts,
                source: e.last,
            })?;

        log::debug!(
            "Read {} bytes of boundaries from {}",
            text.len(),
            path.display()
        );

        Self::from_geojson_str(&text, fields)
    }

    /// Area of a district in hectares.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::UnknownRegion`] if the district is not indexed.
    pub fn area_of(&self, region_id: &str) -> Result<f64, RegionError> {
        self.get(region_id)
            .map(|s| s.area_hectares)
            .ok_or_else(|| RegionError::UnknownRegion {
                region_id: region_id.to_string(),
            })
    }

    /// All indexed district identifiers.
    #[must_use]
    pub fn all_region_ids(&self) -> BTreeSet<String> {
        self.summaries.keys().cloned().collect()
    }

    /// Whether the district is indexed.
    #[must_use]
    pub fn contains(&self, region_id: &str) -> bool {
        self.get(region_id).is_some()
    }

    /// Summary for one district. `"011"` finds district `"11"`.
    #[must_use]
    pub fn get(&self, region_id: &str) -> Option<&RegionSummary> {
        self.summaries
            .get(region_id)
            .or_else(|| self.summaries.get(&normalize_region_id(region_id)?))
    }

    /// All district summaries, ordered by identifier.
    pub fn regions(&self) -> impl Iterator<Item = &RegionSummary> {
        self.summaries.values()
    }

    /// Number of indexed districts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    /// Whether the index holds no districts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// Look up the district containing a point.
    ///
    /// Districts tile the city without overlap, so first match wins.
    #[must_use]
    pub fn lookup(&self, longitude: f64, latitude: f64) -> Option<&str> {
        let point = geo::Point::new(longitude, latitude);
        let query_env = AABB::from_point([longitude, latitude]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .find(|entry| entry.polygon.contains(&point))
            .map(|entry| entry.region_id.as_str())
    }
}

impl RegionLocator for RegionIndex {
    fn locate(&self, longitude: f64, latitude: f64) -> Option<&str> {
        self.lookup(longitude, latitude)
    }
}

/// Reads a district identifier from a feature property.
///
/// Accepts strings and integral numbers (`"dist_num": 1` and
/// `"dist_num": "1"` both yield `"1"`).
fn region_id_from_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => normalize_region_id(s),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i.to_string());
            }
            if let Some(u) = n.as_u64() {
                return Some(u.to_string());
            }
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| format!("{f:.0}"))
        }
        _ => None,
    }
}
