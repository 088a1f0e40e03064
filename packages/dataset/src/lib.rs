#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident and station loading.
//!
//! Data reaches the aggregation layer through two loaders:
//!
//! * [`PointDataset`] reads incident rows, applies a load filter, validates
//!   coordinates, assigns districts, and counts what it drops.
//! * [`ReferenceLocations`] reads one station per district.
//!
//! Both read through the [`providers::RowProvider`] seam and retry
//! transient provider failures with a [`crime_districts_retry::RetryPolicy`].

pub mod points;
pub mod providers;
pub mod stations;

use thiserror::Error;

pub use points::{LoadOptions, PointDataset};
pub use providers::{ProviderError, RowProvider};
pub use stations::{DEFAULT_EXCLUDED_STATIONS, ReferenceLocations};

/// Errors that can occur while loading incidents or stations.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The provider kept failing, or failed permanently.
    #[error("Failed to load {label} after {attempts} attempt(s): {source}")]
    LoadFailure {
        /// What was being loaded.
        label: String,
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        source: ProviderError,
    },

    /// Two reference locations claim the same district.
    #[error("More than one reference location for district {region_id}")]
    DuplicateReference {
        /// The district with more than one station.
        region_id: String,
    },
}
