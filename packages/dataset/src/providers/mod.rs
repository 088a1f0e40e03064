//! Row providers: the storage-agnostic seam between loaders and data.
//!
//! Loaders never talk to files or databases directly. They receive a
//! [`RowProvider`] and iterate the rows it yields; each call to
//! [`RowProvider::rows`] starts a fresh pass so a failed load can be
//! retried from the beginning.

pub mod csv_file;
#[cfg(feature = "duckdb")]
pub mod duckdb_table;
pub mod memory;

use crime_districts_retry::Transient;
use thiserror::Error;

pub use csv_file::{
    CsvIncidentProvider, CsvSource, CsvStationProvider, IncidentColumns, StationColumns,
};
#[cfg(feature = "duckdb")]
pub use duckdb_table::DuckDbIncidentProvider;
pub use memory::MemoryProvider;

/// Errors raised while reading rows from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// I/O error opening or reading the underlying source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// `DuckDB` query failed.
    #[cfg(feature = "duckdb")]
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// A required column is absent from the source.
    #[error("Missing required column '{column}'")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// The source reported a failure that may clear up on retry.
    #[error("Transient provider failure: {message}")]
    Transient {
        /// Description of what went wrong.
        message: String,
    },

    /// A single row could not be decoded.
    #[error("Row error: {message}")]
    Row {
        /// Description of what went wrong.
        message: String,
    },
}

impl ProviderError {
    /// Returns `true` if the error concerns one row only, so the loader
    /// can skip that row and keep reading.
    #[must_use]
    pub fn is_row_level(&self) -> bool {
        match self {
            Self::Row { .. } => true,
            Self::Csv(e) => matches!(
                e.kind(),
                csv::ErrorKind::Utf8 { .. }
                    | csv::ErrorKind::UnequalLengths { .. }
                    | csv::ErrorKind::Deserialize { .. }
            ),
            #[cfg(feature = "duckdb")]
            Self::DuckDb(e) => matches!(
                e,
                duckdb::Error::FromSqlConversionFailure(..)
                    | duckdb::Error::InvalidColumnType(..)
                    | duckdb::Error::IntegralValueOutOfRange(..)
            ),
            _ => false,
        }
    }
}

impl Transient for ProviderError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => e.is_transient(),
            Self::Csv(e) => match e.kind() {
                csv::ErrorKind::Io(io) => io.is_transient(),
                _ => false,
            },
            Self::Transient { .. } => true,
            _ => false,
        }
    }
}

/// A single pass over a provider's rows.
pub type RowIter<'a, R> = Box<dyn Iterator<Item = Result<R, ProviderError>> + 'a>;

/// A source of rows of type `R` (incidents or stations).
pub trait RowProvider<R> {
    /// Short description of the source for log messages.
    fn name(&self) -> &str;

    /// Starts a new pass over every row.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the source cannot be opened. Errors for
    /// individual rows are yielded by the iterator instead.
    fn rows(&self) -> Result<RowIter<'_, R>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_transience_follows_error_kind() {
        let reset = ProviderError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        let denied = ProviderError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(reset.is_transient());
        assert!(!denied.is_transient());
    }

    #[test]
    fn row_errors_are_row_level_and_permanent() {
        let err = ProviderError::Row {
            message: "bad".to_string(),
        };
        assert!(err.is_row_level());
        assert!(!err.is_transient());

        let missing = ProviderError::MissingColumn {
            column: "Latitude".to_string(),
        };
        assert!(!missing.is_row_level());
    }
}
