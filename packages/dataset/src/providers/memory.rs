//! In-memory row provider.

use super::{ProviderError, RowIter, RowProvider};

/// Serves rows from a `Vec`, in insertion order.
///
/// Useful for embedding callers that already hold decoded rows, and for
/// tests.
#[derive(Debug, Clone)]
pub struct MemoryProvider<R> {
    name: String,
    rows: Vec<R>,
}

impl<R> MemoryProvider<R> {
    /// Creates a provider over `rows`.
    #[must_use]
    pub fn new(name: &str, rows: Vec<R>) -> Self {
        Self {
            name: name.to_string(),
            rows,
        }
    }
}

impl<R: Clone> RowProvider<R> for MemoryProvider<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn rows(&self) -> Result<RowIter<'_, R>, ProviderError> {
        Ok(Box::new(self.rows.iter().cloned().map(Ok)))
    }
}
