use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use listing_core::{CellAddress, RowRange};

/// Store failure, classified at the adapter boundary so callers never
/// inspect message text to tell a quota error from anything else.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("rate limited by store")]
    RateLimited {
        /// Pause advised by the store, honored as a floor on the next wait.
        retry_after: Option<Duration>,
    },
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("permanent store error: {0}")]
    Permanent(String),
}

impl StoreError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, StoreError::RateLimited { .. })
    }
}

/// One cell mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    pub address: CellAddress,
    pub value: String,
}

/// One contiguous row-span mutation. `values` must match the range width;
/// sparse cells are written as empty strings, never omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeWrite {
    pub range: RowRange,
    pub values: Vec<String>,
}

/// Write capability of the remote tabular store, as consumed by the
/// persistence pipeline. Remote clients (and the local JSON adapter)
/// implement this; the pipeline never sees transport details.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// All values of a 1-based column, top to bottom, up to the last
    /// non-empty cell. Index 0 is the header row.
    async fn read_column(&self, col: usize) -> Result<Vec<String>, StoreError>;

    /// Value of a single cell; empty string when the cell is unset.
    async fn read_cell(&self, row: usize, col: usize) -> Result<String, StoreError>;

    /// Write a batch of row ranges in one request.
    async fn write_ranges(&self, writes: &[RangeWrite]) -> Result<(), StoreError>;

    /// Write a batch of individual cells in one request.
    async fn write_cells(&self, writes: &[CellWrite]) -> Result<(), StoreError>;

    /// Write one row range.
    async fn write_range(&self, write: RangeWrite) -> Result<(), StoreError> {
        self.write_ranges(std::slice::from_ref(&write)).await
    }
}
