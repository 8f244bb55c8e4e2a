//! Error and result types shared by every layer of the index.

use std::io;
use thiserror::Error;

/// Errors raised by the paged storage, the geometry store and the
/// reference index.
///
/// A missing overflow or member row in the auxiliary store is not an error:
/// lookups return `None` and callers fall back to an empty list.
#[derive(Debug, Error)]
pub enum GeoRefError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The index (or the id it was derived from) lies beyond the preallocated file.
    #[error("Offset {index} is outside the file length {len}")]
    OutOfRange { index: i128, len: u64 },

    /// The value cannot be stored in a 32-bit cell, or collides with the zero sentinel.
    #[error("Value {value} cannot be encoded in a storage cell")]
    EncodingOverflow { value: i128 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid member token: {0}")]
    InvalidMember(String),

    #[error("Auxiliary store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage is closed")]
    Closed,
}

impl GeoRefError {
    pub(crate) fn out_of_range(index: impl Into<i128>, len: u64) -> Self {
        GeoRefError::OutOfRange {
            index: index.into(),
            len,
        }
    }

    pub(crate) fn overflow(value: impl Into<i128>) -> Self {
        GeoRefError::EncodingOverflow {
            value: value.into(),
        }
    }

    /// Returns true for the errors that indicate an undersized preallocation
    /// or an unrepresentable value; a batch hitting one must be aborted.
    pub fn aborts_batch(&self) -> bool {
        matches!(
            self,
            GeoRefError::OutOfRange { .. } | GeoRefError::EncodingOverflow { .. }
        )
    }
}

/// Result type for index operations
pub type GeoRefResult<T> = Result<T, GeoRefError>;
