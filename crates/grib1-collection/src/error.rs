//! Error types for the GRIB1 collection read path.

use thiserror::Error;

/// Errors surfaced by opening a collection index or reading from it.
///
/// Per-record I/O and decode failures during a read are *not* surfaced
/// through this type; the affected cells are filled with NaN and a warning
/// is logged. Only request-shape problems, index-integrity problems and
/// cancellation abort a call.
#[derive(Error, Debug)]
pub enum CollectionError {
    /// The index stream or record tables are inconsistent. Fatal to the
    /// open call (or to the first read that hydrates the bad table).
    #[error("corrupt collection index: {0}")]
    IndexCorrupt(String),

    /// The request does not match the variable's axes: wrong rank, or a
    /// range that falls outside its axis. No files are opened.
    #[error("invalid read request: {0}")]
    InvalidRequest(String),

    /// A GRIB1 message could not be decoded. Raised by codec
    /// implementations; the read executor contains it per record.
    #[error("failed to decode GRIB1 message: {0}")]
    Decode(String),

    /// Cooperative cancellation was observed between records.
    #[error("read cancelled")]
    Cancelled,

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollectionError {
    /// Create an IndexCorrupt error.
    pub fn index_corrupt(msg: impl Into<String>) -> Self {
        Self::IndexCorrupt(msg.into())
    }

    /// Create an InvalidRequest error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a Decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

/// Result type for collection operations.
pub type Result<T> = std::result::Result<T, CollectionError>;
