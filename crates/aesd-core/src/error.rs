//! Error types for aesd-core
//!
//! Every failure the command log can report. Errors are scoped to the
//! session or task that hit them; none of them leave the store in a
//! partially mutated state.

use thiserror::Error;

/// Errors that can occur while framing, seeking or mutating the command log
#[derive(Debug, Error)]
pub enum AesdError {
    /// A record buffer could not grow (allocation failure or size limit)
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// A seek directive points outside the current store contents
    #[error("Seek out of range: record {record_index}, offset {intra_offset}")]
    OutOfRange {
        /// Requested record index (0 = oldest)
        record_index: usize,
        /// Requested byte offset inside that record
        intra_offset: usize,
    },

    /// I/O error on a connection or file
    #[error("I/O error: {0}")]
    Io(String),

    /// The store lock could not be acquired
    #[error("Lock acquisition failed: {0}")]
    LockAcquisition(String),

    /// Store constructed with zero slots
    #[error("Store capacity must be at least one record")]
    InvalidCapacity,

    /// File-position style seek outside `[0, total_size]`
    #[error("Invalid seek: {0}")]
    InvalidSeek(String),
}

impl From<std::io::Error> for AesdError {
    fn from(err: std::io::Error) -> Self {
        AesdError::Io(err.to_string())
    }
}

impl AesdError {
    /// Create a new ResourceExhaustion error
    pub fn resource_exhaustion(message: impl Into<String>) -> Self {
        Self::ResourceExhaustion(message.into())
    }

    /// Create a new OutOfRange error
    pub fn out_of_range(record_index: usize, intra_offset: usize) -> Self {
        Self::OutOfRange {
            record_index,
            intra_offset,
        }
    }

    /// Create a new LockAcquisition error
    pub fn lock_acquisition(message: impl Into<String>) -> Self {
        Self::LockAcquisition(message.into())
    }

    /// Whether retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockAcquisition(_))
    }
}

/// Result type alias for command log operations
pub type AesdResult<T> = Result<T, AesdError>;
