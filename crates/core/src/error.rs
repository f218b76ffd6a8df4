//! Domain error model.

use thiserror::Error;

/// Result type used by the value types in this crate.
pub type DomainResult<T> = Result<T, DomainError>;

/// Error raised when a value fails to parse or validate.
///
/// Keep this focused on deterministic input failures. I/O concerns belong to the
/// crates that perform it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A cell range could not be parsed or is out of bounds.
    #[error("invalid cell range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },

    /// A region-bias code was not exactly two letters.
    #[error("invalid region code '{0}': expected two letters (e.g. 'us')")]
    InvalidRegionCode(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_range(range: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            range: range.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
