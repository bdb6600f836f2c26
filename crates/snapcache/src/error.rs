//! Error types for snapcache

use std::fmt;

/// Result type alias for snapcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache construction and bounded operations
///
/// A missing key is not an error: lookups return `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Capacity must be at least 1
    InvalidCapacity(usize),

    /// Retry limit must be at least 1 when set
    InvalidRetryLimit(usize),

    /// A bounded operation lost every publish race it was allowed
    Contended {
        /// Number of publish attempts made
        attempts: usize,
    },

    /// Snapshot index and recency list disagree
    Invariant(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidCapacity(cap) => {
                write!(f, "Invalid capacity: {} (must be greater than 0)", cap)
            }
            Error::InvalidRetryLimit(limit) => {
                write!(f, "Invalid retry limit: {} (must be greater than 0)", limit)
            }
            Error::Contended { attempts } => {
                write!(f, "Contended: gave up after {} publish attempts", attempts)
            }
            Error::Invariant(msg) => write!(f, "Invariant violated: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
