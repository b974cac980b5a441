use std::fmt;

/// Error type returned when a block fails validation.
///
/// Each variant carries the index of the offending block so handlers can
/// log something actionable before dropping it.
#[derive(Debug)]
pub enum ValidationError {
    /// The stored hash does not match the recomputed content hash.
    InvalidHash { index: u64 },
    /// `previous_hash` does not match the predecessor's hash.
    InvalidLink { index: u64 },
    /// The timestamp is not strictly greater than the predecessor's.
    InvalidTimestamp { index: u64 },
    /// The hash lacks the required leading-zero difficulty prefix.
    InvalidPow { index: u64 },
}

impl ValidationError {
    /// Index of the block that failed validation.
    pub fn index(&self) -> u64 {
        match self {
            ValidationError::InvalidHash { index }
            | ValidationError::InvalidLink { index }
            | ValidationError::InvalidTimestamp { index }
            | ValidationError::InvalidPow { index } => *index,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidHash { index } => {
                write!(f, "block {index} has an invalid hash")
            }
            ValidationError::InvalidLink { index } => {
                write!(f, "block {index} has an invalid previous hash")
            }
            ValidationError::InvalidTimestamp { index } => {
                write!(f, "block {index} has an invalid timestamp")
            }
            ValidationError::InvalidPow { index } => {
                write!(f, "block {index} does not meet the difficulty target")
            }
        }
    }
}

impl std::error::Error for ValidationError {}
