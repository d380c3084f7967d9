//! Error types for the scene store.
//!
//! The apply path never returns recoverable errors; the only fallible
//! operations are construction-time configuration of the spatial tree.

use std::fmt;

/// Result type for scene store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Scene store errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Spatial tree domain extent is not positive and finite
    InvalidExtent(f32),

    /// Octree depth exceeds the pre-allocation limit
    DepthOutOfRange(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidExtent(size) => {
                write!(f, "Invalid spatial domain extent: {}", size)
            }
            Error::DepthOutOfRange(depth) => {
                write!(f, "Octree depth out of range: {}", depth)
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
