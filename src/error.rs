//! Error types for the file cache
//!
//! Provides unified error handling using thiserror.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the file cache.
///
/// Expired or absent values are not errors; reads report them as `Ok(None)`.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Missing key, zero history limit, or an unknown option name
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A content filter could not be compiled
    #[error("Invalid content filter: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A content filter refused the value
    #[error("Content rejected: {0}")]
    ContentRejected(String),

    /// Filesystem failure at the adapter boundary
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A value or catalog could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Wraps an I/O error with the path it happened at.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        CacheError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the file cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = CacheError::io(
            "/tmp/cache/key/.catalog",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("/tmp/cache/key/.catalog"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn test_pattern_error_converts() {
        let err: CacheError = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, CacheError::InvalidPattern(_)));
    }
}
