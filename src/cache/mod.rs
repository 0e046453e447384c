//! Cache Module
//!
//! Filesystem-backed caches with scheduled expiration: a history cache that
//! retains the last N values per key, and a single-value cache.

mod catalog;
mod codec;
mod filter;
mod history;
mod single;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use catalog::{Catalog, HistoryRecord, CATALOG_FILE, MATCHED_PROPERTIES};
pub use codec::{Codec, JsonCodec};
pub use filter::{content_text, ContentFilter};
pub use history::HistoryCache;
pub use single::{ValueCache, META_FILE, VALUE_FILE};

use crate::error::{CacheError, Result};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 255;

/// Checks that `key` can name a directory inside the container.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::Configuration("cache key is required".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::Configuration(format!(
            "cache key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if key == "." || key == ".." || key.contains(['/', '\\', '\0']) {
        return Err(CacheError::Configuration(format!(
            "cache key '{}' is not a plain name",
            key
        )));
    }
    Ok(())
}
