//! Configuration Module
//!
//! Options for opening a cache handle, with defaults, environment overrides
//! and JSON bulk configuration.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::expire::Expire;

/// Default container directory, relative to the working directory.
pub const DEFAULT_CONTAINER: &str = "./cache";

/// Default number of retained history states.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Options for a cache handle.
///
/// `expire`, `must_match` and `must_not_match` are compared against the
/// stored catalog when a handle opens; a mismatch discards the stored state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct CacheOptions {
    /// Directory holding one subdirectory per cache key
    pub container: PathBuf,
    /// How often stored content goes stale
    pub expire: Expire,
    /// Maximum number of retained history states
    pub history_limit: usize,
    /// How often unreferenced history files are pruned
    pub cleanup: Expire,
    /// Regex a value must match to be stored
    pub must_match: Option<String>,
    /// Regex a value must not match to be stored
    pub must_not_match: Option<String>,
}

impl CacheOptions {
    /// Creates options by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `FILECACHE_DIR` - Container directory (default: `./cache`)
    /// - `FILECACHE_EXPIRE` - Expiration keyword or seconds (default: `weekly`)
    /// - `FILECACHE_HISTORY_LIMIT` - Retained history states (default: 10)
    /// - `FILECACHE_CLEANUP` - Cleanup keyword or seconds (default: `nightly`)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            container: env::var("FILECACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.container),
            expire: env::var("FILECACHE_EXPIRE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.expire),
            history_limit: env::var("FILECACHE_HISTORY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.history_limit),
            cleanup: env::var("FILECACHE_CLEANUP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cleanup),
            must_match: None,
            must_not_match: None,
        }
    }

    /// Parses options from a JSON object; unknown option names are rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CacheError::Configuration(e.to_string()))
    }

    pub fn with_container(mut self, container: impl Into<PathBuf>) -> Self {
        self.container = container.into();
        self
    }

    pub fn with_expire(mut self, expire: Expire) -> Self {
        self.expire = expire;
        self
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn with_cleanup(mut self, cleanup: Expire) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn must_match(mut self, pattern: impl Into<String>) -> Self {
        self.must_match = Some(pattern.into());
        self
    }

    pub fn must_not_match(mut self, pattern: impl Into<String>) -> Self {
        self.must_not_match = Some(pattern.into());
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            container: PathBuf::from(DEFAULT_CONTAINER),
            expire: Expire::Weekly,
            history_limit: DEFAULT_HISTORY_LIMIT,
            cleanup: Expire::Nightly,
            must_match: None,
            must_not_match: None,
        }
    }
}
