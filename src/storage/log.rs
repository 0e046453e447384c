//! Persistent Log Module
//!
//! A JSON object kept in memory and written back to its file only when it
//! changed since it was loaded.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::storage::fs;

// == Persistent Log ==
/// String-keyed JSON map backed by one file.
///
/// Mutations stay in memory. The map is written on [`flush`](Self::flush),
/// [`close`](Self::close), or when the log is dropped, and only if its
/// serialization differs from the last one read or written. A session that
/// only reads never touches the disk.
///
/// Two logs open on the same file race: the last flush wins.
#[derive(Debug)]
pub struct PersistentLog {
    path: PathBuf,
    data: Map<String, Value>,
    /// Serialized form of the map as last seen on disk
    snapshot: String,
    /// Set by `close`; a closed log is not flushed again on drop
    released: bool,
}

impl PersistentLog {
    // == Open ==
    /// Loads the log at `path`.
    ///
    /// A missing, unreadable, or malformed file yields an empty log.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = Self::load(&path);
        let snapshot = serialize(&data);

        Self {
            path,
            data,
            snapshot,
            released: false,
        }
    }

    fn load(path: &Path) -> Map<String, Value> {
        let Some(bytes) = fs::read(path) else {
            return Map::new();
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!("Ignoring non-object log at {}", path.display());
                Map::new()
            }
            Err(e) => {
                warn!("Ignoring unreadable log at {}: {}", path.display(), e);
                Map::new()
            }
        }
    }

    // == Scoped ==
    /// Opens the log, runs `f` on it and closes it.
    ///
    /// Returns `f`'s result together with whether the close wrote to disk.
    /// If `f` panics the log is still flushed on unwind.
    pub fn scoped<R>(path: impl Into<PathBuf>, f: impl FnOnce(&mut Self) -> R) -> Result<(R, bool)> {
        let mut log = Self::open(path);
        let result = f(&mut log);
        let flushed = log.close()?;
        Ok((result, flushed))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Reads ==
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_all(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    // == Writes ==
    /// Inserts or replaces one key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Replaces the whole map.
    pub fn set_all(&mut self, data: Map<String, Value>) -> &mut Self {
        self.data = data;
        self
    }

    /// Shallow merge; keys in `data` win.
    pub fn merge(&mut self, data: Map<String, Value>) -> &mut Self {
        self.data.extend(data);
        self
    }

    /// Removes a key if present.
    pub fn delete(&mut self, key: &str) -> &mut Self {
        self.data.remove(key);
        self
    }

    // == Persistence ==
    /// True when the in-memory map differs from what is on disk.
    pub fn is_dirty(&self) -> bool {
        serialize(&self.data) != self.snapshot
    }

    /// Writes the map if it is dirty. Returns whether a write happened.
    pub fn flush(&mut self) -> Result<bool> {
        let serialized = serialize(&self.data);
        if serialized == self.snapshot {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        fs::write_atomic(&self.path, serialized.as_bytes())
            .map_err(|e| CacheError::io(&self.path, e))?;

        debug!("Flushed log {}", self.path.display());
        self.snapshot = serialized;
        Ok(true)
    }

    /// Releases the log, flushing it if dirty. Returns whether a write happened.
    ///
    /// The flush is attempted once; a failure is returned and not retried on drop.
    pub fn close(mut self) -> Result<bool> {
        self.released = true;
        self.flush()
    }
}

impl Drop for PersistentLog {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.flush() {
            warn!("Failed to flush log on release: {}", e);
        }
    }
}

/// Deterministic pretty-printed form; object keys are kept sorted.
fn serialize(data: &Map<String, Value>) -> String {
    serde_json::to_string_pretty(data).unwrap_or_default()
}
