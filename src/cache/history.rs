//! History Cache Module
//!
//! Cache entry manager that keeps the last N written values for one key,
//! each in its own file, indexed by a catalog.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::cache::catalog::{Catalog, HistoryRecord, CATALOG_FILE};
use crate::cache::codec::{Codec, JsonCodec};
use crate::cache::filter::ContentFilter;
use crate::cache::validate_key;
use crate::clock::{Clock, SystemClock};
use crate::config::CacheOptions;
use crate::error::{CacheError, Result};
use crate::expire::next_expire;
use crate::storage::{fs, PersistentLog};

// == History Cache ==
/// Time-limited cache for one key with a bounded history of past values.
///
/// # Layout
/// ```text
/// <container>/<key>/.catalog     catalog (JSON)
/// <container>/<key>/<random>     one file per retained value
/// ```
///
/// Opening a handle reconciles the stored catalog with the options: if the
/// key, expiration frequency or content filters differ, the key directory is
/// wiped and a fresh catalog written.
///
/// The current time is read once, when the handle opens, and used for every
/// comparison the handle makes.
#[derive(Debug)]
pub struct HistoryCache<C: Codec = JsonCodec> {
    key: String,
    options: CacheOptions,
    filter: ContentFilter,
    codec: C,
    now: DateTime<Local>,
    dir: PathBuf,
    /// `None` until loaded, and again after `clear`
    catalog: Option<Catalog>,
}

impl HistoryCache<JsonCodec> {
    // == Constructor ==
    /// Opens the cache for `key` with JSON values and the system clock.
    pub fn open(key: impl Into<String>, options: CacheOptions) -> Result<Self> {
        Self::open_with(key, options, JsonCodec, &SystemClock)
    }

    // == Inspect ==
    /// Reads the stored catalog for `key` as it is on disk.
    ///
    /// Unlike [`open`](Self::open) this never reconciles, so options that
    /// differ from the stored policy leave the key directory untouched.
    /// Only `container` is read from `options`.
    pub fn stored_catalog(key: &str, options: &CacheOptions) -> Result<Option<Catalog>> {
        validate_key(key)?;
        let dir = fs::path(&options.container, [key]);
        Ok(Catalog::load(&dir.join(CATALOG_FILE)))
    }
}

impl<C: Codec> HistoryCache<C> {
    /// Opens the cache for `key` with an explicit codec and clock.
    ///
    /// # Errors
    /// - `Configuration` if the key is empty or not a plain name, or the
    ///   history limit is zero
    /// - `InvalidPattern` if a content filter does not compile
    /// - `Io` if the key directory cannot be (re)initialized
    pub fn open_with(
        key: impl Into<String>,
        options: CacheOptions,
        codec: C,
        clock: &impl Clock,
    ) -> Result<Self> {
        let key = key.into();
        validate_key(&key)?;

        if options.history_limit == 0 {
            return Err(CacheError::Configuration(
                "history limit must be at least 1".to_string(),
            ));
        }

        let filter = ContentFilter::new(
            options.must_match.as_deref(),
            options.must_not_match.as_deref(),
        )?;
        let dir = fs::path(&options.container, [key.as_str()]);

        let mut cache = Self {
            key,
            options,
            filter,
            codec,
            now: clock.now(),
            dir,
            catalog: None,
        };
        cache.ensure_loaded()?;
        Ok(cache)
    }

    // == Accessors ==
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Directory holding this key's catalog and value files.
    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.dir.join(CATALOG_FILE)
    }

    /// The instant this handle works against, as unix seconds.
    pub fn now(&self) -> i64 {
        self.now.timestamp()
    }

    pub fn catalog(&mut self) -> Result<&Catalog> {
        self.ensure_loaded().map(|catalog| &*catalog)
    }

    pub fn history(&mut self) -> Result<&[HistoryRecord]> {
        Ok(&self.ensure_loaded()?.history)
    }

    // == Ensure Loaded ==
    /// Loads and reconciles the catalog unless it is already in memory.
    ///
    /// Runs once when the handle opens and again on the first operation
    /// after [`clear`](Self::clear).
    pub fn ensure_loaded(&mut self) -> Result<&mut Catalog> {
        let catalog = match self.catalog.take() {
            Some(catalog) => catalog,
            None => self.reconcile()?,
        };
        Ok(self.catalog.insert(catalog))
    }

    fn reconcile(&self) -> Result<Catalog> {
        let path = self.catalog_path();
        let stored = Catalog::load(&path);

        match stored {
            Some(mut catalog) if catalog.matches(&self.key, &self.options) => {
                if catalog.history_limit != self.options.history_limit {
                    debug!(
                        "Catalog for '{}': history limit {} -> {}",
                        self.key, catalog.history_limit, self.options.history_limit
                    );
                    catalog.history_limit = self.options.history_limit;
                    // Files of dropped states are removed by the next cleanup
                    catalog.history.truncate(catalog.history_limit);
                }
                Ok(catalog)
            }
            stored => {
                if stored.is_some() {
                    info!(
                        "Catalog for '{}' does not match its configuration, reinitializing",
                        self.key
                    );
                } else {
                    debug!("Initializing catalog for '{}'", self.key);
                }

                fs::delete_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
                fs::create_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

                let catalog = Catalog::fresh(&self.key, &self.options, &self.now);
                write_catalog(&path, &catalog)?;
                Ok(catalog)
            }
        }
    }

    /// Writes the in-memory catalog if it differs from the stored one.
    fn persist(&self) -> Result<bool> {
        match &self.catalog {
            Some(catalog) => write_catalog(&self.catalog_path(), catalog),
            None => Ok(false),
        }
    }

    // == Is Expired ==
    /// True when the current content is stale.
    pub fn is_expired(&mut self) -> Result<bool> {
        let now = self.now();
        Ok(self.ensure_loaded()?.is_expired(now))
    }

    // == Set ==
    /// Stores `value` as the newest history state.
    ///
    /// `extra` fields are recorded alongside the state in the catalog.
    /// Runs [`cleanup`](Self::cleanup) afterwards.
    ///
    /// # Errors
    /// - `ContentRejected` if a content filter refuses the value; nothing is written
    /// - `Io` if the value file cannot be written
    pub fn set<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
        extra: Map<String, Value>,
    ) -> Result<HistoryRecord> {
        if let Err(e) = self.filter.check_value(value) {
            debug!("Refusing value for '{}': {}", self.key, e);
            return Err(e);
        }

        let bytes = self.codec.encode(value)?;
        self.ensure_loaded()?;

        let file = fs::available_name(&self.dir);
        let path = self.dir.join(&file);
        fs::write(&path, &bytes).map_err(|e| CacheError::io(&path, e))?;

        self.add_to_history(&file, extra)
    }

    // == Add To History ==
    /// Records a value file already written into the key directory as the
    /// newest history state, reschedules expiration and persists the catalog.
    ///
    /// # Errors
    /// - `Configuration` if `file` is not a plain value file name
    /// - `Io` if `file` is not an existing regular file in the key directory
    pub fn add_to_history(
        &mut self,
        file: &str,
        extra: Map<String, Value>,
    ) -> Result<HistoryRecord> {
        if file.is_empty()
            || file == "."
            || file == ".."
            || file == CATALOG_FILE
            || file.contains(['/', '\\', '\0'])
        {
            return Err(CacheError::Configuration(format!(
                "'{}' is not a value file name",
                file
            )));
        }
        let path = self.dir.join(file);
        if !path.is_file() {
            return Err(CacheError::io(
                &path,
                io::Error::new(io::ErrorKind::NotFound, "value file does not exist"),
            ));
        }

        let record = HistoryRecord::new(file, self.now(), extra);
        let expire_time = next_expire(&self.options.expire, &self.now);

        let catalog = self.ensure_loaded()?;
        catalog.push(record.clone());
        catalog.expire_time = expire_time;
        self.persist()?;

        if let Err(e) = self.cleanup() {
            warn!("Cleanup after set failed for '{}': {}", self.key, e);
        }

        Ok(record)
    }

    // == Get ==
    /// Returns the newest value, or `None` if expired, empty, unreadable or
    /// not decodable as `T`.
    pub fn get<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        if self.is_expired()? {
            debug!("Cache '{}' is expired", self.key);
            return Ok(None);
        }
        Ok(self.read_state(0))
    }

    /// Returns the history state at `index` (0 is newest), ignoring expiry.
    pub fn get_at<T: DeserializeOwned>(&mut self, index: usize) -> Result<Option<T>> {
        self.ensure_loaded()?;
        Ok(self.read_state(index))
    }

    fn read_state<T: DeserializeOwned>(&self, index: usize) -> Option<T> {
        let record = self.catalog.as_ref()?.history.get(index)?;
        let path = self.dir.join(&record.file);

        let Some(bytes) = fs::read(&path) else {
            warn!("History file {} is unreadable", path.display());
            return None;
        };

        match self.codec.decode(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("History file {} could not be decoded: {}", path.display(), e);
                None
            }
        }
    }

    // == Cleanup ==
    /// Deletes files no longer referenced by the retained history, if due.
    ///
    /// The trimmed catalog and its next cleanup time are persisted before
    /// any file is deleted. Files left behind by interrupted writes are
    /// removed too. Returns whether a cleanup ran.
    pub fn cleanup(&mut self) -> Result<bool> {
        let now = self.now();
        let cleanup_time = next_expire(&self.options.cleanup, &self.now);

        let catalog = self.ensure_loaded()?;
        if !catalog.cleanup_due(now) {
            return Ok(false);
        }

        catalog.history.truncate(catalog.history_limit);
        catalog.cleanup_time = cleanup_time;
        let retained: HashSet<String> = catalog
            .retained_files()
            .into_iter()
            .map(str::to_owned)
            .collect();
        self.persist()?;

        let files = fs::list_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        let mut removed = 0;
        for path in files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name == CATALOG_FILE || retained.contains(name) {
                continue;
            }
            match fs::delete_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            info!("Cleanup for '{}': removed {} files", self.key, removed);
        } else {
            debug!("Cleanup for '{}': nothing to remove", self.key);
        }
        Ok(true)
    }

    // == Invalidate ==
    /// Marks the current content stale regardless of its schedule.
    pub fn invalidate(&mut self) -> Result<()> {
        self.ensure_loaded()?.expire_time = 0;
        self.persist()?;
        Ok(())
    }

    // == Clear ==
    /// Deletes the key directory with every value file and the catalog.
    ///
    /// Clearing an already cleared cache succeeds. The next operation on
    /// this handle initializes a fresh catalog.
    pub fn clear(&mut self) -> Result<()> {
        fs::delete_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        self.catalog = None;
        info!("Cleared cache '{}'", self.key);
        Ok(())
    }
}

fn write_catalog(path: &Path, catalog: &Catalog) -> Result<bool> {
    let map = catalog.to_map()?;
    let ((), flushed) = PersistentLog::scoped(path, |log| {
        log.set_all(map);
    })?;
    Ok(flushed)
}
