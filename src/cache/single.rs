//! Single Value Cache Module
//!
//! One current value per key, overwritten on every write, with its own
//! expiration schedule and no history.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::codec::{Codec, JsonCodec};
use crate::cache::validate_key;
use crate::clock::{Clock, SystemClock};
use crate::config::CacheOptions;
use crate::error::{CacheError, Result};
use crate::expire::{next_expire, Expire};
use crate::storage::{fs, PersistentLog};

/// File name of the metadata log inside a key directory.
pub const META_FILE: &str = ".meta";

/// File name of the stored value inside a key directory.
pub const VALUE_FILE: &str = "value";

// == Value Cache ==
/// Cache holding exactly one value for a key.
///
/// Unlike [`HistoryCache`](crate::cache::HistoryCache) it keeps no history,
/// applies no content filters and never reconciles stored state against its
/// options: changing `expire` only affects the schedule of the next write.
///
/// # Layout
/// ```text
/// <container>/<key>/.meta   key, expire, expireTime (JSON)
/// <container>/<key>/value   current value
/// ```
#[derive(Debug)]
pub struct ValueCache<C: Codec = JsonCodec> {
    key: String,
    expire: Expire,
    codec: C,
    now: DateTime<Local>,
    dir: PathBuf,
}

impl ValueCache<JsonCodec> {
    // == Constructor ==
    /// Opens the cache for `key` with JSON values and the system clock.
    pub fn open(key: impl Into<String>, options: &CacheOptions) -> Result<Self> {
        Self::open_with(key, options, JsonCodec, &SystemClock)
    }
}

impl<C: Codec> ValueCache<C> {
    /// Opens the cache for `key` with an explicit codec and clock.
    ///
    /// Nothing touches the disk until the first write.
    pub fn open_with(
        key: impl Into<String>,
        options: &CacheOptions,
        codec: C,
        clock: &impl Clock,
    ) -> Result<Self> {
        let key = key.into();
        validate_key(&key)?;
        let dir = fs::path(&options.container, [key.as_str()]);

        Ok(Self {
            key,
            expire: options.expire,
            codec,
            now: clock.now(),
            dir,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    fn value_path(&self) -> PathBuf {
        self.dir.join(VALUE_FILE)
    }

    /// Stored expiration instant, `None` if nothing was ever written.
    fn expire_time(&self) -> Option<i64> {
        PersistentLog::open(self.meta_path())
            .get("expireTime")
            .and_then(Value::as_i64)
    }

    // == Set ==
    /// Replaces the stored value and reschedules its expiration.
    pub fn set<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let bytes = self.codec.encode(value)?;
        let expire = serde_json::to_value(self.expire)?;
        let expire_time = next_expire(&self.expire, &self.now);

        fs::create_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        let value_path = self.value_path();
        fs::write_with_lock(&value_path, &bytes).map_err(|e| CacheError::io(&value_path, e))?;

        let key = self.key.clone();
        PersistentLog::scoped(self.meta_path(), |log| {
            log.set("key", key)
                .set("expire", expire)
                .set("expireTime", expire_time);
        })?;

        debug!("Stored value for '{}' until {}", self.key, expire_time);
        Ok(())
    }

    // == Get ==
    /// Returns the value, or `None` if absent, expired, unreadable or not
    /// decodable as `T`.
    pub fn get<T: DeserializeOwned>(&self) -> Option<T> {
        if self.is_expired() {
            return None;
        }

        let path = self.value_path();
        let bytes = fs::read(&path)?;
        match self.codec.decode(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Value file {} could not be decoded: {}", path.display(), e);
                None
            }
        }
    }

    // == Is Expired ==
    /// True when the value is stale or was never written.
    pub fn is_expired(&self) -> bool {
        match self.expire_time() {
            Some(expire_time) => expire_time <= self.now.timestamp(),
            None => true,
        }
    }

    // == Invalidate ==
    /// Marks the stored value stale. Does nothing if no value exists.
    pub fn invalidate(&mut self) -> Result<()> {
        PersistentLog::scoped(self.meta_path(), |log| {
            if log.contains_key("expireTime") {
                log.set("expireTime", 0);
            }
        })?;
        Ok(())
    }

    // == Clear ==
    /// Deletes the key directory. Clearing twice succeeds.
    pub fn clear(&mut self) -> Result<()> {
        fs::delete_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        info!("Cleared cache '{}'", self.key);
        Ok(())
    }
}
