//! Catalog Module
//!
//! Persisted metadata for one history cache key: the policy it was created
//! with, its expiration and cleanup schedule, and the retained history.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::CacheOptions;
use crate::error::Result;
use crate::expire::{next_expire, Expire};
use crate::storage::PersistentLog;

/// File name of the catalog inside a key directory.
pub const CATALOG_FILE: &str = ".catalog";

/// Catalog fields that must equal the handle's configuration for stored
/// state to be reused.
pub const MATCHED_PROPERTIES: [&str; 4] = ["key", "expire", "mustMatch", "mustNotMatch"];

// == History Record ==
/// One retained value: its file, when it was written, and caller fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Base name of the value file inside the key directory
    pub file: String,
    /// Unix seconds at which the value was written
    pub time: i64,
    /// Caller-supplied fields, stored alongside `file` and `time`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HistoryRecord {
    /// `file` and `time` entries in `extra` are dropped.
    pub fn new(file: impl Into<String>, time: i64, mut extra: Map<String, Value>) -> Self {
        extra.remove("file");
        extra.remove("time");
        Self {
            file: file.into(),
            time,
            extra,
        }
    }
}

// == Catalog ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub key: String,
    pub expire: Expire,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_not_match: Option<String>,
    pub created_time: i64,
    pub expire_time: i64,
    pub cleanup_time: i64,
    pub history_limit: usize,
    /// Most recent first
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
}

impl Catalog {
    // == Constructor ==
    /// Fresh catalog for `key`, scheduled from `now`.
    pub fn fresh<Tz: TimeZone>(key: &str, options: &CacheOptions, now: &DateTime<Tz>) -> Self {
        Self {
            key: key.to_string(),
            expire: options.expire,
            must_match: options.must_match.clone(),
            must_not_match: options.must_not_match.clone(),
            created_time: now.timestamp(),
            expire_time: next_expire(&options.expire, now),
            cleanup_time: next_expire(&options.cleanup, now),
            history_limit: options.history_limit,
            history: Vec::new(),
        }
    }

    // == Conversion ==
    /// Reads a catalog from a log map; `None` if the map does not hold one.
    pub fn from_map(map: Map<String, Value>) -> Option<Self> {
        if map.is_empty() {
            return None;
        }
        serde_json::from_value(Value::Object(map)).ok()
    }

    /// Reads the catalog stored at `path` without modifying it.
    pub fn load(path: &Path) -> Option<Self> {
        Self::from_map(PersistentLog::open(path).get_all().clone())
    }

    pub fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    // == Validity ==
    /// True when every matched property equals the given configuration.
    pub fn matches(&self, key: &str, options: &CacheOptions) -> bool {
        self.key == key
            && self.expire == options.expire
            && self.must_match == options.must_match
            && self.must_not_match == options.must_not_match
    }

    // == Schedule ==
    pub fn is_expired(&self, now: i64) -> bool {
        self.expire_time <= now
    }

    pub fn cleanup_due(&self, now: i64) -> bool {
        self.cleanup_time <= now
    }

    // == History ==
    /// Prepends `record` and drops records beyond the limit.
    ///
    /// Files of dropped records stay on disk until the next cleanup.
    pub fn push(&mut self, record: HistoryRecord) {
        self.history.insert(0, record);
        self.history.truncate(self.history_limit);
    }

    /// Most recent record, if any.
    pub fn latest(&self) -> Option<&HistoryRecord> {
        self.history.first()
    }

    /// File names referenced by the retained history window.
    pub fn retained_files(&self) -> HashSet<&str> {
        self.history
            .iter()
            .take(self.history_limit)
            .map(|record| record.file.as_str())
            .collect()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, 10, 37, 21).unwrap()
    }

    fn options() -> CacheOptions {
        CacheOptions::default().with_expire(Expire::Hourly)
    }

    fn record(file: &str) -> HistoryRecord {
        HistoryRecord::new(file, 1, Map::new())
    }

    #[test]
    fn test_fresh_catalog() {
        let catalog = Catalog::fresh("reports", &options(), &now());

        assert_eq!(catalog.key, "reports");
        assert_eq!(catalog.expire, Expire::Hourly);
        assert_eq!(catalog.created_time, now().timestamp());
        assert_eq!(catalog.expire_time, next_expire(&Expire::Hourly, &now()));
        assert_eq!(catalog.cleanup_time, next_expire(&Expire::Nightly, &now()));
        assert_eq!(catalog.history_limit, 10);
        assert!(catalog.history.is_empty());
    }

    #[test]
    fn test_serialized_field_names() {
        let catalog = Catalog::fresh("reports", &options().must_match("^OK"), &now());
        let map = catalog.to_map().unwrap();

        for field in MATCHED_PROPERTIES {
            if field != "mustNotMatch" {
                assert!(map.contains_key(field), "missing {}", field);
            }
        }
        assert!(!map.contains_key("mustNotMatch"));
        assert_eq!(map["expire"], json!("hourly"));
        assert!(map.contains_key("createdTime"));
        assert!(map.contains_key("expireTime"));
        assert!(map.contains_key("cleanupTime"));
        assert!(map.contains_key("historyLimit"));
    }

    #[test]
    fn test_map_conversion_keeps_history_extras() {
        let mut catalog = Catalog::fresh("reports", &options(), &now());
        let mut extra = Map::new();
        extra.insert("source".to_string(), json!("api"));
        catalog.push(HistoryRecord::new("abc", 5, extra));

        let map = catalog.to_map().unwrap();
        assert_eq!(map["history"][0], json!({"file": "abc", "time": 5, "source": "api"}));

        let restored = Catalog::from_map(map).unwrap();
        assert_eq!(restored, catalog);
    }

    #[test]
    fn test_from_map_rejects_empty_and_partial() {
        assert!(Catalog::from_map(Map::new()).is_none());

        let mut partial = Map::new();
        partial.insert("key".to_string(), json!("reports"));
        assert!(Catalog::from_map(partial).is_none());
    }

    #[test]
    fn test_record_extra_cannot_shadow_file() {
        let mut extra = Map::new();
        extra.insert("file".to_string(), json!("elsewhere"));
        extra.insert("time".to_string(), json!(0));
        extra.insert("status".to_string(), json!(200));

        let record = HistoryRecord::new("real", 9, extra);
        assert_eq!(record.file, "real");
        assert_eq!(record.time, 9);
        assert_eq!(record.extra.len(), 1);
    }

    #[test]
    fn test_matches_compares_matched_properties() {
        let catalog = Catalog::fresh("reports", &options(), &now());

        assert!(catalog.matches("reports", &options()));
        assert!(catalog.matches("reports", &options().with_history_limit(3)));
        assert!(!catalog.matches("other", &options()));
        assert!(!catalog.matches("reports", &options().with_expire(Expire::Weekly)));
        assert!(!catalog.matches("reports", &options().must_match("^OK")));
        assert!(!catalog.matches("reports", &options().must_not_match("err")));
    }

    #[test]
    fn test_expiry_boundary() {
        let mut catalog = Catalog::fresh("reports", &options(), &now());
        catalog.expire_time = 100;
        assert!(!catalog.is_expired(99));
        assert!(catalog.is_expired(100));
        assert!(catalog.is_expired(101));
    }

    #[test]
    fn test_push_is_most_recent_first_and_bounded() {
        let mut catalog = Catalog::fresh("reports", &options().with_history_limit(2), &now());
        catalog.push(record("a"));
        catalog.push(record("b"));
        catalog.push(record("c"));

        let files: Vec<&str> = catalog.history.iter().map(|r| r.file.as_str()).collect();
        assert_eq!(files, vec!["c", "b"]);
        assert_eq!(catalog.latest().map(|r| r.file.as_str()), Some("c"));
    }

    #[test]
    fn test_retained_files_respects_limit() {
        let mut catalog = Catalog::fresh("reports", &options(), &now());
        catalog.push(record("a"));
        catalog.push(record("b"));
        catalog.push(record("c"));
        catalog.history_limit = 2;

        let retained = catalog.retained_files();
        assert_eq!(retained.len(), 2);
        assert!(retained.contains("c"));
        assert!(retained.contains("b"));
        assert!(!retained.contains("a"));
    }
}
