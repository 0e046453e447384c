//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the history cache against arbitrary values and
//! write sequences.

use proptest::prelude::*;
use serde_json::Map;
use tempfile::TempDir;

use crate::cache::{HistoryCache, JsonCodec, ValueCache, CATALOG_FILE};
use crate::clock::FixedClock;
use crate::config::CacheOptions;
use crate::error::CacheError;
use crate::storage::fs;

// == Test Configuration ==
const TEST_NOW: i64 = 1_710_326_241;
const TEST_KEY: &str = "prop_key";

fn open(dir: &TempDir, options: CacheOptions) -> HistoryCache {
    HistoryCache::open_with(
        TEST_KEY,
        options.with_container(dir.path()),
        JsonCodec,
        &FixedClock::at_timestamp(TEST_NOW),
    )
    .unwrap()
}

fn value_file_count(cache: &HistoryCache) -> usize {
    fs::list_dir(cache.cache_dir())
        .unwrap()
        .iter()
        .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some(CATALOG_FILE))
        .count()
}

// == Strategies ==
/// Generates arbitrary printable values
fn value_strategy() -> impl Strategy<Value = String> {
    "\\PC{0,128}".prop_map(|s| s)
}

/// Generates a record of mixed field types
fn record_strategy() -> impl Strategy<Value = (String, i64, Vec<bool>)> {
    ("[a-z]{1,16}", any::<i64>(), prop::collection::vec(any::<bool>(), 0..8))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Storing a value and reading it back before expiry returns the same value.
    #[test]
    fn prop_roundtrip_storage(value in value_strategy()) {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir, CacheOptions::default());

        cache.set(&value, Map::new()).unwrap();
        let retrieved: Option<String> = cache.get().unwrap();
        prop_assert_eq!(retrieved, Some(value));
    }

    // Structured values survive the round trip through their file.
    #[test]
    fn prop_roundtrip_structured(record in record_strategy()) {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir, CacheOptions::default());

        cache.set(&record, Map::new()).unwrap();
        let retrieved: Option<(String, i64, Vec<bool>)> = cache.get().unwrap();
        prop_assert_eq!(retrieved, Some(record));
    }

    // N writes with limit H keep min(N, H) states and serve the last write.
    #[test]
    fn prop_history_bound(
        values in prop::collection::vec(value_strategy(), 1..16),
        limit in 1usize..6
    ) {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir, CacheOptions::default().with_history_limit(limit));

        for value in &values {
            cache.set(value, Map::new()).unwrap();
            prop_assert!(cache.history().unwrap().len() <= limit);
        }

        prop_assert_eq!(cache.history().unwrap().len(), values.len().min(limit));
        let latest: Option<String> = cache.get().unwrap();
        prop_assert_eq!(latest.as_ref(), values.last());
    }

    // With cleanup always due, only files referenced by history remain.
    #[test]
    fn prop_cleanup_reconciles_files(
        count in 1usize..12,
        limit in 1usize..5
    ) {
        let dir = TempDir::new().unwrap();
        let options = CacheOptions::default()
            .with_history_limit(limit)
            .with_cleanup(crate::expire::Expire::Seconds(0));
        let mut cache = open(&dir, options);

        for i in 0..count {
            cache.set(&i, Map::new()).unwrap();
        }

        prop_assert_eq!(value_file_count(&cache), count.min(limit));
        let records = cache.history().unwrap().to_vec();
        for record in records {
            prop_assert!(cache.cache_dir().join(&record.file).exists());
        }
    }

    // Values refused by the filter leave the history untouched.
    #[test]
    fn prop_filter_rejection_is_side_effect_free(
        accepted in "OK[a-z ]{0,32}",
        rejected in "[a-z][a-z ]{0,32}"
    ) {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir, CacheOptions::default().must_match("^OK"));

        cache.set(&accepted, Map::new()).unwrap();
        let before = cache.history().unwrap().to_vec();

        let result = cache.set(&rejected, Map::new());
        prop_assert!(matches!(result, Err(CacheError::ContentRejected(_))));
        prop_assert_eq!(cache.history().unwrap().to_vec(), before);
        prop_assert_eq!(value_file_count(&cache), 1);
    }

    // The single-value cache always serves the most recent write.
    #[test]
    fn prop_value_cache_overwrite(values in prop::collection::vec(value_strategy(), 1..8)) {
        let dir = TempDir::new().unwrap();
        let options = CacheOptions::default().with_container(dir.path());
        let mut cache = ValueCache::open_with(
            TEST_KEY,
            &options,
            JsonCodec,
            &FixedClock::at_timestamp(TEST_NOW),
        )
        .unwrap();

        for value in &values {
            cache.set(value).unwrap();
        }
        let latest = cache.get::<String>();
        prop_assert_eq!(latest.as_ref(), values.last());
    }
}
