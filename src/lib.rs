//! Filecache - A filesystem-backed value cache
//!
//! Stores serializable values under a string key on local disk, with
//! calendar-aligned expiration and a bounded history of past values.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod expire;
pub mod storage;

pub use cache::{HistoryCache, HistoryRecord, ValueCache};
pub use config::CacheOptions;
pub use error::{CacheError, Result};
pub use expire::Expire;
pub use storage::PersistentLog;
