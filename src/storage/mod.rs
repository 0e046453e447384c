//! Storage Module
//!
//! Filesystem helpers and the JSON-backed persistent log used for cache metadata.

pub mod fs;
mod log;

pub use self::log::PersistentLog;
