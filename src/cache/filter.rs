//! Content Filter Module
//!
//! Regex admission rules applied to values before they are stored.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CacheError, Result};

// == Content Filter ==
/// A value is admitted when it matches `must_match` (if set) and does not
/// match `must_not_match` (if set).
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    must_match: Option<Regex>,
    must_not_match: Option<Regex>,
}

impl ContentFilter {
    /// Compiles the configured patterns.
    pub fn new(must_match: Option<&str>, must_not_match: Option<&str>) -> Result<Self> {
        Ok(Self {
            must_match: must_match.map(Regex::new).transpose()?,
            must_not_match: must_not_match.map(Regex::new).transpose()?,
        })
    }

    /// True when no pattern is configured.
    pub fn is_empty(&self) -> bool {
        self.must_match.is_none() && self.must_not_match.is_none()
    }

    /// Checks `text` against both patterns.
    pub fn check(&self, text: &str) -> Result<()> {
        if let Some(re) = &self.must_match {
            if !re.is_match(text) {
                return Err(CacheError::ContentRejected(format!(
                    "content does not match /{}/",
                    re.as_str()
                )));
            }
        }

        if let Some(re) = &self.must_not_match {
            if re.is_match(text) {
                return Err(CacheError::ContentRejected(format!(
                    "content matches /{}/",
                    re.as_str()
                )));
            }
        }

        Ok(())
    }

    /// Checks a value by its text form, see [`content_text`].
    pub fn check_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        self.check(&content_text(value)?)
    }
}

/// Text a filter sees for `value`: a string as-is, anything else as compact JSON.
pub fn content_text<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(match serde_json::to_value(value)? {
        Value::String(text) => text,
        other => other.to_string(),
    })
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_filter_admits_everything() {
        let filter = ContentFilter::new(None, None).unwrap();
        assert!(filter.is_empty());
        assert!(filter.check("anything").is_ok());
    }

    #[test]
    fn test_must_match() {
        let filter = ContentFilter::new(Some("^OK"), None).unwrap();
        assert!(filter.check("OK: data").is_ok());
        assert!(matches!(
            filter.check("fail: data"),
            Err(CacheError::ContentRejected(_))
        ));
    }

    #[test]
    fn test_must_not_match() {
        let filter = ContentFilter::new(None, Some("(?i)error")).unwrap();
        assert!(filter.check("all good").is_ok());
        assert!(matches!(
            filter.check("Error: upstream timeout"),
            Err(CacheError::ContentRejected(_))
        ));
    }

    #[test]
    fn test_both_patterns() {
        let filter = ContentFilter::new(Some("^OK"), Some("partial")).unwrap();
        assert!(filter.check("OK complete").is_ok());
        assert!(filter.check("OK partial").is_err());
        assert!(filter.check("complete").is_err());
    }

    #[test]
    fn test_invalid_pattern() {
        let result = ContentFilter::new(Some("(unclosed"), None);
        assert!(matches!(result, Err(CacheError::InvalidPattern(_))));
    }

    #[test]
    fn test_content_text_of_string_is_bare() {
        assert_eq!(content_text("OK: data").unwrap(), "OK: data");
    }

    #[test]
    fn test_content_text_of_structured_value_is_json() {
        let text = content_text(&json!({"status": "OK"})).unwrap();
        assert_eq!(text, r#"{"status":"OK"}"#);
        assert_eq!(content_text(&42).unwrap(), "42");
    }

    #[test]
    fn test_check_value_on_structure() {
        let filter = ContentFilter::new(Some(r#""status":"OK""#), None).unwrap();
        assert!(filter.check_value(&json!({"status": "OK"})).is_ok());
        assert!(filter.check_value(&json!({"status": "DOWN"})).is_err());
    }
}
