//! Clock Module
//!
//! Source of the wall-clock instant a cache handle works against.

use chrono::{DateTime, Local};

/// Supplies the current local time.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;

    /// Current unix timestamp in seconds.
    fn timestamp(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock frozen at a chosen instant, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Local>);

impl FixedClock {
    pub fn new(at: DateTime<Local>) -> Self {
        Self(at)
    }

    /// Clock frozen at `seconds` after the unix epoch.
    pub fn at_timestamp(seconds: i64) -> Self {
        let at = DateTime::from_timestamp(seconds, 0).unwrap_or_default();
        Self(at.with_timezone(&Local))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}
