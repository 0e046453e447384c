//! Expiration Policy Module
//!
//! Maps an expiration frequency to the next aligned expiration instant.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;

// == Expire ==
/// How often cached content goes stale.
///
/// Keyword frequencies align to calendar boundaries in the clock's time zone.
/// `Seconds(n)` is a plain offset from the current instant.
///
/// Stored as its keyword string, or as an integer for `Seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ExpireRepr", into = "ExpireRepr")]
pub enum Expire {
    Minute,
    Hourly,
    Workday,
    Halfday,
    Nightly,
    Weekly,
    Monthly,
    Seconds(i64),
}

impl Expire {
    // == Keyword ==
    /// Returns the keyword for this frequency, or `None` for an explicit offset.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Expire::Minute => Some("minute"),
            Expire::Hourly => Some("hourly"),
            Expire::Workday => Some("workday"),
            Expire::Halfday => Some("halfday"),
            Expire::Nightly => Some("nightly"),
            Expire::Weekly => Some("weekly"),
            Expire::Monthly => Some("monthly"),
            Expire::Seconds(_) => None,
        }
    }

    /// Next expiration instant after `now`, as unix seconds.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> i64 {
        next_expire(self, now)
    }
}

impl FromStr for Expire {
    type Err = Infallible;

    /// Numeric text is an explicit offset in seconds, a known keyword selects
    /// its frequency, and anything else falls back to `Nightly`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Ok(seconds) = s.parse::<i64>() {
            return Ok(Expire::Seconds(seconds));
        }
        if let Ok(seconds) = s.parse::<f64>() {
            if seconds.is_finite() {
                return Ok(Expire::Seconds(seconds as i64));
            }
        }

        Ok(match s.to_ascii_lowercase().as_str() {
            "minute" => Expire::Minute,
            "hourly" => Expire::Hourly,
            "workday" => Expire::Workday,
            "halfday" => Expire::Halfday,
            "nightly" => Expire::Nightly,
            "weekly" => Expire::Weekly,
            "monthly" => Expire::Monthly,
            _ => Expire::Nightly,
        })
    }
}

impl fmt::Display for Expire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expire::Seconds(seconds) => write!(f, "{}", seconds),
            other => f.write_str(other.keyword().unwrap_or("nightly")),
        }
    }
}

// == Serialized Form ==
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ExpireRepr {
    Seconds(i64),
    Keyword(String),
}

impl From<ExpireRepr> for Expire {
    fn from(repr: ExpireRepr) -> Self {
        match repr {
            ExpireRepr::Seconds(seconds) => Expire::Seconds(seconds),
            ExpireRepr::Keyword(keyword) => keyword.parse().unwrap_or(Expire::Nightly),
        }
    }
}

impl From<Expire> for ExpireRepr {
    fn from(expire: Expire) -> Self {
        match expire {
            Expire::Seconds(seconds) => ExpireRepr::Seconds(seconds),
            other => ExpireRepr::Keyword(other.to_string()),
        }
    }
}

// == Next Expire ==
/// Computes the next aligned expiration instant (unix seconds) for `expire`.
///
/// # Alignment
/// - `Minute`: start of the current minute + 1 minute
/// - `Hourly` / `Workday` / `Halfday`: start of the current hour + 1 / 8 / 12 hours
/// - `Nightly`: next midnight
/// - `Weekly`: midnight of next Monday
/// - `Monthly`: midnight of the first day of next month
/// - `Seconds(n)`: `now + n`
pub fn next_expire<Tz: TimeZone>(expire: &Expire, now: &DateTime<Tz>) -> i64 {
    let timestamp = now.timestamp();
    let minute_start = timestamp - i64::from(now.second());
    let hour_start = minute_start - i64::from(now.minute()) * MINUTE;
    let today = now.date_naive();
    let tz = now.timezone();

    match *expire {
        Expire::Seconds(seconds) => timestamp.saturating_add(seconds),
        Expire::Minute => minute_start + MINUTE,
        Expire::Hourly => hour_start + HOUR,
        Expire::Workday => hour_start + 8 * HOUR,
        Expire::Halfday => hour_start + 12 * HOUR,
        Expire::Nightly => midnight(&tz, today + Duration::days(1)),
        Expire::Weekly => {
            let monday = today - Duration::days(i64::from(now.weekday().num_days_from_monday()));
            midnight(&tz, monday + Duration::days(7))
        }
        Expire::Monthly => {
            let (year, month) = if today.month() == 12 {
                (today.year() + 1, 1)
            } else {
                (today.year(), today.month() + 1)
            };
            let first = NaiveDate::from_ymd_opt(year, month, 1)
                .unwrap_or(today + Duration::days(31));
            midnight(&tz, first)
        }
    }
}

/// Unix seconds of local midnight on `date`.
///
/// Zones that skip midnight for a DST change resolve to the first valid instant after it.
fn midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> i64 {
    let naive = date.and_time(NaiveTime::MIN);

    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| naive.and_utc().timestamp())
}
