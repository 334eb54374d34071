//! Regions and time windows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Milliseconds in one UTC day.
pub const DAY_MS: i64 = 86_400_000;

/// An operating territory with its own live-source endpoint.
///
/// Regions are fully independent: nothing in the depot reads one region's
/// state while handling another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "IND")]
    Ind,
    #[serde(rename = "NASA")]
    Nasa,
    #[serde(rename = "EU")]
    Eu,
    #[serde(rename = "FML")]
    Fml,
}

/// Display unit for fuel amounts. Only the presentation side looks at this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Liters,
    Gallons,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::Ind, Region::Nasa, Region::Eu, Region::Fml];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Ind => "IND",
            Region::Nasa => "NASA",
            Region::Eu => "EU",
            Region::Fml => "FML",
        }
    }

    pub fn unit(&self) -> Unit {
        match self {
            Region::Nasa => Unit::Gallons,
            Region::Ind | Region::Eu | Region::Fml => Unit::Liters,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IND" => Ok(Region::Ind),
            "NASA" => Ok(Region::Nasa),
            "EU" => Ok(Region::Eu),
            "FML" => Ok(Region::Fml),
            other => Err(Error::Config(format!(
                "Unknown region '{}' (expected IND, NASA, EU or FML)",
                other
            ))),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Liters => f.write_str("Liters"),
            Unit::Gallons => f.write_str("Gallons"),
        }
    }
}

/// An inclusive millisecond range `[start_ms, end_ms]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Window {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl Window {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    /// The dashboard retention window as of `now`.
    ///
    /// The last full day shown is `lag_days` before `now`; the window starts at
    /// midnight `span_days` before that day and ends at the midnight after it.
    pub fn retention(now: DateTime<Utc>, lag_days: u32, span_days: u32) -> Self {
        let end_day = (now - TimeDelta::days(lag_days as i64)).date_naive();
        let start_day = end_day - TimeDelta::days(span_days as i64);
        Self {
            start_ms: midnight_ms(start_day),
            end_ms: midnight_ms(end_day + TimeDelta::days(1)),
        }
    }

    pub fn contains(&self, time_ms: i64) -> bool {
        self.start_ms <= time_ms && time_ms <= self.end_ms
    }

    /// A window starting at `start_ms` with the same end.
    pub fn since(&self, start_ms: i64) -> Self {
        Self {
            start_ms,
            end_ms: self.end_ms,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (format_ms(self.start_ms), format_ms(self.end_ms)) {
            (Some(start), Some(end)) => write!(f, "{} .. {}", start, end),
            _ => write!(f, "{} .. {}", self.start_ms, self.end_ms),
        }
    }
}

/// Epoch millis of midnight UTC on `day`.
pub fn midnight_ms(day: NaiveDate) -> i64 {
    day.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// UTC calendar day containing `time_ms`.
pub fn day_of(time_ms: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(time_ms).map(|dt| dt.date_naive())
}

/// Human-readable UTC timestamp for log lines and CLI output.
pub fn format_ms(time_ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(time_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}
