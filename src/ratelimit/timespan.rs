//! Time span values used to configure rate windows.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Unit of time for rate windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum TimeUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
}

impl TimeUnit {
    /// Number of milliseconds in one unit.
    pub fn millis(&self) -> u64 {
        match self {
            TimeUnit::Millisecond => 1,
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
        }
    }

    /// Parse a unit name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "millisecond" => Some(TimeUnit::Millisecond),
            "second" => Some(TimeUnit::Second),
            "minute" => Some(TimeUnit::Minute),
            "hour" => Some(TimeUnit::Hour),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Millisecond => "millisecond",
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
        }
    }
}

// Unknown names count as milliseconds.
impl From<String> for TimeUnit {
    fn from(name: String) -> Self {
        TimeUnit::parse(&name).unwrap_or_else(|| {
            warn!(unit = %name, "Unknown time unit, treating as milliseconds");
            TimeUnit::Millisecond
        })
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A span of time: a raw millisecond count, a single unit, or a unit with a count.
///
/// Deserializes from `1500`, `"second"` or `{ unit: minute, count: 2 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timespan {
    Millis(u64),
    Unit(TimeUnit),
    Span {
        unit: TimeUnit,
        #[serde(alias = "term")]
        count: u64,
    },
}

impl Timespan {
    pub fn span(unit: TimeUnit, count: u64) -> Self {
        Timespan::Span { unit, count }
    }

    /// Length of this span in milliseconds.
    pub fn as_millis(&self) -> u64 {
        match self {
            Timespan::Millis(ms) => *ms,
            Timespan::Unit(unit) => unit.millis(),
            Timespan::Span { unit, count } => count.saturating_mul(unit.millis()),
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.as_millis())
    }
}

/// Convert a time span into milliseconds.
pub fn timespan_to_millis(timespan: &Timespan) -> u64 {
    timespan.as_millis()
}

impl From<u64> for Timespan {
    fn from(ms: u64) -> Self {
        Timespan::Millis(ms)
    }
}

impl From<TimeUnit> for Timespan {
    fn from(unit: TimeUnit) -> Self {
        Timespan::Unit(unit)
    }
}

impl From<Duration> for Timespan {
    fn from(duration: Duration) -> Self {
        Timespan::Millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timespan::Millis(ms) => write!(f, "{}ms", ms),
            Timespan::Unit(unit) => write!(f, "1 {}", unit),
            Timespan::Span { unit, count } => write!(f, "{} {}", count, unit),
        }
    }
}
