//! Timeframes and the period-boundary arithmetic used by resampling.

use crate::service::FeedError;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M10,
    M15,
    M30,
    H1,
    H2,
    H4,
    H12,
    D1,
    W1,
}

impl Timeframe {
    pub fn duration(self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M10 => Duration::minutes(10),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::M30 => Duration::minutes(30),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H2 => Duration::hours(2),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::H12 => Duration::hours(12),
            Timeframe::D1 => Duration::days(1),
            Timeframe::W1 => Duration::weeks(1),
        }
    }

    /// Whether `t` falls on the start of one of this timeframe's periods.
    ///
    /// The rule is granularity-specific modulo arithmetic: minutes for
    /// intraday frames, hours for multi-hour frames, midnight for daily,
    /// Sunday midnight for weekly.
    pub fn starts_period(self, t: DateTime<Utc>) -> bool {
        match self {
            Timeframe::M1 => t.second() == 0,
            Timeframe::M5 => t.minute() % 5 == 0,
            Timeframe::M10 => t.minute() % 10 == 0,
            Timeframe::M15 => t.minute() % 15 == 0,
            Timeframe::M30 => t.minute() % 30 == 0,
            Timeframe::H1 => t.minute() == 0,
            Timeframe::H2 => t.minute() == 0 && t.hour() % 2 == 0,
            Timeframe::H4 => t.minute() == 0 && t.hour() % 4 == 0,
            Timeframe::H12 => t.minute() == 0 && t.hour() % 12 == 0,
            Timeframe::D1 => t.minute() == 0 && t.hour() == 0,
            Timeframe::W1 => {
                t.minute() == 0 && t.hour() == 0 && t.weekday() == Weekday::Sun
            }
        }
    }

    /// Whether a source bar starting at `t` is the last one of the
    /// enclosing target period: the *next* source bar starts a new one.
    pub fn closes_with(self, t: DateTime<Utc>, source: Timeframe) -> bool {
        if self == source {
            return true;
        }
        self.starts_period(t + source.duration())
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M10 => "10m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Timeframe {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "10m" => Ok(Timeframe::M10),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "2h" => Ok(Timeframe::H2),
            "4h" => Ok(Timeframe::H4),
            "12h" => Ok(Timeframe::H12),
            "1d" => Ok(Timeframe::D1),
            "1w" => Ok(Timeframe::W1),
            other => Err(FeedError::InvalidTimeframe(other.to_string())),
        }
    }
}
