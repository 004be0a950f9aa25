//! Candle — the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// OHLCV bar for one pair over one timeframe window.
///
/// `time` is the window start; `updated_at` advances as partial updates
/// arrive. `complete` flips from false to true at most once per bar, when
/// the window closes. Extra columns carried by a historical file land in
/// `metadata`, keyed by column name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candle {
    pub pair: String,
    pub time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub open: f64,
    pub close: f64,
    pub low: f64,
    pub high: f64,
    pub volume: f64,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, f64>,
}

impl Candle {
    /// Basic OHLC sanity check: the high/low envelope contains open and close.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// Comparable wrapper placing candles in the queue's total order:
/// (time asc, updated-at asc, pair name asc).
///
/// `Candle` itself carries floats and stays out of `Ord`; the wrapper
/// compares only the ordering key.
#[derive(Debug, Clone)]
pub struct CandleEvent(pub Candle);

impl CandleEvent {
    fn key(&self) -> (DateTime<Utc>, DateTime<Utc>, &str) {
        (self.0.time, self.0.updated_at, self.0.pair.as_str())
    }
}

impl PartialEq for CandleEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for CandleEvent {}

impl PartialOrd for CandleEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CandleEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Heikin-Ashi smoothing accumulator.
///
/// Each smoothed bar opens at the midpoint of the previous smoothed bar
/// and closes at the average of the raw OHLC; the envelope expands to
/// cover the synthetic open/close.
#[derive(Debug, Clone, Default)]
pub struct HeikinAshi {
    previous: Option<(f64, f64)>, // (open, close) of the last smoothed bar
}

impl HeikinAshi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform a raw candle into its Heikin-Ashi counterpart.
    pub fn apply(&mut self, candle: &Candle) -> Candle {
        let (prev_open, prev_close) = self
            .previous
            .unwrap_or((candle.open, candle.close));

        let open = (prev_open + prev_close) / 2.0;
        let close = (candle.open + candle.high + candle.low + candle.close) / 4.0;
        let high = candle.high.max(open.max(close));
        let low = candle.low.min(open.min(close));
        self.previous = Some((open, close));

        Candle {
            open,
            close,
            high,
            low,
            ..candle.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(pair: &str, time_secs: i64, update_secs: i64) -> Candle {
        Candle {
            pair: pair.into(),
            time: Utc.timestamp_opt(time_secs, 0).unwrap(),
            updated_at: Utc.timestamp_opt(update_secs, 0).unwrap(),
            open: 100.0,
            close: 103.0,
            low: 98.0,
            high: 105.0,
            volume: 50.0,
            complete: true,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn candle_is_sane() {
        assert!(candle("BTCUSDT", 0, 0).is_sane());

        let mut bad = candle("BTCUSDT", 0, 0);
        bad.high = 97.0; // below low
        assert!(!bad.is_sane());
    }

    #[test]
    fn event_orders_by_time_then_update_then_pair() {
        let a = CandleEvent(candle("BTCUSDT", 100, 100));
        let b = CandleEvent(candle("BTCUSDT", 200, 200));
        assert!(a < b);

        let c = CandleEvent(candle("BTCUSDT", 100, 150));
        assert!(a < c);

        let d = CandleEvent(candle("ETHUSDT", 100, 100));
        assert!(a < d); // BTCUSDT < ETHUSDT
    }

    #[test]
    fn event_equality_ignores_prices() {
        let mut other = candle("BTCUSDT", 100, 100);
        other.close = 999.0;
        assert_eq!(
            CandleEvent(candle("BTCUSDT", 100, 100)),
            CandleEvent(other)
        );
    }

    #[test]
    fn heikin_ashi_first_bar_uses_raw_values() {
        let mut ha = HeikinAshi::new();
        let smoothed = ha.apply(&candle("BTCUSDT", 0, 0));
        // first bar: open = (open + close) / 2 of the raw bar
        assert_eq!(smoothed.open, (100.0 + 103.0) / 2.0);
        assert_eq!(smoothed.close, (100.0 + 105.0 + 98.0 + 103.0) / 4.0);
        assert!(smoothed.high >= smoothed.open && smoothed.high >= smoothed.close);
        assert!(smoothed.low <= smoothed.open && smoothed.low <= smoothed.close);
    }

    #[test]
    fn heikin_ashi_chains_previous_bar() {
        let mut ha = HeikinAshi::new();
        let first = ha.apply(&candle("BTCUSDT", 0, 0));
        let second = ha.apply(&candle("BTCUSDT", 60, 60));
        assert_eq!(second.open, (first.open + first.close) / 2.0);
    }

    #[test]
    fn candle_serialization_roundtrip() {
        let mut c = candle("BTCUSDT", 100, 100);
        c.metadata.insert("rsi".into(), 55.5);
        let json = serde_json::to_string(&c).unwrap();
        let deser: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(c.pair, deser.pair);
        assert_eq!(c.time, deser.time);
        assert_eq!(c.close, deser.close);
        assert_eq!(deser.metadata["rsi"], 55.5);
    }
}
