//! Per-pair OHLCV series fed to strategies.

use super::candle::Candle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Columnar view of a pair's candle history.
///
/// A partial update for the bar already at the tail replaces the last
/// row; a bar with a newer window time appends. `metadata` holds
/// per-column series: values carried in from the feed plus anything a
/// strategy's indicator pass writes back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataframe {
    pub pair: String,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    pub time: Vec<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, Vec<f64>>,
}

impl Dataframe {
    pub fn new(pair: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// The close price `n` bars back from the tail (0 = latest).
    pub fn close_from_end(&self, n: usize) -> Option<f64> {
        let len = self.close.len();
        if n < len {
            Some(self.close[len - 1 - n])
        } else {
            None
        }
    }

    /// Fold a candle into the series: replace the tail row when the bar
    /// time matches, append otherwise.
    pub fn update(&mut self, candle: &Candle) {
        if let Some(&last_time) = self.time.last() {
            if candle.time == last_time {
                let last = self.time.len() - 1;
                self.open[last] = candle.open;
                self.high[last] = candle.high;
                self.low[last] = candle.low;
                self.close[last] = candle.close;
                self.volume[last] = candle.volume;
                self.time[last] = candle.time;
                for (key, value) in &candle.metadata {
                    if let Some(series) = self.metadata.get_mut(key) {
                        if let Some(slot) = series.get_mut(last) {
                            *slot = *value;
                        }
                    }
                }
                self.last_update = Some(candle.updated_at);
                return;
            }
        }

        self.open.push(candle.open);
        self.high.push(candle.high);
        self.low.push(candle.low);
        self.close.push(candle.close);
        self.volume.push(candle.volume);
        self.time.push(candle.time);
        for (key, value) in &candle.metadata {
            self.metadata.entry(key.clone()).or_default().push(*value);
        }
        self.last_update = Some(candle.updated_at);
    }

    /// A copy holding only the most recent `positions` rows. Returns the
    /// whole frame when it is shorter than that.
    pub fn sample(&self, positions: usize) -> Dataframe {
        let size = self.time.len();
        if size <= positions {
            return self.clone();
        }
        let start = size - positions;
        Dataframe {
            pair: self.pair.clone(),
            open: self.open[start..].to_vec(),
            high: self.high[start..].to_vec(),
            low: self.low[start..].to_vec(),
            close: self.close[start..].to_vec(),
            volume: self.volume[start..].to_vec(),
            time: self.time[start..].to_vec(),
            last_update: self.last_update,
            metadata: self
                .metadata
                .iter()
                .map(|(k, v)| {
                    let from = v.len().saturating_sub(positions);
                    (k.clone(), v[from..].to_vec())
                })
                .collect(),
        }
    }
}
