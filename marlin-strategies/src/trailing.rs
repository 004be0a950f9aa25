//! Trailing stop: a ratcheting stop level, and a high-frequency strategy
//! that exits intrabar when the ratchet is hit.

use crate::crossover::{crossed_over, sma};
use async_trait::async_trait;
use marlin_core::domain::{Dataframe, Side};
use marlin_core::feed::Timeframe;
use marlin_core::service::Broker;
use marlin_core::strategy::{HighFrequencyStrategy, Strategy};
use std::collections::HashMap;
use std::sync::Mutex;

/// Stop level that only moves up: every new high lifts the stop by the
/// same distance, a fall never lowers it.
#[derive(Debug, Clone, Default)]
pub struct TrailingStop {
    current: f64,
    stop: f64,
    active: bool,
}

impl TrailingStop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the stop with the current price and the initial stop level.
    pub fn start(&mut self, current: f64, stop: f64) {
        self.current = current;
        self.stop = stop;
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feed a new price. Returns true when the stop is hit.
    pub fn update(&mut self, current: f64) -> bool {
        if !self.active {
            return false;
        }
        if current > self.current {
            self.stop += current - self.current;
            self.current = current;
            return false;
        }
        self.current = current;
        current <= self.stop
    }
}

/// Enters on a moving-average crossover and exits on a trailing stop,
/// checked against every intrabar update.
pub struct TrailingStopStrategy {
    timeframe: Timeframe,
    fast: usize,
    slow: usize,
    stops: Mutex<HashMap<String, TrailingStop>>,
}

impl TrailingStopStrategy {
    pub fn new(timeframe: Timeframe, fast: usize, slow: usize) -> Self {
        Self {
            timeframe,
            fast,
            slow,
            stops: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for TrailingStopStrategy {
    fn default() -> Self {
        Self::new(Timeframe::H4, 8, 21)
    }
}

#[async_trait]
impl Strategy for TrailingStopStrategy {
    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn warmup_period(&self) -> usize {
        self.slow + 1
    }

    fn indicators(&self, df: &mut Dataframe) {
        df.metadata
            .insert("sma_fast".into(), sma(&df.close, self.fast));
        df.metadata
            .insert("sma_slow".into(), sma(&df.close, self.slow));
    }

    async fn on_candle(&self, df: &Dataframe, broker: &dyn Broker) {
        let (Some(close), Some(low)) = (df.close_from_end(0), df.low.last().copied())
        else {
            return;
        };
        let (asset, quote) = match broker.position(&df.pair).await {
            Ok(position) => position,
            Err(err) => {
                tracing::error!(pair = %df.pair, "position lookup failed: {err}");
                return;
            }
        };

        let entry_signal = quote > 10.0
            && asset * close < 10.0
            && crossed_over(&df.metadata["sma_fast"], &df.metadata["sma_slow"]);
        if entry_signal {
            if let Err(err) = broker
                .create_order_market_quote(Side::Buy, &df.pair, quote)
                .await
            {
                tracing::error!(pair = %df.pair, "entry failed: {err}");
                return;
            }
            // ratchet starts at the entry bar's low
            self.stops
                .lock()
                .expect("trailing lock poisoned")
                .entry(df.pair.clone())
                .or_default()
                .start(close, low);
        }
    }
}

#[async_trait]
impl HighFrequencyStrategy for TrailingStopStrategy {
    async fn on_partial_candle(&self, df: &Dataframe, broker: &dyn Broker) {
        let Some(close) = df.close_from_end(0) else {
            return;
        };
        let triggered = {
            let mut stops = self.stops.lock().expect("trailing lock poisoned");
            stops
                .get_mut(&df.pair)
                .map(|stop| stop.update(close))
                .unwrap_or(false)
        };
        if !triggered {
            return;
        }

        let (asset, _) = match broker.position(&df.pair).await {
            Ok(position) => position,
            Err(err) => {
                tracing::error!(pair = %df.pair, "position lookup failed: {err}");
                return;
            }
        };
        if asset > 0.0 {
            if let Err(err) = broker.create_order_market(Side::Sell, &df.pair, asset).await {
                tracing::error!(pair = %df.pair, "trailing exit failed: {err}");
                return;
            }
            self.stops
                .lock()
                .expect("trailing lock poisoned")
                .get_mut(&df.pair)
                .expect("stop present")
                .stop();
        }
    }
}
