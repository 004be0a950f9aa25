//! Per-pair strategy controller: owns the dataframe, gates on warmup,
//! drops late candles.

use crate::domain::{Candle, Dataframe};
use crate::service::Broker;
use crate::strategy::{HighFrequencyStrategy, Strategy};
use std::sync::{Arc, Mutex};

struct ControllerState {
    dataframe: Dataframe,
    started: bool,
}

/// Routes one pair's candles into a strategy.
///
/// The optional high-frequency handler is chosen at construction; when
/// absent, partial candle updates are ignored entirely.
pub struct StrategyController {
    pair: String,
    strategy: Arc<dyn Strategy>,
    partial: Option<Arc<dyn HighFrequencyStrategy>>,
    broker: Arc<dyn Broker>,
    state: Mutex<ControllerState>,
}

impl StrategyController {
    pub fn new(
        pair: &str,
        strategy: Arc<dyn Strategy>,
        partial: Option<Arc<dyn HighFrequencyStrategy>>,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self {
            pair: pair.to_string(),
            strategy,
            partial,
            broker,
            state: Mutex::new(ControllerState {
                dataframe: Dataframe::new(pair),
                started: false,
            }),
        }
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    /// Arm the decision hooks. Before `start`, candles still build up
    /// the dataframe (warmup) but no orders are placed.
    pub fn start(&self) {
        self.state.lock().expect("strategy lock poisoned").started = true;
    }

    /// Handle an intrabar update. Only meaningful when a high-frequency
    /// handler was configured and the warmup period is satisfied.
    pub async fn on_partial_candle(&self, candle: &Candle) {
        let Some(partial) = self.partial.as_ref() else {
            return;
        };
        if candle.complete {
            return;
        }
        let sample = {
            let mut state = self.state.lock().expect("strategy lock poisoned");
            if state.dataframe.len() < self.strategy.warmup_period() {
                return;
            }
            state.dataframe.update(candle);
            let mut sample = state.dataframe.sample(self.strategy.warmup_period());
            self.strategy.indicators(&mut sample);
            sample
        };
        partial.on_partial_candle(&sample, self.broker.as_ref()).await;
    }

    /// Handle a completed candle: fold it into the dataframe and, past
    /// warmup, run the strategy. Candles older than the last accepted
    /// one are logged and dropped, never propagated as failures.
    pub async fn on_candle(&self, candle: &Candle) {
        let sample = {
            let mut state = self.state.lock().expect("strategy lock poisoned");
            if let Some(&last) = state.dataframe.time.last() {
                if candle.time < last {
                    tracing::warn!(
                        pair = %candle.pair,
                        time = %candle.time,
                        "late candle received, dropping"
                    );
                    return;
                }
            }
            state.dataframe.update(candle);
            if state.dataframe.len() < self.strategy.warmup_period() || !state.started {
                return;
            }
            let mut sample = state.dataframe.sample(self.strategy.warmup_period());
            self.strategy.indicators(&mut sample);
            sample
        };
        self.strategy.on_candle(&sample, self.broker.as_ref()).await;
    }
}
