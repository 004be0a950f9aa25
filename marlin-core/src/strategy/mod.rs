//! Strategy traits and the per-pair strategy controller.

pub mod controller;

pub use controller::StrategyController;

use crate::domain::Dataframe;
use crate::feed::Timeframe;
use crate::service::Broker;
use async_trait::async_trait;

/// A trading strategy driven by closed candles.
///
/// `indicators` runs once per update, before the decision hooks, and may
/// write derived series into the dataframe's metadata. `on_candle` fires
/// after every completed bar once the warmup period is satisfied.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Candle aggregation window this strategy trades on.
    fn timeframe(&self) -> Timeframe;

    /// Number of historical bars required before the first decision.
    fn warmup_period(&self) -> usize;

    /// Fill indicator series for the current frame.
    fn indicators(&self, df: &mut Dataframe);

    /// Trading logic, invoked on every completed candle.
    async fn on_candle(&self, df: &Dataframe, broker: &dyn Broker);
}

/// Optional intrabar extension: reacts to partial candle updates before
/// the bar closes. Wired in explicitly at engine construction — there is
/// no runtime capability probing.
#[async_trait]
pub trait HighFrequencyStrategy: Strategy {
    async fn on_partial_candle(&self, df: &Dataframe, broker: &dyn Broker);
}
