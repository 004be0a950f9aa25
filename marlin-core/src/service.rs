//! External collaborator contracts: market data in, orders out,
//! notifications sideways.
//!
//! Venue connectors implement `Feeder` and `Broker`; anything that does
//! both is an `Exchange`. The engine core never talks wire protocols —
//! that is entirely the implementor's concern.

use crate::domain::{Account, AssetInfo, Candle, Order, Side};
use crate::feed::Timeframe;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from market-data operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("insufficient data for {pair}")]
    InsufficientData { pair: String },

    #[error("invalid operation for this feed")]
    InvalidOperation,

    #[error("invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed bar data: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors from order placement and account operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("invalid quantity")]
    InvalidQuantity,

    #[error("insufficient funds or locked: {quantity} {pair}")]
    InsufficientFunds { pair: String, quantity: f64 },

    #[error("unknown pair: {0}")]
    UnknownPair(String),

    #[error("order {0} not found")]
    OrderNotFound(u64),

    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("broker error: {0}")]
    Broker(String),
}

/// Market data source: pair constraints, quotes, historical bars and a
/// live candle subscription.
#[async_trait]
pub trait Feeder: Send + Sync {
    fn asset_info(&self, pair: &str) -> AssetInfo;

    async fn last_quote(&self, pair: &str) -> Result<f64, FeedError>;

    async fn candles_by_period(
        &self,
        pair: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, FeedError>;

    async fn candles_by_limit(
        &self,
        pair: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, FeedError>;

    /// Open a candle stream plus its error side-channel. Historical
    /// feeds replay their series then close both channels.
    async fn candles_subscription(
        &self,
        pair: &str,
        timeframe: Timeframe,
    ) -> (mpsc::Receiver<Candle>, mpsc::Receiver<FeedError>);
}

/// Order execution and account state.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn account(&self) -> Result<Account, OrderError>;

    /// Net (base, quote) holdings for a pair, free plus locked.
    async fn position(&self, pair: &str) -> Result<(f64, f64), OrderError>;

    async fn order(&self, pair: &str, exchange_id: u64) -> Result<Order, OrderError>;

    /// Create an OCO pair: a resting profit leg and a stop leg sharing
    /// one group id. Filling either cancels the other.
    async fn create_order_oco(
        &self,
        side: Side,
        pair: &str,
        size: f64,
        price: f64,
        stop: f64,
        stop_limit: f64,
    ) -> Result<Vec<Order>, OrderError>;

    async fn create_order_limit(
        &self,
        side: Side,
        pair: &str,
        size: f64,
        limit: f64,
    ) -> Result<Order, OrderError>;

    async fn create_order_market(
        &self,
        side: Side,
        pair: &str,
        size: f64,
    ) -> Result<Order, OrderError>;

    /// Market order sized in quote currency.
    async fn create_order_market_quote(
        &self,
        side: Side,
        pair: &str,
        quote_amount: f64,
    ) -> Result<Order, OrderError>;

    async fn create_order_stop(
        &self,
        pair: &str,
        size: f64,
        limit: f64,
    ) -> Result<Order, OrderError>;

    async fn cancel(&self, order: &Order) -> Result<(), OrderError>;
}

/// A full venue: both market data and execution.
pub trait Exchange: Broker + Feeder {}

impl<T: Broker + Feeder> Exchange for T {}

/// Outbound notifications: free-text messages, order state changes and
/// reported errors. Implementations decide the transport.
pub trait Notifier: Send + Sync {
    fn notify(&self, text: &str);
    fn on_order(&self, order: &Order);
    fn on_error(&self, error: &dyn std::error::Error);
}
