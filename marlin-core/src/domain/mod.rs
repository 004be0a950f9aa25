//! Domain types: candles, orders, accounts, positions, instruments.

pub mod account;
pub mod candle;
pub mod dataframe;
pub mod instrument;
pub mod order;
pub mod position;

pub use account::{amount_to_lot_size, Account, AssetInfo, Balance};
pub use candle::{Candle, CandleEvent, HeikinAshi};
pub use dataframe::Dataframe;
pub use instrument::{InstrumentMap, PairInfo};
pub use order::{Order, OrderKind, OrderStatus, Side};
pub use position::{Position, TradeResult};
