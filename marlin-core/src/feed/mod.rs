//! Market data plumbing: timeframes, the subscription manager, and the
//! historical CSV feed.

pub mod csv;
pub mod subscription;
pub mod timeframe;

pub use csv::{resample, CsvFeed, PairFeed};
pub use subscription::{CandleConsumer, DataFeedManager};
pub use timeframe::Timeframe;
