//! Venue implementations shipped with the engine: the simulated
//! matching engine. Real venue connectors live outside the core and
//! implement the same `Broker`/`Feeder` contracts.

pub mod paper;

pub use paper::{Drawdown, PaperWallet, PaperWalletBuilder, ValuePoint, WalletSummary};
