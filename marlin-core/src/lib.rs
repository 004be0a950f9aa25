//! Marlin Core — candle pipeline and order/position accounting engine.
//!
//! The heart of the trading engine:
//! - Domain types (candles, orders, balances, positions, instruments)
//! - Priority-ordered candle event queue with a streaming pop mode
//! - Feed subscription manager and historical CSV resampling feed
//! - Position ledger with cost-basis averaging and short/long flips
//! - Order lifecycle controller with a timer-driven reconciliation loop
//! - Simulated matching engine (paper wallet) for backtest and paper
//!   trading
//! - Orchestrator selecting backtest vs live execution
//!
//! The same accounting runs identically whether candles come from a
//! live venue, a historical replay, or the in-process simulated venue.

pub mod config;
pub mod domain;
pub mod engine;
pub mod exchange;
pub mod feed;
pub mod orders;
pub mod queue;
pub mod service;
pub mod storage;
pub mod strategy;

pub use config::{PairConfig, Settings};
pub use engine::{Engine, EngineBuilder, EngineError};
