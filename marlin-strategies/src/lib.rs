//! Example strategies for the marlin engine.
//!
//! These compute their rolling means inline; a full technical-indicator
//! library is a separate concern.

pub mod crossover;
pub mod trailing;

pub use crossover::Crossover;
pub use trailing::{TrailingStop, TrailingStopStrategy};
