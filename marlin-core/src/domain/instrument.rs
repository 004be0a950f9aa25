//! Pair → base/quote asset table, built once from configuration.
//!
//! Every component that must split a pair symbol into its legs receives
//! an `InstrumentMap` at construction; there is no ambient global lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The two legs of a traded pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairInfo {
    pub base: String,
    pub quote: String,
}

/// Immutable pair table shared by the engine, the order controller and
/// the simulated venue.
#[derive(Debug, Clone, Default)]
pub struct InstrumentMap {
    pairs: HashMap<String, PairInfo>,
}

impl InstrumentMap {
    pub fn new(pairs: HashMap<String, PairInfo>) -> Self {
        Self { pairs }
    }

    /// Split a pair symbol into (base, quote).
    pub fn split(&self, pair: &str) -> Option<(&str, &str)> {
        self.pairs
            .get(pair)
            .map(|info| (info.base.as_str(), info.quote.as_str()))
    }

    /// Find the pair whose base is `asset` and whose quote is `quote`.
    /// Used to value holdings against a reference currency.
    pub fn pair_for(&self, asset: &str, quote: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(_, info)| info.base == asset && info.quote == quote)
            .map(|(symbol, _)| symbol.as_str())
    }

    pub fn contains(&self, pair: &str) -> bool {
        self.pairs.contains_key(pair)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }
}
