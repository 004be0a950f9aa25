//! Engine settings and the instrument table built from them.

use crate::domain::{InstrumentMap, PairInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid pair: {0}")]
    InvalidPair(String),

    #[error("duplicate pair: {0}")]
    DuplicatePair(String),

    #[error("no pairs configured")]
    NoPairs,

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// One traded pair with its explicit base/quote legs. No implicit
/// symbol splitting anywhere: the configuration names both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub symbol: String,
    pub base: String,
    pub quote: String,
}

impl PairConfig {
    pub fn new(symbol: &str, base: &str, quote: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            base: base.to_string(),
            quote: quote.to_string(),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub pairs: Vec<PairConfig>,
}

impl Settings {
    /// Parse settings from a TOML document:
    ///
    /// ```toml
    /// [[pairs]]
    /// symbol = "BTCUSDT"
    /// base = "BTC"
    /// quote = "USDT"
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Validate the pair list and build the shared instrument table.
    pub fn instruments(&self) -> Result<InstrumentMap, ConfigError> {
        if self.pairs.is_empty() {
            return Err(ConfigError::NoPairs);
        }
        let mut map = HashMap::new();
        for pair in &self.pairs {
            if pair.symbol.is_empty() || pair.base.is_empty() || pair.quote.is_empty() {
                return Err(ConfigError::InvalidPair(pair.symbol.clone()));
            }
            let previous = map.insert(
                pair.symbol.clone(),
                PairInfo { base: pair.base.clone(), quote: pair.quote.clone() },
            );
            if previous.is_some() {
                return Err(ConfigError::DuplicatePair(pair.symbol.clone()));
            }
        }
        Ok(InstrumentMap::new(map))
    }
}
