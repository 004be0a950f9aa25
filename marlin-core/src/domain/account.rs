//! Account balances and per-pair asset constraints.

use serde::{Deserialize, Serialize};

/// Balance of one asset: freely tradable amount plus the amount locked
/// behind resting orders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: f64,
    pub locked: f64,
}

/// A venue account: the full set of asset balances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    pub balances: Vec<Balance>,
}

impl Account {
    /// Look up the balances of a pair's base and quote assets.
    pub fn balance(&self, base: &str, quote: &str) -> (Balance, Balance) {
        let mut base_balance = Balance::default();
        let mut quote_balance = Balance::default();
        for balance in &self.balances {
            if balance.asset == base {
                base_balance = balance.clone();
            } else if balance.asset == quote {
                quote_balance = balance.clone();
            }
        }
        (base_balance, quote_balance)
    }

    /// Sum of free and locked amounts across every asset.
    pub fn equity(&self) -> f64 {
        self.balances.iter().map(|b| b.free + b.locked).sum()
    }
}

/// Trading constraints for one pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetInfo {
    pub base_asset: String,
    pub quote_asset: String,
    pub min_price: f64,
    pub max_price: f64,
    pub min_quantity: f64,
    pub max_quantity: f64,
    pub step_size: f64,
    pub tick_size: f64,
    pub quote_precision: u32,
    pub base_precision: u32,
}

impl AssetInfo {
    /// Unconstrained defaults used by simulated venues and file feeds.
    pub fn unconstrained(base: &str, quote: &str) -> Self {
        Self {
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
            min_price: 0.0,
            max_price: f64::MAX,
            min_quantity: 0.0,
            max_quantity: f64::MAX,
            step_size: 0.000_000_01,
            tick_size: 0.000_000_01,
            quote_precision: 8,
            base_precision: 8,
        }
    }
}

/// Snap an amount to a multiple of `step`, truncated to `precision`
/// decimal places. Flooring only: the snapped amount never exceeds the
/// requested one.
pub fn amount_to_lot_size(step: f64, precision: u32, amount: f64) -> f64 {
    if step <= 0.0 {
        return amount;
    }
    let lots = (amount / step).floor();
    let snapped = lots * step;
    let scale = 10f64.powi(precision as i32);
    (snapped * scale).floor() / scale
}
