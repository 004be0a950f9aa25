//! Per-pair performance summary.
//!
//! Realized results land in four buckets — (win | lose) × (long |
//! short) — each kept as absolute and percentage series. Every reported
//! metric is a pure function over the buckets.

use crate::domain::{Side, TradeResult};
use std::fmt;

#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub pair: String,
    win_long: Vec<f64>,
    win_long_pct: Vec<f64>,
    win_short: Vec<f64>,
    win_short_pct: Vec<f64>,
    lose_long: Vec<f64>,
    lose_long_pct: Vec<f64>,
    lose_short: Vec<f64>,
    lose_short_pct: Vec<f64>,
    pub volume: f64,
}

impl Summary {
    pub fn new(pair: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            ..Self::default()
        }
    }

    /// File a realized result into its bucket.
    pub fn add_result(&mut self, result: &TradeResult) {
        let (abs_bucket, pct_bucket) = match (result.profit_pct >= 0.0, result.side) {
            (true, Side::Buy) => (&mut self.win_long, &mut self.win_long_pct),
            (true, Side::Sell) => (&mut self.win_short, &mut self.win_short_pct),
            (false, Side::Buy) => (&mut self.lose_long, &mut self.lose_long_pct),
            (false, Side::Sell) => (&mut self.lose_short, &mut self.lose_short_pct),
        };
        abs_bucket.push(result.profit_abs);
        pct_bucket.push(result.profit_pct);
    }

    /// Accrue traded volume (quote value of a fill).
    pub fn add_volume(&mut self, volume: f64) {
        self.volume += volume;
    }

    pub fn win(&self) -> Vec<f64> {
        let mut all = self.win_long.clone();
        all.extend_from_slice(&self.win_short);
        all
    }

    pub fn win_pct(&self) -> Vec<f64> {
        let mut all = self.win_long_pct.clone();
        all.extend_from_slice(&self.win_short_pct);
        all
    }

    pub fn lose(&self) -> Vec<f64> {
        let mut all = self.lose_long.clone();
        all.extend_from_slice(&self.lose_short);
        all
    }

    pub fn lose_pct(&self) -> Vec<f64> {
        let mut all = self.lose_long_pct.clone();
        all.extend_from_slice(&self.lose_short_pct);
        all
    }

    pub fn trades(&self) -> usize {
        self.win().len() + self.lose().len()
    }

    /// Total realized absolute PnL.
    pub fn profit(&self) -> f64 {
        self.win().iter().sum::<f64>() + self.lose().iter().sum::<f64>()
    }

    /// Winning trades over all trades, as a fraction in [0, 1].
    pub fn win_rate(&self) -> f64 {
        let wins = self.win().len();
        let total = wins + self.lose().len();
        if total == 0 {
            return 0.0;
        }
        wins as f64 / total as f64
    }

    /// Mean winning percentage over the absolute mean losing percentage.
    pub fn payoff(&self) -> f64 {
        let wins = self.win_pct();
        let losses = self.lose_pct();
        let lose_sum: f64 = losses.iter().sum();
        if wins.is_empty() || losses.is_empty() || lose_sum == 0.0 {
            return 0.0;
        }
        let avg_win = wins.iter().sum::<f64>() / wins.len() as f64;
        let avg_lose = lose_sum / losses.len() as f64;
        avg_win / avg_lose.abs()
    }

    /// Sum of winning percentages over the absolute sum of losing ones.
    pub fn profit_factor(&self) -> f64 {
        let losses = self.lose_pct();
        if losses.is_empty() {
            return 0.0;
        }
        let win_sum: f64 = self.win_pct().iter().sum();
        let lose_sum: f64 = losses.iter().sum();
        if lose_sum == 0.0 {
            return 0.0;
        }
        win_sum / lose_sum.abs()
    }

    /// System Quality Number: √N · mean(PnL) / stddev(PnL).
    pub fn sqn(&self) -> f64 {
        let mut pnl = self.win();
        pnl.extend(self.lose());
        let total = pnl.len() as f64;
        if total == 0.0 {
            return 0.0;
        }
        let avg = pnl.iter().sum::<f64>() / total;
        let variance = pnl.iter().map(|p| (p - avg).powi(2)).sum::<f64>() / total;
        let std_dev = variance.sqrt();
        if std_dev == 0.0 {
            return 0.0;
        }
        total.sqrt() * (avg / std_dev)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pair      {}", self.pair)?;
        writeln!(f, "Trades    {}", self.trades())?;
        writeln!(f, "Win       {}", self.win().len())?;
        writeln!(f, "Loss      {}", self.lose().len())?;
        writeln!(f, "% Win     {:.1}", self.win_rate() * 100.0)?;
        writeln!(f, "Payoff    {:.3}", self.payoff())?;
        writeln!(f, "Pr.Fact   {:.3}", self.profit_factor())?;
        writeln!(f, "SQN       {:.1}", self.sqn())?;
        writeln!(f, "Profit    {:.4}", self.profit())?;
        write!(f, "Volume    {:.4}", self.volume)
    }
}
