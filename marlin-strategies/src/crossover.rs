//! Moving-average crossover strategy: long when the fast mean crosses
//! above the slow one, flat when it crosses back under.

use async_trait::async_trait;
use marlin_core::domain::{Dataframe, Side};
use marlin_core::feed::Timeframe;
use marlin_core::service::Broker;
use marlin_core::strategy::Strategy;

/// Minimum quote balance worth trading.
const MIN_QUOTE: f64 = 10.0;

/// Simple-moving-average series over `period` bars. Positions without a
/// full window hold NaN.
pub(crate) fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        out[i] = window.iter().sum::<f64>() / period as f64;
    }
    out
}

/// `fast` crossed above `slow` on the latest bar.
pub(crate) fn crossed_over(fast: &[f64], slow: &[f64]) -> bool {
    let n = fast.len();
    if n < 2 || slow.len() != n {
        return false;
    }
    let values = [fast[n - 2], fast[n - 1], slow[n - 2], slow[n - 1]];
    if values.iter().any(|v| v.is_nan()) {
        return false;
    }
    fast[n - 1] > slow[n - 1] && fast[n - 2] <= slow[n - 2]
}

/// `fast` crossed below `slow` on the latest bar.
pub(crate) fn crossed_under(fast: &[f64], slow: &[f64]) -> bool {
    let n = fast.len();
    if n < 2 || slow.len() != n {
        return false;
    }
    let values = [fast[n - 2], fast[n - 1], slow[n - 2], slow[n - 1]];
    if values.iter().any(|v| v.is_nan()) {
        return false;
    }
    fast[n - 1] < slow[n - 1] && fast[n - 2] >= slow[n - 2]
}

pub struct Crossover {
    timeframe: Timeframe,
    fast: usize,
    slow: usize,
}

impl Crossover {
    pub fn new(timeframe: Timeframe, fast: usize, slow: usize) -> Self {
        Self { timeframe, fast, slow }
    }
}

impl Default for Crossover {
    fn default() -> Self {
        Self::new(Timeframe::H4, 8, 21)
    }
}

#[async_trait]
impl Strategy for Crossover {
    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn warmup_period(&self) -> usize {
        self.slow + 1
    }

    fn indicators(&self, df: &mut Dataframe) {
        df.metadata
            .insert("sma_fast".into(), sma(&df.close, self.fast));
        df.metadata
            .insert("sma_slow".into(), sma(&df.close, self.slow));
    }

    async fn on_candle(&self, df: &Dataframe, broker: &dyn Broker) {
        let Some(close) = df.close_from_end(0) else {
            return;
        };
        let (asset, quote) = match broker.position(&df.pair).await {
            Ok(position) => position,
            Err(err) => {
                tracing::error!(pair = %df.pair, "position lookup failed: {err}");
                return;
            }
        };
        let fast = &df.metadata["sma_fast"];
        let slow = &df.metadata["sma_slow"];

        if quote >= MIN_QUOTE && asset * close < MIN_QUOTE && crossed_over(fast, slow) {
            if let Err(err) = broker
                .create_order_market_quote(Side::Buy, &df.pair, quote)
                .await
            {
                tracing::error!(pair = %df.pair, "entry failed: {err}");
            }
            return;
        }

        if asset > 0.0 && crossed_under(fast, slow) {
            if let Err(err) = broker.create_order_market(Side::Sell, &df.pair, asset).await {
                tracing::error!(pair = %df.pair, "exit failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_holds_nan_until_window_fills() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_eq!(out[2], 2.0);
        assert_eq!(out[3], 3.0);
    }

    #[test]
    fn crossover_detection() {
        // fast rises through slow
        assert!(crossed_over(&[1.0, 3.0], &[2.0, 2.0]));
        // already above: no fresh cross
        assert!(!crossed_over(&[3.0, 4.0], &[2.0, 2.0]));
        // NaN anywhere suppresses the signal
        assert!(!crossed_over(&[f64::NAN, 3.0], &[2.0, 2.0]));
    }

    #[test]
    fn crossunder_detection() {
        assert!(crossed_under(&[3.0, 1.0], &[2.0, 2.0]));
        assert!(!crossed_under(&[1.0, 0.5], &[2.0, 2.0]));
    }

    #[test]
    fn warmup_covers_the_slow_window() {
        let strategy = Crossover::new(Timeframe::H1, 3, 8);
        assert_eq!(strategy.warmup_period(), 9);
    }

    // ── Behavioral test against a recording broker ─────────────────────

    use marlin_core::domain::{Account, Order};
    use marlin_core::service::OrderError;
    use std::sync::Mutex;

    /// Broker double recording every order request.
    struct RecordingBroker {
        asset: f64,
        quote: f64,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingBroker {
        fn new(asset: f64, quote: f64) -> Self {
            Self { asset, quote, calls: Mutex::new(Vec::new()) }
        }

        fn dummy_order(&self, pair: &str, side: Side, size: f64) -> Order {
            Order {
                id: None,
                exchange_id: 1,
                pair: pair.into(),
                side,
                kind: marlin_core::domain::OrderKind::Market,
                status: marlin_core::domain::OrderStatus::Filled,
                price: 100.0,
                quantity: size,
                created_at: Default::default(),
                updated_at: Default::default(),
                stop: None,
                group_id: None,
                profit_pct: 0.0,
                profit_abs: 0.0,
            }
        }
    }

    #[async_trait]
    impl Broker for RecordingBroker {
        async fn account(&self) -> Result<Account, OrderError> {
            Ok(Account::default())
        }
        async fn position(&self, _pair: &str) -> Result<(f64, f64), OrderError> {
            Ok((self.asset, self.quote))
        }
        async fn order(&self, _pair: &str, id: u64) -> Result<Order, OrderError> {
            Err(OrderError::OrderNotFound(id))
        }
        async fn create_order_oco(
            &self,
            _side: Side,
            pair: &str,
            size: f64,
            _price: f64,
            _stop: f64,
            _stop_limit: f64,
        ) -> Result<Vec<Order>, OrderError> {
            self.calls.lock().unwrap().push("oco".into());
            Ok(vec![self.dummy_order(pair, Side::Sell, size)])
        }
        async fn create_order_limit(
            &self,
            side: Side,
            pair: &str,
            size: f64,
            _limit: f64,
        ) -> Result<Order, OrderError> {
            self.calls.lock().unwrap().push("limit".into());
            Ok(self.dummy_order(pair, side, size))
        }
        async fn create_order_market(
            &self,
            side: Side,
            pair: &str,
            size: f64,
        ) -> Result<Order, OrderError> {
            self.calls.lock().unwrap().push(format!("market {side} {size}"));
            Ok(self.dummy_order(pair, side, size))
        }
        async fn create_order_market_quote(
            &self,
            side: Side,
            pair: &str,
            quote_amount: f64,
        ) -> Result<Order, OrderError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("market_quote {side} {quote_amount}"));
            Ok(self.dummy_order(pair, side, quote_amount / 100.0))
        }
        async fn create_order_stop(
            &self,
            pair: &str,
            size: f64,
            _limit: f64,
        ) -> Result<Order, OrderError> {
            self.calls.lock().unwrap().push("stop".into());
            Ok(self.dummy_order(pair, Side::Sell, size))
        }
        async fn cancel(&self, _order: &Order) -> Result<(), OrderError> {
            Ok(())
        }
    }

    fn frame_with_closes(closes: &[f64]) -> Dataframe {
        let mut df = Dataframe::new("BTCUSDT");
        df.close = closes.to_vec();
        df.open = closes.to_vec();
        df.high = closes.to_vec();
        df.low = closes.to_vec();
        df.volume = vec![1.0; closes.len()];
        df
    }

    #[tokio::test]
    async fn buys_with_full_quote_on_fresh_crossover() {
        let strategy = Crossover::new(Timeframe::H1, 2, 3);
        // flat, then a final surge: fast mean crosses above slow mean
        let mut df = frame_with_closes(&[100.0, 100.0, 100.0, 100.0, 130.0]);
        strategy.indicators(&mut df);

        let broker = RecordingBroker::new(0.0, 1_000.0);
        strategy.on_candle(&df, &broker).await;

        let calls = broker.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], "market_quote BUY 1000");
    }

    #[tokio::test]
    async fn sells_holdings_on_crossunder() {
        let strategy = Crossover::new(Timeframe::H1, 2, 3);
        let mut df = frame_with_closes(&[130.0, 130.0, 130.0, 130.0, 70.0]);
        strategy.indicators(&mut df);

        let broker = RecordingBroker::new(5.0, 0.0);
        strategy.on_candle(&df, &broker).await;

        let calls = broker.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], "market SELL 5");
    }

    #[tokio::test]
    async fn no_signal_no_orders() {
        let strategy = Crossover::new(Timeframe::H1, 2, 3);
        let mut df = frame_with_closes(&[100.0, 100.0, 100.0, 100.0, 100.0]);
        strategy.indicators(&mut df);

        let broker = RecordingBroker::new(0.0, 1_000.0);
        strategy.on_candle(&df, &broker).await;
        assert!(broker.calls.lock().unwrap().is_empty());
    }
}
