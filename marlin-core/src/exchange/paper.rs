//! Simulated matching engine ("paper wallet").
//!
//! Implements both `Broker` and `Feeder` — market data is delegated to
//! an upstream feeder — over per-asset free/locked balances. Resting
//! orders reserve funds at creation and fill against observed candles;
//! market orders settle inline. Only the wallet's own orders are
//! matched; there is no price-time priority against other participants.

use crate::domain::{
    amount_to_lot_size, Account, AssetInfo, Balance, Candle, InstrumentMap, Order,
    OrderKind, OrderStatus, Side,
};
use crate::feed::Timeframe;
use crate::service::{Broker, FeedError, Feeder, OrderError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One point of a timestamped value series.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuePoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Maximum peak-to-trough equity decline.
#[derive(Debug, Clone, PartialEq)]
pub struct Drawdown {
    /// Decline as a (negative) fraction of the peak value.
    pub ratio: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
struct AssetBalance {
    free: f64,
    locked: f64,
}

#[derive(Default)]
struct WalletState {
    assets: HashMap<String, AssetBalance>,
    avg_long: HashMap<String, f64>,
    avg_short: HashMap<String, f64>,
    volume: HashMap<String, f64>,
    orders: Vec<Order>,
    first_candle: HashMap<String, Candle>,
    last_candle: HashMap<String, Candle>,
    asset_values: HashMap<String, Vec<ValuePoint>>,
    equity_values: Vec<ValuePoint>,
}

/// In-process venue for backtesting and paper trading.
pub struct PaperWallet {
    base_coin: String,
    counter: AtomicU64,
    feeder: Arc<dyn Feeder>,
    instruments: InstrumentMap,
    initial_value: f64,
    state: Mutex<WalletState>,
}

/// Builder configuring the wallet's initial deposits.
pub struct PaperWalletBuilder {
    base_coin: String,
    feeder: Arc<dyn Feeder>,
    instruments: InstrumentMap,
    deposits: Vec<(String, f64)>,
}

impl PaperWalletBuilder {
    /// Deposit an initial free amount of one asset.
    pub fn asset(mut self, asset: &str, amount: f64) -> Self {
        self.deposits.push((asset.to_string(), amount));
        self
    }

    pub fn build(self) -> PaperWallet {
        let mut state = WalletState::default();
        for (asset, amount) in self.deposits {
            state.assets.insert(asset, AssetBalance { free: amount, locked: 0.0 });
        }
        let initial_value = state
            .assets
            .get(&self.base_coin)
            .map(|b| b.free)
            .unwrap_or_default();
        tracing::info!(
            base = %self.base_coin,
            initial = initial_value,
            "[SETUP] using paper wallet"
        );
        PaperWallet {
            base_coin: self.base_coin,
            counter: AtomicU64::new(0),
            feeder: self.feeder,
            instruments: self.instruments,
            initial_value,
            state: Mutex::new(state),
        }
    }
}

impl PaperWallet {
    #[cfg(test)]
    fn push_equity(&self, time: DateTime<Utc>, value: f64) {
        let mut state = self.state.lock().expect("wallet lock poisoned");
        state.equity_values.push(ValuePoint { time, value });
    }

    pub fn builder(
        base_coin: &str,
        feeder: Arc<dyn Feeder>,
        instruments: InstrumentMap,
    ) -> PaperWalletBuilder {
        PaperWalletBuilder {
            base_coin: base_coin.to_string(),
            feeder,
            instruments,
            deposits: Vec::new(),
        }
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn split(&self, pair: &str) -> Result<(String, String), OrderError> {
        self.instruments
            .split(pair)
            .map(|(base, quote)| (base.to_string(), quote.to_string()))
            .ok_or_else(|| OrderError::UnknownPair(pair.to_string()))
    }

    /// Per-asset value history.
    pub fn asset_values(&self, asset: &str) -> Vec<ValuePoint> {
        let state = self.state.lock().expect("wallet lock poisoned");
        state.asset_values.get(asset).cloned().unwrap_or_default()
    }

    /// Total equity history, one point per completed candle.
    pub fn equity_values(&self) -> Vec<ValuePoint> {
        let state = self.state.lock().expect("wallet lock poisoned");
        state.equity_values.clone()
    }

    /// Maximum peak-to-trough decline over the equity series, found in a
    /// single forward scan. `None` when equity never declined.
    pub fn max_drawdown(&self) -> Option<Drawdown> {
        let state = self.state.lock().expect("wallet lock poisoned");
        let points = &state.equity_values;
        if points.len() < 2 {
            return None;
        }

        let mut local_min = f64::MAX;
        let mut local_base = points[0].value;
        let mut local_start = points[0].time;
        let mut local_end = points[0].time;
        let mut global_min = f64::MAX;
        let mut global_base = local_base;
        let mut global_start = local_start;
        let mut global_end = local_end;

        for i in 1..points.len() {
            let diff = points[i].value - points[i - 1].value;
            if local_min > 0.0 {
                // not inside a decline: start a fresh run from the peak
                local_min = diff;
                local_base = points[i - 1].value;
                local_start = points[i - 1].time;
                local_end = points[i].time;
            } else {
                local_min += diff;
                local_end = points[i].time;
            }
            if local_min < global_min {
                global_min = local_min;
                global_base = local_base;
                global_start = local_start;
                global_end = local_end;
            }
        }

        if global_min >= 0.0 || global_min == f64::MAX {
            return None;
        }
        Some(Drawdown {
            ratio: global_min / global_base,
            start: global_start,
            end: global_end,
        })
    }

    /// Final wallet report: portfolio values, buy-and-hold comparison,
    /// drawdown and traded volume.
    pub fn summary(&self) -> WalletSummary {
        let max_drawdown = self.max_drawdown();
        let state = self.state.lock().expect("wallet lock poisoned");

        let mut total = 0.0;
        let mut market_change = 0.0;
        let mut holdings = Vec::new();
        for (pair, last) in &state.last_candle {
            let Some((base, _)) = self.instruments.split(pair) else {
                continue;
            };
            let Some(balance) = state.assets.get(base) else {
                continue;
            };
            let quantity = balance.free + balance.locked;
            let mut value = quantity * last.close;
            if quantity < 0.0 {
                let avg_short = state.avg_short.get(pair).copied().unwrap_or_default();
                // closing the short at the last price
                value = (2.0 * avg_short * quantity - last.close * quantity).abs();
            }
            total += value;
            if let Some(first) = state.first_candle.get(pair) {
                market_change += (last.close - first.close) / first.close;
            }
            holdings.push((base.to_string(), quantity));
        }
        holdings.sort_by(|a, b| a.0.cmp(&b.0));

        let pairs = state.last_candle.len().max(1) as f64;
        let base_value = state
            .assets
            .get(&self.base_coin)
            .map(|b| b.free + b.locked)
            .unwrap_or_default();

        let mut volumes: Vec<(String, f64)> =
            state.volume.iter().map(|(p, v)| (p.clone(), *v)).collect();
        volumes.sort_by(|a, b| a.0.cmp(&b.0));

        WalletSummary {
            base_coin: self.base_coin.clone(),
            start_portfolio: self.initial_value,
            final_portfolio: total + base_value,
            gross_profit: total + base_value - self.initial_value,
            market_change_pct: market_change / pairs,
            max_drawdown,
            volumes,
            holdings,
        }
    }

    // ── Fund admission ─────────────────────────────────────────────────

    /// Check and reserve the funds a new order needs.
    ///
    /// A sell reserves `min(free base, requested)` plus the quote value
    /// of any shortfall (short exposure); a buy reserves quote value,
    /// covering a pre-existing negative base balance first. With `fill`
    /// the reservation settles immediately (market order), otherwise it
    /// moves into the locked buckets until the resting order resolves.
    fn validate_funds(
        &self,
        state: &mut WalletState,
        side: Side,
        pair: &str,
        amount: f64,
        value: f64,
        fill: bool,
    ) -> Result<(), OrderError> {
        let (base, quote) = self.split(pair)?;
        state.assets.entry(base.clone()).or_default();
        state.assets.entry(quote.clone()).or_default();

        match side {
            Side::Sell => {
                let base_free = state.assets[&base].free;
                let mut funds = state.assets[&quote].free;
                if base_free > 0.0 {
                    funds += base_free * value;
                }
                if funds < amount * value {
                    return Err(OrderError::InsufficientFunds {
                        pair: pair.to_string(),
                        quantity: amount,
                    });
                }

                let locked_base = base_free.max(0.0).min(amount);
                let locked_quote = (amount - locked_base) * value;

                state.assets.get_mut(&base).expect("base entry").free -= locked_base;
                state.assets.get_mut(&quote).expect("quote entry").free -= locked_quote;

                if fill {
                    self.update_average_price(state, side, pair, &base, amount, value);
                    if locked_quote > 0.0 {
                        // short: the borrowed amount leaves the base balance
                        state.assets.get_mut(&base).expect("base entry").free -= amount;
                    } else {
                        state.assets.get_mut(&quote).expect("quote entry").free +=
                            amount * value;
                    }
                } else {
                    let entry = state.assets.get_mut(&base).expect("base entry");
                    entry.locked += locked_base;
                    state.assets.get_mut(&quote).expect("quote entry").locked +=
                        locked_quote;
                }
            }
            Side::Buy => {
                let base_free = state.assets[&base].free;
                let mut liquid_short_value = 0.0;
                if base_free < 0.0 {
                    let short = base_free.abs();
                    let avg_short = state.avg_short.get(pair).copied().unwrap_or_default();
                    liquid_short_value = 2.0 * short * avg_short - short * value;
                }
                let funds = state.assets[&quote].free + liquid_short_value;

                // covering an open short first shrinks what must be bought
                let amount_to_buy = if base_free < 0.0 { amount + base_free } else { amount };
                if funds < amount_to_buy * value {
                    return Err(OrderError::InsufficientFunds {
                        pair: pair.to_string(),
                        quantity: amount,
                    });
                }

                let locked_base = (-base_free.min(0.0)).min(amount);
                let locked_quote = (amount - locked_base) * value - liquid_short_value;

                state.assets.get_mut(&base).expect("base entry").free += locked_base;
                state.assets.get_mut(&quote).expect("quote entry").free -= locked_quote;

                if fill {
                    self.update_average_price(state, side, pair, &base, amount, value);
                    state.assets.get_mut(&base).expect("base entry").free +=
                        amount - locked_base;
                } else {
                    state.assets.get_mut(&base).expect("base entry").locked += locked_base;
                    state.assets.get_mut(&quote).expect("quote entry").locked +=
                        locked_quote;
                }
            }
        }
        Ok(())
    }

    /// Maintain the long/short average entry prices for a pair.
    fn update_average_price(
        &self,
        state: &mut WalletState,
        side: Side,
        pair: &str,
        base: &str,
        amount: f64,
        value: f64,
    ) {
        let actual_qty = state.assets.get(base).map(|b| b.free).unwrap_or_default();

        if actual_qty == 0.0 {
            match side {
                Side::Buy => state.avg_long.insert(pair.to_string(), value),
                Side::Sell => state.avg_short.insert(pair.to_string(), value),
            };
            return;
        }

        if actual_qty > 0.0 && side == Side::Buy {
            let avg = state.avg_long.entry(pair.to_string()).or_default();
            *avg = (*avg * actual_qty + amount * value) / (actual_qty + amount);
            return;
        }

        if actual_qty > 0.0 && side == Side::Sell {
            let avg_long = state.avg_long.get(pair).copied().unwrap_or_default();
            let profit = amount * value - amount.min(actual_qty) * avg_long;
            tracing::debug!(
                pair,
                profit,
                pct = profit / (amount * avg_long) * 100.0,
                "paper wallet mark"
            );
            if amount <= actual_qty {
                return; // long survives, basis unchanged
            }
            state.avg_short.insert(pair.to_string(), value);
            return;
        }

        if actual_qty < 0.0 && side == Side::Sell {
            let avg = state.avg_short.entry(pair.to_string()).or_default();
            *avg = (*avg * -actual_qty + amount * value) / (-actual_qty + amount);
            return;
        }

        // short position reduced or flipped by a buy
        let avg_short = state.avg_short.get(pair).copied().unwrap_or_default();
        let profit = amount.min(-actual_qty) * avg_short - amount * value;
        tracing::debug!(
            pair,
            profit,
            pct = profit / (amount * avg_short) * 100.0,
            "paper wallet mark"
        );
        if amount <= -actual_qty {
            return;
        }
        state.avg_long.insert(pair.to_string(), value);
    }

    // ── Matching ───────────────────────────────────────────────────────

    /// Match the wallet's resting orders against a new candle, then (for
    /// completed candles) append the per-asset and equity value series.
    pub fn on_candle(&self, candle: &Candle) {
        let mut guard = self.state.lock().expect("wallet lock poisoned");
        let state = &mut *guard;

        state
            .last_candle
            .insert(candle.pair.clone(), candle.clone());
        state
            .first_candle
            .entry(candle.pair.clone())
            .or_insert_with(|| candle.clone());

        let Ok((base, quote)) = self.split(&candle.pair) else {
            return;
        };

        for i in 0..state.orders.len() {
            if state.orders[i].pair != candle.pair
                || state.orders[i].status != OrderStatus::New
            {
                continue;
            }
            state.volume.entry(candle.pair.clone()).or_default();

            let order = state.orders[i].clone();
            match order.side {
                Side::Buy => {
                    if order.price < candle.close {
                        continue;
                    }
                    let fill_price = order.price;
                    cancel_group_siblings(&mut state.orders, &order, candle.time);

                    state.assets.entry(base.clone()).or_default();
                    *state.volume.get_mut(&candle.pair).expect("volume entry") +=
                        fill_price * order.quantity;
                    state.orders[i].updated_at = candle.time;
                    state.orders[i].status = OrderStatus::Filled;

                    self.update_average_price(
                        state,
                        Side::Buy,
                        &candle.pair,
                        &base,
                        order.quantity,
                        fill_price,
                    );
                    state.assets.get_mut(&base).expect("base entry").free +=
                        order.quantity;
                    state.assets.get_mut(&quote).expect("quote entry").locked -=
                        fill_price * order.quantity;
                }
                Side::Sell => {
                    let resting_limit = matches!(
                        order.kind,
                        OrderKind::Limit
                            | OrderKind::LimitMaker
                            | OrderKind::TakeProfit
                            | OrderKind::TakeProfitLimit
                    );
                    let stop = matches!(
                        order.kind,
                        OrderKind::StopLoss | OrderKind::StopLossLimit
                    );
                    let fill_price = if resting_limit && candle.high >= order.price {
                        order.price
                    } else if stop
                        && order.stop.is_some_and(|stop| candle.low <= stop)
                    {
                        order.stop.expect("stop present")
                    } else {
                        continue;
                    };

                    cancel_group_siblings(&mut state.orders, &order, candle.time);

                    state.assets.entry(quote.clone()).or_default();
                    *state.volume.get_mut(&candle.pair).expect("volume entry") +=
                        fill_price * order.quantity;
                    state.orders[i].updated_at = candle.time;
                    state.orders[i].status = OrderStatus::Filled;

                    self.update_average_price(
                        state,
                        Side::Sell,
                        &candle.pair,
                        &base,
                        order.quantity,
                        fill_price,
                    );
                    state.assets.get_mut(&base).expect("base entry").locked -=
                        order.quantity;
                    state.assets.get_mut(&quote).expect("quote entry").free +=
                        fill_price * order.quantity;
                }
            }
        }

        if candle.complete {
            self.record_equity(state, candle.time);
        }
    }

    fn record_equity(&self, state: &mut WalletState, time: DateTime<Utc>) {
        let rows: Vec<(String, f64)> = state
            .assets
            .iter()
            .filter(|(asset, _)| *asset != &self.base_coin)
            .map(|(asset, balance)| (asset.clone(), balance.free + balance.locked))
            .collect();

        let mut total = 0.0;
        for (asset, amount) in rows {
            let close = self
                .instruments
                .pair_for(&asset, &self.base_coin)
                .and_then(|pair| state.last_candle.get(pair))
                .map(|c| c.close)
                .unwrap_or_default();
            if amount < 0.0 {
                let short = amount.abs();
                let avg_short = self
                    .instruments
                    .pair_for(&asset, &self.base_coin)
                    .and_then(|pair| state.avg_short.get(pair))
                    .copied()
                    .unwrap_or_default();
                total += 2.0 * short * avg_short - short * close;
            } else {
                total += amount * close;
            }
            state
                .asset_values
                .entry(asset)
                .or_default()
                .push(ValuePoint { time, value: amount * close });
        }

        let base = state
            .assets
            .get(&self.base_coin)
            .copied()
            .unwrap_or_default();
        state.equity_values.push(ValuePoint {
            time,
            value: total + base.free + base.locked,
        });
    }

    fn last_candle_for(&self, state: &WalletState, pair: &str) -> Result<Candle, OrderError> {
        state
            .last_candle
            .get(pair)
            .cloned()
            .ok_or_else(|| OrderError::Broker(format!("no market data for {pair}")))
    }

    fn create_market(
        &self,
        state: &mut WalletState,
        side: Side,
        pair: &str,
        size: f64,
    ) -> Result<Order, OrderError> {
        if size <= 0.0 {
            return Err(OrderError::InvalidQuantity);
        }
        let last = self.last_candle_for(state, pair)?;
        self.validate_funds(state, side, pair, size, last.close, true)?;

        *state.volume.entry(pair.to_string()).or_default() += last.close * size;
        let order = Order {
            id: None,
            exchange_id: self.next_id(),
            pair: pair.to_string(),
            side,
            kind: OrderKind::Market,
            status: OrderStatus::Filled,
            price: last.close,
            quantity: size,
            created_at: last.time,
            updated_at: last.time,
            stop: None,
            group_id: None,
            profit_pct: 0.0,
            profit_abs: 0.0,
        };
        state.orders.push(order.clone());
        Ok(order)
    }
}

/// Cancel the first active sibling sharing the order's OCO group but
/// created under a different exchange id. Runs before the fill is
/// recorded so both legs triggering in one candle still cancel exactly
/// once.
fn cancel_group_siblings(orders: &mut [Order], filled: &Order, time: DateTime<Utc>) {
    let Some(group_id) = filled.group_id else {
        return;
    };
    for sibling in orders.iter_mut() {
        if sibling.group_id == Some(group_id)
            && sibling.exchange_id != filled.exchange_id
            && sibling.status == OrderStatus::New
        {
            sibling.status = OrderStatus::Canceled;
            sibling.updated_at = time;
            break;
        }
    }
}

#[async_trait]
impl Broker for PaperWallet {
    async fn account(&self) -> Result<Account, OrderError> {
        let state = self.state.lock().expect("wallet lock poisoned");
        let mut balances: Vec<Balance> = state
            .assets
            .iter()
            .map(|(asset, balance)| Balance {
                asset: asset.clone(),
                free: balance.free,
                locked: balance.locked,
            })
            .collect();
        balances.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok(Account { balances })
    }

    async fn position(&self, pair: &str) -> Result<(f64, f64), OrderError> {
        let (base, quote) = self.split(pair)?;
        let account = Broker::account(self).await?;
        let (base_balance, quote_balance) = account.balance(&base, &quote);
        Ok((
            base_balance.free + base_balance.locked,
            quote_balance.free + quote_balance.locked,
        ))
    }

    async fn order(&self, _pair: &str, exchange_id: u64) -> Result<Order, OrderError> {
        let state = self.state.lock().expect("wallet lock poisoned");
        state
            .orders
            .iter()
            .find(|o| o.exchange_id == exchange_id)
            .cloned()
            .ok_or(OrderError::OrderNotFound(exchange_id))
    }

    async fn create_order_oco(
        &self,
        side: Side,
        pair: &str,
        size: f64,
        price: f64,
        stop: f64,
        stop_limit: f64,
    ) -> Result<Vec<Order>, OrderError> {
        let mut state = self.state.lock().expect("wallet lock poisoned");
        if size <= 0.0 {
            return Err(OrderError::InvalidQuantity);
        }
        let last = self.last_candle_for(&state, pair)?;
        self.validate_funds(&mut state, side, pair, size, price, false)?;

        let group_id = self.next_id();
        let limit_maker = Order {
            id: None,
            exchange_id: self.next_id(),
            pair: pair.to_string(),
            side,
            kind: OrderKind::LimitMaker,
            status: OrderStatus::New,
            price,
            quantity: size,
            created_at: last.time,
            updated_at: last.time,
            stop: None,
            group_id: Some(group_id),
            profit_pct: 0.0,
            profit_abs: 0.0,
        };
        let stop_order = Order {
            id: None,
            exchange_id: self.next_id(),
            pair: pair.to_string(),
            side,
            kind: OrderKind::StopLoss,
            status: OrderStatus::New,
            price: stop_limit,
            quantity: size,
            created_at: last.time,
            updated_at: last.time,
            stop: Some(stop),
            group_id: Some(group_id),
            profit_pct: 0.0,
            profit_abs: 0.0,
        };

        state.orders.push(limit_maker.clone());
        state.orders.push(stop_order.clone());
        Ok(vec![limit_maker, stop_order])
    }

    async fn create_order_limit(
        &self,
        side: Side,
        pair: &str,
        size: f64,
        limit: f64,
    ) -> Result<Order, OrderError> {
        let mut state = self.state.lock().expect("wallet lock poisoned");
        if size <= 0.0 {
            return Err(OrderError::InvalidQuantity);
        }
        let last = self.last_candle_for(&state, pair)?;
        self.validate_funds(&mut state, side, pair, size, limit, false)?;

        let order = Order {
            id: None,
            exchange_id: self.next_id(),
            pair: pair.to_string(),
            side,
            kind: OrderKind::Limit,
            status: OrderStatus::New,
            price: limit,
            quantity: size,
            created_at: last.time,
            updated_at: last.time,
            stop: None,
            group_id: None,
            profit_pct: 0.0,
            profit_abs: 0.0,
        };
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn create_order_market(
        &self,
        side: Side,
        pair: &str,
        size: f64,
    ) -> Result<Order, OrderError> {
        let mut state = self.state.lock().expect("wallet lock poisoned");
        self.create_market(&mut state, side, pair, size)
    }

    async fn create_order_market_quote(
        &self,
        side: Side,
        pair: &str,
        quote_amount: f64,
    ) -> Result<Order, OrderError> {
        let info = self.asset_info(pair);
        let mut state = self.state.lock().expect("wallet lock poisoned");
        let last = self.last_candle_for(&state, pair)?;
        let quantity = amount_to_lot_size(
            info.step_size,
            info.base_precision,
            quote_amount / last.close,
        );
        self.create_market(&mut state, side, pair, quantity)
    }

    async fn create_order_stop(
        &self,
        pair: &str,
        size: f64,
        limit: f64,
    ) -> Result<Order, OrderError> {
        let mut state = self.state.lock().expect("wallet lock poisoned");
        if size <= 0.0 {
            return Err(OrderError::InvalidQuantity);
        }
        let last = self.last_candle_for(&state, pair)?;
        self.validate_funds(&mut state, Side::Sell, pair, size, limit, false)?;

        let order = Order {
            id: None,
            exchange_id: self.next_id(),
            pair: pair.to_string(),
            side: Side::Sell,
            kind: OrderKind::StopLossLimit,
            status: OrderStatus::New,
            price: limit,
            quantity: size,
            created_at: last.time,
            updated_at: last.time,
            stop: Some(limit),
            group_id: None,
            profit_pct: 0.0,
            profit_abs: 0.0,
        };
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn cancel(&self, order: &Order) -> Result<(), OrderError> {
        let mut state = self.state.lock().expect("wallet lock poisoned");
        for resting in state.orders.iter_mut() {
            if resting.exchange_id == order.exchange_id {
                resting.status = OrderStatus::Canceled;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Feeder for PaperWallet {
    fn asset_info(&self, pair: &str) -> AssetInfo {
        self.feeder.asset_info(pair)
    }

    async fn last_quote(&self, pair: &str) -> Result<f64, FeedError> {
        self.feeder.last_quote(pair).await
    }

    async fn candles_by_period(
        &self,
        pair: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, FeedError> {
        self.feeder
            .candles_by_period(pair, timeframe, start, end)
            .await
    }

    async fn candles_by_limit(
        &self,
        pair: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, FeedError> {
        self.feeder.candles_by_limit(pair, timeframe, limit).await
    }

    async fn candles_subscription(
        &self,
        pair: &str,
        timeframe: Timeframe,
    ) -> (mpsc::Receiver<Candle>, mpsc::Receiver<FeedError>) {
        self.feeder.candles_subscription(pair, timeframe).await
    }
}

/// Final wallet report.
#[derive(Debug, Clone)]
pub struct WalletSummary {
    pub base_coin: String,
    pub start_portfolio: f64,
    pub final_portfolio: f64,
    pub gross_profit: f64,
    pub market_change_pct: f64,
    pub max_drawdown: Option<Drawdown>,
    pub volumes: Vec<(String, f64)>,
    pub holdings: Vec<(String, f64)>,
}

impl fmt::Display for WalletSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "----- FINAL WALLET -----")?;
        for (asset, quantity) in &self.holdings {
            writeln!(f, "{quantity:.4} {asset}")?;
        }
        writeln!(
            f,
            "START PORTFOLIO     = {:.2} {}",
            self.start_portfolio, self.base_coin
        )?;
        writeln!(
            f,
            "FINAL PORTFOLIO     = {:.2} {}",
            self.final_portfolio, self.base_coin
        )?;
        writeln!(
            f,
            "GROSS PROFIT        = {:.4} {} ({:.2}%)",
            self.gross_profit,
            self.base_coin,
            if self.start_portfolio != 0.0 {
                self.gross_profit / self.start_portfolio * 100.0
            } else {
                0.0
            }
        )?;
        writeln!(
            f,
            "MARKET CHANGE (B&H) = {:.2}%",
            self.market_change_pct * 100.0
        )?;
        match &self.max_drawdown {
            Some(dd) => writeln!(f, "MAX DRAWDOWN        = {:.2} %", dd.ratio * 100.0)?,
            None => writeln!(f, "MAX DRAWDOWN        = 0.00 %")?,
        }
        for (pair, volume) in &self.volumes {
            writeln!(f, "VOLUME {pair}     = {volume:.2} {}", self.base_coin)?;
        }
        Ok(())
    }
}
