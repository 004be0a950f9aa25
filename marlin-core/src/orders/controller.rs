//! Order lifecycle controller.
//!
//! Creation operations validate, delegate to the venue, persist, publish
//! and notify. A fixed-interval reconciliation loop — independent of
//! candle arrival — re-fetches every locally non-terminal order from the
//! venue, persists changes, routes fills through the position ledger and
//! accrues the per-pair performance summary. Market orders do the ledger
//! and summary work synchronously at creation, since their fill is known
//! immediately.

use crate::domain::{Account, Candle, InstrumentMap, Order, OrderStatus, Position, Side};
use crate::orders::summary::Summary;
use crate::orders::OrderFeed;
use crate::service::{Broker, Exchange, Notifier, OrderError};
use crate::storage::{OrderFilter, Storage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Controller run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Stopped,
}

#[derive(Default)]
struct ControllerState {
    positions: HashMap<String, Position>,
    results: HashMap<String, Summary>,
    last_price: HashMap<String, f64>,
}

/// Drives orders from creation to terminal state and keeps the books.
pub struct Controller {
    exchange: Arc<dyn Exchange>,
    storage: Arc<dyn Storage>,
    order_feed: Arc<OrderFeed>,
    instruments: InstrumentMap,
    notifier: Mutex<Option<Arc<dyn Notifier>>>,
    state: Mutex<ControllerState>,
    op_lock: tokio::sync::Mutex<()>,
    tick_interval: Duration,
    shutdown: watch::Sender<bool>,
    reconcile_task: Mutex<Option<JoinHandle<()>>>,
    status: Mutex<Status>,
}

impl Controller {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        storage: Arc<dyn Storage>,
        order_feed: Arc<OrderFeed>,
        instruments: InstrumentMap,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            exchange,
            storage,
            order_feed,
            instruments,
            notifier: Mutex::new(None),
            state: Mutex::new(ControllerState::default()),
            op_lock: tokio::sync::Mutex::new(()),
            tick_interval: Duration::from_secs(1),
            shutdown,
            reconcile_task: Mutex::new(None),
            status: Mutex::new(Status::Stopped),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn set_notifier(&self, notifier: Arc<dyn Notifier>) {
        *self.notifier.lock().expect("controller lock poisoned") = Some(notifier);
    }

    pub fn status(&self) -> Status {
        *self.status.lock().expect("controller lock poisoned")
    }

    /// Track the latest close for position valuation.
    pub fn on_candle(&self, candle: &Candle) {
        let mut state = self.state.lock().expect("controller lock poisoned");
        state.last_price.insert(candle.pair.clone(), candle.close);
    }

    /// Snapshot of a pair's performance summary.
    pub fn summary(&self, pair: &str) -> Option<Summary> {
        let state = self.state.lock().expect("controller lock poisoned");
        state.results.get(pair).cloned()
    }

    /// Snapshot of every pair's performance summary.
    pub fn summaries(&self) -> Vec<Summary> {
        let state = self.state.lock().expect("controller lock poisoned");
        let mut all: Vec<Summary> = state.results.values().cloned().collect();
        all.sort_by(|a, b| a.pair.cmp(&b.pair));
        all
    }

    /// Current open position for a pair, if any.
    pub fn open_position(&self, pair: &str) -> Option<Position> {
        let state = self.state.lock().expect("controller lock poisoned");
        state.positions.get(pair).cloned()
    }

    /// Start the reconciliation loop. Idempotent.
    pub fn start(self: Arc<Self>) {
        {
            let mut status = self.status.lock().expect("controller lock poisoned");
            if *status == Status::Running {
                return;
            }
            *status = Status::Running;
        }

        let controller = Arc::clone(&self);
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(controller.tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => controller.update_orders().await,
                    _ = shutdown.changed() => {
                        // one final pass before exiting
                        controller.update_orders().await;
                        break;
                    }
                }
            }
        });
        *self.reconcile_task.lock().expect("controller lock poisoned") = Some(handle);
        tracing::info!("order controller started");
    }

    /// Stop the reconciliation loop after a final pass.
    pub async fn stop(&self) {
        {
            let mut status = self.status.lock().expect("controller lock poisoned");
            if *status != Status::Running {
                return;
            }
            *status = Status::Stopped;
        }
        let _ = self.shutdown.send(true);
        let handle = self
            .reconcile_task
            .lock()
            .expect("controller lock poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        tracing::info!("order controller stopped");
    }

    // ── Reconciliation ─────────────────────────────────────────────────

    /// One reconciliation pass: refresh every locally non-terminal order
    /// from the venue. Venue errors skip the order; it is retried on the
    /// next pass, indefinitely.
    pub async fn update_orders(&self) {
        let _op = self.op_lock.lock().await;

        let open = match self.storage.orders(&[OrderFilter::StatusIn(vec![
            OrderStatus::New,
            OrderStatus::PartiallyFilled,
            OrderStatus::PendingCancel,
        ])]) {
            Ok(orders) => orders,
            Err(err) => {
                self.notify_error(&err);
                return;
            }
        };

        let mut updated = Vec::new();
        for order in open {
            let mut venue_order =
                match self.exchange.order(&order.pair, order.exchange_id).await {
                    Ok(o) => o,
                    Err(err) => {
                        tracing::error!(
                            exchange_id = order.exchange_id,
                            "reconciliation fetch failed: {err}"
                        );
                        continue;
                    }
                };
            if venue_order.status == order.status {
                continue;
            }
            venue_order.id = order.id;
            if let Err(err) = self.storage.update_order(&venue_order) {
                self.notify_error(&err);
                continue;
            }
            tracing::info!("[ORDER {}] {}", venue_order.status, venue_order);
            updated.push(venue_order);
        }

        for mut order in updated {
            self.process_trade(&mut order);
            self.order_feed.publish(order, false).await;
        }
    }

    /// Route a filled order into volume accrual and the position ledger.
    fn process_trade(&self, order: &mut Order) {
        if order.status != OrderStatus::Filled {
            return;
        }

        let mut profit_message = None;
        {
            let mut guard = self.state.lock().expect("controller lock poisoned");
            let state = &mut *guard;

            state
                .results
                .entry(order.pair.clone())
                .or_insert_with(|| Summary::new(&order.pair))
                .add_volume(order.price * order.quantity);

            if !state.positions.contains_key(&order.pair) {
                state
                    .positions
                    .insert(order.pair.clone(), Position::open(order));
            } else {
                let position = state
                    .positions
                    .get_mut(&order.pair)
                    .expect("position present");
                let (result, finished) = position.update(order);
                if finished {
                    state.positions.remove(&order.pair);
                }
                if let Some(result) = result {
                    let summary = state
                        .results
                        .get_mut(&order.pair)
                        .expect("summary present");
                    summary.add_result(&result);
                    let quote = self
                        .instruments
                        .split(&order.pair)
                        .map(|(_, quote)| quote)
                        .unwrap_or_default();
                    profit_message = Some(format!(
                        "[PROFIT] {:.4} {} ({:.2} %)\n{}",
                        result.profit_abs,
                        quote,
                        result.profit_pct * 100.0,
                        summary,
                    ));
                }
            }
        }
        if let Some(message) = profit_message {
            self.notify(&message);
        }
    }

    // ── Creation operations ────────────────────────────────────────────

    pub async fn create_order_oco(
        &self,
        side: Side,
        pair: &str,
        size: f64,
        price: f64,
        stop: f64,
        stop_limit: f64,
    ) -> Result<Vec<Order>, OrderError> {
        let _op = self.op_lock.lock().await;
        if size <= 0.0 {
            return Err(OrderError::InvalidQuantity);
        }
        tracing::info!(pair, "[ORDER] creating OCO order");

        let orders = match self
            .exchange
            .create_order_oco(side, pair, size, price, stop, stop_limit)
            .await
        {
            Ok(orders) => orders,
            Err(err) => {
                self.notify_error(&err);
                return Err(err);
            }
        };

        let mut persisted = Vec::with_capacity(orders.len());
        for mut order in orders {
            if let Err(err) = self.storage.create_order(&mut order) {
                self.notify_error(&err);
            }
            self.order_feed.publish(order.clone(), true).await;
            persisted.push(order);
        }
        Ok(persisted)
    }

    pub async fn create_order_limit(
        &self,
        side: Side,
        pair: &str,
        size: f64,
        limit: f64,
    ) -> Result<Order, OrderError> {
        let _op = self.op_lock.lock().await;
        if size <= 0.0 {
            return Err(OrderError::InvalidQuantity);
        }
        tracing::info!(pair, %side, "[ORDER] creating LIMIT order");

        let order = match self
            .exchange
            .create_order_limit(side, pair, size, limit)
            .await
        {
            Ok(order) => order,
            Err(err) => {
                self.notify_error(&err);
                return Err(err);
            }
        };
        self.persist_and_publish(order).await
    }

    pub async fn create_order_market(
        &self,
        side: Side,
        pair: &str,
        size: f64,
    ) -> Result<Order, OrderError> {
        let _op = self.op_lock.lock().await;
        if size <= 0.0 {
            return Err(OrderError::InvalidQuantity);
        }
        tracing::info!(pair, %side, "[ORDER] creating MARKET order");

        let order = match self.exchange.create_order_market(side, pair, size).await {
            Ok(order) => order,
            Err(err) => {
                self.notify_error(&err);
                return Err(err);
            }
        };
        self.settle_market_order(order).await
    }

    pub async fn create_order_market_quote(
        &self,
        side: Side,
        pair: &str,
        amount: f64,
    ) -> Result<Order, OrderError> {
        let _op = self.op_lock.lock().await;
        if amount <= 0.0 {
            return Err(OrderError::InvalidQuantity);
        }
        tracing::info!(pair, %side, "[ORDER] creating MARKET order by quote");

        let order = match self
            .exchange
            .create_order_market_quote(side, pair, amount)
            .await
        {
            Ok(order) => order,
            Err(err) => {
                self.notify_error(&err);
                return Err(err);
            }
        };
        self.settle_market_order(order).await
    }

    pub async fn create_order_stop(
        &self,
        pair: &str,
        size: f64,
        limit: f64,
    ) -> Result<Order, OrderError> {
        let _op = self.op_lock.lock().await;
        if size <= 0.0 {
            return Err(OrderError::InvalidQuantity);
        }
        tracing::info!(pair, "[ORDER] creating STOP order");

        let order = match self.exchange.create_order_stop(pair, size, limit).await {
            Ok(order) => order,
            Err(err) => {
                self.notify_error(&err);
                return Err(err);
            }
        };
        self.persist_and_publish(order).await
    }

    pub async fn cancel_order(&self, mut order: Order) -> Result<(), OrderError> {
        let _op = self.op_lock.lock().await;
        tracing::info!(pair = %order.pair, "[ORDER] cancelling order");

        self.exchange.cancel(&order).await?;
        order.status = OrderStatus::PendingCancel;
        if let Err(err) = self.storage.update_order(&order) {
            self.notify_error(&err);
            return Err(OrderError::Broker(err.to_string()));
        }
        tracing::info!("[ORDER CANCELED] {order}");
        Ok(())
    }

    /// Persist and publish a resting order (no immediate fill).
    async fn persist_and_publish(&self, mut order: Order) -> Result<Order, OrderError> {
        if let Err(err) = self.storage.create_order(&mut order) {
            // the venue accepted; report and hand the order back anyway
            self.notify_error(&err);
        }
        self.order_feed.publish(order.clone(), true).await;
        tracing::info!("[ORDER CREATED] {order}");
        Ok(order)
    }

    /// Persist a market order and settle its known-immediate fill.
    async fn settle_market_order(&self, mut order: Order) -> Result<Order, OrderError> {
        if let Err(err) = self.storage.create_order(&mut order) {
            self.notify_error(&err);
        }
        self.process_trade(&mut order);
        self.order_feed.publish(order.clone(), true).await;
        tracing::info!("[ORDER CREATED] {order}");
        Ok(order)
    }

    // ── Account queries ────────────────────────────────────────────────

    pub async fn account(&self) -> Result<Account, OrderError> {
        self.exchange.account().await
    }

    pub async fn position(&self, pair: &str) -> Result<(f64, f64), OrderError> {
        self.exchange.position(pair).await
    }

    pub async fn last_quote(&self, pair: &str) -> Result<f64, OrderError> {
        Ok(self.exchange.last_quote(pair).await?)
    }

    /// Value of a pair's base holding at the last seen close.
    pub async fn position_value(&self, pair: &str) -> Result<f64, OrderError> {
        let (asset, _) = self.exchange.position(pair).await?;
        let price = {
            let state = self.state.lock().expect("controller lock poisoned");
            state.last_price.get(pair).copied().unwrap_or_default()
        };
        Ok(asset * price)
    }

    pub async fn order(&self, pair: &str, exchange_id: u64) -> Result<Order, OrderError> {
        self.exchange.order(pair, exchange_id).await
    }

    // ── Notification ───────────────────────────────────────────────────

    fn notify(&self, message: &str) {
        tracing::info!("{message}");
        let notifier = self.notifier.lock().expect("controller lock poisoned");
        if let Some(notifier) = notifier.as_ref() {
            notifier.notify(message);
        }
    }

    fn notify_error(&self, error: &dyn std::error::Error) {
        tracing::error!("{error}");
        let notifier = self.notifier.lock().expect("controller lock poisoned");
        if let Some(notifier) = notifier.as_ref() {
            notifier.on_error(error);
        }
    }
}

/// Strategies talk to the controller through the same contract as a raw
/// venue, gaining persistence, accounting and notifications for free.
#[async_trait]
impl Broker for Controller {
    async fn account(&self) -> Result<Account, OrderError> {
        Controller::account(self).await
    }

    async fn position(&self, pair: &str) -> Result<(f64, f64), OrderError> {
        Controller::position(self, pair).await
    }

    async fn order(&self, pair: &str, exchange_id: u64) -> Result<Order, OrderError> {
        Controller::order(self, pair, exchange_id).await
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
        Controller::create_order_oco(self, side, pair, size, price, stop, stop_limit).await
    }

    async fn create_order_limit(
        &self,
        side: Side,
        pair: &str,
        size: f64,
        limit: f64,
    ) -> Result<Order, OrderError> {
        Controller::create_order_limit(self, side, pair, size, limit).await
    }

    async fn create_order_market(
        &self,
        side: Side,
        pair: &str,
        size: f64,
    ) -> Result<Order, OrderError> {
        Controller::create_order_market(self, side, pair, size).await
    }

    async fn create_order_market_quote(
        &self,
        side: Side,
        pair: &str,
        quote_amount: f64,
    ) -> Result<Order, OrderError> {
        Controller::create_order_market_quote(self, side, pair, quote_amount).await
    }

    async fn create_order_stop(
        &self,
        pair: &str,
        size: f64,
        limit: f64,
    ) -> Result<Order, OrderError> {
        Controller::create_order_stop(self, pair, size, limit).await
    }

    async fn cancel(&self, order: &Order) -> Result<(), OrderError> {
        Controller::cancel_order(self, order.clone()).await
    }
}
