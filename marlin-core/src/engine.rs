//! Engine orchestrator: wires strategy, queue, feeds, order controller
//! and venue together, and selects backtest vs live execution.
//!
//! Backtest mode preloads every pair's history into the ordered queue,
//! then drains it strictly in time order, single-threaded and
//! deterministic. Live (or paper trading on live data) mode consumes the
//! queue's bounded stream as candles arrive, with no cross-pair ordering
//! guarantee.

use crate::config::{ConfigError, Settings};
use crate::domain::{Candle, CandleEvent};
use crate::exchange::PaperWallet;
use crate::feed::{CandleConsumer, DataFeedManager};
use crate::orders::{Controller, OrderConsumer, OrderFeed};
use crate::queue::EventQueue;
use crate::service::{Broker, Exchange, Feeder, FeedError, Notifier, OrderError};
use crate::storage::{MemoryStorage, Storage};
use crate::strategy::{HighFrequencyStrategy, Strategy, StrategyController};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

const QUEUE_STREAM_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("order error: {0}")]
    Order(#[from] OrderError),
}

/// Assembles an [`Engine`]. Construction-time choices replace any
/// runtime probing: the optional high-frequency handler, the notifier,
/// candle and order subscribers are all declared here.
pub struct EngineBuilder {
    settings: Settings,
    exchange: Arc<dyn Exchange>,
    feeder: Arc<dyn Feeder>,
    strategy: Arc<dyn Strategy>,
    partial_strategy: Option<Arc<dyn HighFrequencyStrategy>>,
    storage: Option<Arc<dyn Storage>>,
    notifier: Option<Arc<dyn Notifier>>,
    paper_wallet: Option<Arc<PaperWallet>>,
    candle_subscribers: Vec<(CandleConsumer, bool)>,
    order_subscribers: Vec<(OrderConsumer, bool)>,
    backtest: bool,
}

impl EngineBuilder {
    /// Run against historical data through the given simulated venue.
    pub fn backtest(mut self, wallet: Arc<PaperWallet>) -> Self {
        self.backtest = true;
        self.paper_wallet = Some(wallet);
        self
    }

    /// Paper-trade on live data: simulated fills, real candles.
    pub fn paper_wallet(mut self, wallet: Arc<PaperWallet>) -> Self {
        self.paper_wallet = Some(wallet);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Attach the strategy's intrabar handler.
    pub fn partial_strategy(mut self, strategy: Arc<dyn HighFrequencyStrategy>) -> Self {
        self.partial_strategy = Some(strategy);
        self
    }

    /// Subscribe an external consumer to every pair's candles.
    pub fn subscribe_candles(mut self, consumer: CandleConsumer, on_candle_close: bool) -> Self {
        self.candle_subscribers.push((consumer, on_candle_close));
        self
    }

    /// Subscribe an external consumer to every pair's order events.
    pub fn subscribe_orders(mut self, consumer: OrderConsumer, only_new: bool) -> Self {
        self.order_subscribers.push((consumer, only_new));
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let instruments = self.settings.instruments()?;
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let order_feed = Arc::new(OrderFeed::new());
        let data_feed = Arc::new(DataFeedManager::new(Arc::clone(&self.feeder)));
        let controller = Arc::new(Controller::new(
            Arc::clone(&self.exchange),
            storage,
            Arc::clone(&order_feed),
            instruments.clone(),
        ));

        let timeframe = self.strategy.timeframe();
        for pair in &self.settings.pairs {
            for (consumer, on_close) in &self.candle_subscribers {
                data_feed.subscribe(&pair.symbol, timeframe, Arc::clone(consumer), *on_close);
            }
            for (consumer, only_new) in &self.order_subscribers {
                order_feed.subscribe(&pair.symbol, Arc::clone(consumer), *only_new);
            }
        }

        if let Some(notifier) = &self.notifier {
            controller.set_notifier(Arc::clone(notifier));
            for pair in &self.settings.pairs {
                let notifier = Arc::clone(notifier);
                order_feed.subscribe(
                    &pair.symbol,
                    Arc::new(move |order| notifier.on_order(&order)),
                    false,
                );
            }
        }

        let (shutdown, _) = watch::channel(false);
        Ok(Engine {
            settings: self.settings,
            feeder: self.feeder,
            strategy: self.strategy,
            partial_strategy: self.partial_strategy,
            paper_wallet: self.paper_wallet,
            backtest: self.backtest,
            controller,
            order_feed,
            data_feed,
            queue: EventQueue::new(),
            shutdown,
        })
    }
}

/// The assembled trading engine.
pub struct Engine {
    settings: Settings,
    feeder: Arc<dyn Feeder>,
    strategy: Arc<dyn Strategy>,
    partial_strategy: Option<Arc<dyn HighFrequencyStrategy>>,
    paper_wallet: Option<Arc<PaperWallet>>,
    backtest: bool,
    controller: Arc<Controller>,
    order_feed: Arc<OrderFeed>,
    data_feed: Arc<DataFeedManager>,
    queue: EventQueue<CandleEvent>,
    shutdown: watch::Sender<bool>,
}

impl Engine {
    /// Start assembling an engine from a venue and a strategy.
    pub fn builder<E: Exchange + 'static>(
        settings: Settings,
        exchange: Arc<E>,
        strategy: Arc<dyn Strategy>,
    ) -> EngineBuilder {
        let feeder: Arc<dyn Feeder> = exchange.clone();
        let exchange: Arc<dyn Exchange> = exchange;
        EngineBuilder {
            settings,
            exchange,
            feeder,
            strategy,
            partial_strategy: None,
            storage: None,
            notifier: None,
            paper_wallet: None,
            candle_subscribers: Vec::new(),
            order_subscribers: Vec::new(),
            backtest: false,
        }
    }

    /// The order controller, for direct account and order access.
    pub fn controller(&self) -> Arc<Controller> {
        Arc::clone(&self.controller)
    }

    /// The simulated venue, when one is attached.
    pub fn wallet(&self) -> Option<Arc<PaperWallet>> {
        self.paper_wallet.clone()
    }

    /// Run the engine until its data is exhausted (backtest) or it is
    /// shut down (live).
    pub async fn run(&self) -> Result<(), EngineError> {
        let timeframe = self.strategy.timeframe();
        let mut strategies: HashMap<String, Arc<StrategyController>> = HashMap::new();

        for pair in &self.settings.pairs {
            let broker: Arc<dyn Broker> = self.controller.clone();
            let strategy_controller = Arc::new(StrategyController::new(
                &pair.symbol,
                Arc::clone(&self.strategy),
                self.partial_strategy.clone(),
                broker,
            ));
            strategies.insert(pair.symbol.clone(), Arc::clone(&strategy_controller));

            if !self.backtest {
                // warm the strategy up on recent history before going live
                let candles = self
                    .feeder
                    .candles_by_limit(&pair.symbol, timeframe, self.strategy.warmup_period())
                    .await?;
                for candle in &candles {
                    self.route_candle(&strategies, candle).await;
                }
                self.data_feed.preload(&pair.symbol, timeframe, &candles);
            }

            let queue = self.queue.clone();
            self.data_feed.subscribe(
                &pair.symbol,
                timeframe,
                Arc::new(move |candle| queue.push(CandleEvent(candle))),
                false,
            );
            strategy_controller.start();
        }

        self.order_feed.start();
        Arc::clone(&self.controller).start();

        if self.backtest {
            // all history lands in the queue before the drain starts
            self.data_feed.start(true).await;
            tracing::info!(candles = self.queue.len(), "[SETUP] starting backtest");
            while let Some(CandleEvent(candle)) = self.queue.pop() {
                self.route_candle(&strategies, &candle).await;
            }
        } else {
            self.data_feed.start(false).await;
            let mut stream = self.queue.stream(QUEUE_STREAM_CAPACITY);
            let mut shutdown = self.shutdown.subscribe();
            loop {
                tokio::select! {
                    maybe = stream.recv() => match maybe {
                        Some(CandleEvent(candle)) => {
                            self.route_candle(&strategies, &candle).await;
                        }
                        None => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
        }

        self.controller.stop().await;
        Ok(())
    }

    /// Tear down the dispatch loops, the reconciliation task (after one
    /// final pass) and the order feed.
    pub async fn shutdown(&self) {
        self.data_feed.stop();
        let _ = self.shutdown.send(true);
        self.controller.stop().await;
        self.order_feed.stop();
    }

    /// One candle through the whole pipeline: venue first, then the
    /// strategy's partial path, then — on completed bars — the strategy
    /// and (live only) the order controller's last-price tracking.
    async fn route_candle(
        &self,
        strategies: &HashMap<String, Arc<StrategyController>>,
        candle: &Candle,
    ) {
        if let Some(wallet) = &self.paper_wallet {
            wallet.on_candle(candle);
        }
        let Some(strategy_controller) = strategies.get(&candle.pair) else {
            return;
        };
        strategy_controller.on_partial_candle(candle).await;
        if candle.complete {
            strategy_controller.on_candle(candle).await;
            if !self.backtest {
                self.controller.on_candle(candle);
            }
        }
    }

    /// Human-readable report: per-pair summaries, totals, and the wallet
    /// summary when a simulated venue is attached.
    pub fn summary(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let mut total_profit = 0.0;
        let mut total_volume = 0.0;
        let mut wins = 0;
        let mut losses = 0;
        for summary in self.controller.summaries() {
            total_profit += summary.profit();
            total_volume += summary.volume;
            wins += summary.win().len();
            losses += summary.lose().len();
            let _ = writeln!(out, "{summary}\n");
        }
        let _ = writeln!(
            out,
            "TOTAL: trades={} win={} loss={} profit={:.4} volume={:.2}",
            wins + losses,
            wins,
            losses,
            total_profit,
            total_volume
        );
        if let Some(wallet) = &self.paper_wallet {
            let _ = write!(out, "{}", wallet.summary());
        }
        out
    }
}
