//! Feed subscription manager — fans candles out to consumers.
//!
//! Tracks (pair, timeframe) interest, opens one upstream subscription
//! per distinct key, and runs one dispatch loop per key. Transport
//! errors are logged and never terminate a loop; a shared shutdown
//! signal tears all loops down.

use crate::domain::Candle;
use crate::feed::Timeframe;
use crate::service::Feeder;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Callback receiving candles for one subscription.
pub type CandleConsumer = Arc<dyn Fn(Candle) + Send + Sync>;

struct Subscription {
    on_candle_close: bool,
    consumer: CandleConsumer,
}

type FeedKey = (String, Timeframe);

/// Per-(pair, timeframe) candle fan-out over a `Feeder`.
pub struct DataFeedManager {
    feeder: Arc<dyn Feeder>,
    subscriptions: Mutex<HashMap<FeedKey, Vec<Subscription>>>,
    connected: Mutex<Vec<(FeedKey, ConnectedFeed)>>,
    shutdown: watch::Sender<bool>,
}

struct ConnectedFeed {
    candles: tokio::sync::mpsc::Receiver<Candle>,
    errors: tokio::sync::mpsc::Receiver<crate::service::FeedError>,
}

impl DataFeedManager {
    pub fn new(feeder: Arc<dyn Feeder>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            feeder,
            subscriptions: Mutex::new(HashMap::new()),
            connected: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    /// Register interest in a (pair, timeframe) stream. With
    /// `on_candle_close` set the consumer sees only completed bars.
    pub fn subscribe(
        &self,
        pair: &str,
        timeframe: Timeframe,
        consumer: CandleConsumer,
        on_candle_close: bool,
    ) {
        self.subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .entry((pair.to_string(), timeframe))
            .or_default()
            .push(Subscription { on_candle_close, consumer });
    }

    /// Synchronously replay a historical slice through matching
    /// consumers, skipping incomplete bars. Used to warm up strategy
    /// state before live processing begins.
    pub fn preload(&self, pair: &str, timeframe: Timeframe, candles: &[Candle]) {
        tracing::info!(
            pair,
            %timeframe,
            count = candles.len(),
            "preloading candles"
        );
        let subscriptions = self.subscriptions.lock().expect("subscription lock poisoned");
        let Some(subs) = subscriptions.get(&(pair.to_string(), timeframe)) else {
            return;
        };
        for candle in candles {
            if !candle.complete {
                continue;
            }
            for sub in subs {
                (sub.consumer)(candle.clone());
            }
        }
    }

    /// Open one upstream subscription per distinct (pair, timeframe).
    pub async fn connect(&self) {
        tracing::info!("connecting to the exchange");
        let keys: Vec<FeedKey> = {
            let subscriptions = self.subscriptions.lock().expect("subscription lock poisoned");
            subscriptions.keys().cloned().collect()
        };
        let mut connected = Vec::new();
        for (pair, timeframe) in keys {
            let (candles, errors) = self.feeder.candles_subscription(&pair, timeframe).await;
            connected.push(((pair, timeframe), ConnectedFeed { candles, errors }));
        }
        *self.connected.lock().expect("feed lock poisoned") = connected;
    }

    /// Spawn one dispatch loop per connected feed.
    ///
    /// `wait_for_load = true` blocks until every loop has drained its
    /// stream to exhaustion (backtest: historical subscriptions close
    /// when replayed); `false` returns immediately (live).
    pub async fn start(&self, wait_for_load: bool) {
        self.connect().await;

        let feeds = std::mem::take(&mut *self.connected.lock().expect("feed lock poisoned"));
        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        for ((pair, timeframe), mut feed) in feeds {
            let subs: Vec<(bool, CandleConsumer)> = {
                let subscriptions =
                    self.subscriptions.lock().expect("subscription lock poisoned");
                subscriptions
                    .get(&(pair.clone(), timeframe))
                    .map(|subs| {
                        subs.iter()
                            .map(|s| (s.on_candle_close, Arc::clone(&s.consumer)))
                            .collect()
                    })
                    .unwrap_or_default()
            };
            let mut shutdown = self.shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                let mut errors_open = true;
                loop {
                    tokio::select! {
                        maybe = feed.candles.recv() => match maybe {
                            Some(candle) => {
                                for (on_close, consumer) in &subs {
                                    if *on_close && !candle.complete {
                                        continue;
                                    }
                                    consumer(candle.clone());
                                }
                            }
                            None => break,
                        },
                        maybe = feed.errors.recv(), if errors_open => match maybe {
                            Some(err) => {
                                tracing::error!(%pair, %timeframe, "data feed error: {err}");
                            }
                            None => errors_open = false,
                        },
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        tracing::info!("data feed connected");
        if wait_for_load {
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    /// Tear down every dispatch loop.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AssetInfo;
    use crate::service::{FeedError, Feeder};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn candle(secs: i64, complete: bool) -> Candle {
        Candle {
            pair: "BTCUSDT".into(),
            time: Utc.timestamp_opt(secs, 0).unwrap(),
            updated_at: Utc.timestamp_opt(secs, 0).unwrap(),
            open: 100.0,
            close: 101.0,
            low: 99.0,
            high: 102.0,
            volume: 1.0,
            complete,
            metadata: Default::default(),
        }
    }

    /// Feeder replaying a fixed script of candles and errors.
    struct ScriptedFeeder {
        candles: Vec<Candle>,
        errors: Vec<FeedError>,
    }

    #[async_trait]
    impl Feeder for ScriptedFeeder {
        fn asset_info(&self, _pair: &str) -> AssetInfo {
            AssetInfo::unconstrained("BTC", "USDT")
        }

        async fn last_quote(&self, _pair: &str) -> Result<f64, FeedError> {
            Err(FeedError::InvalidOperation)
        }

        async fn candles_by_period(
            &self,
            _pair: &str,
            _timeframe: Timeframe,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Candle>, FeedError> {
            Ok(self.candles.clone())
        }

        async fn candles_by_limit(
            &self,
            _pair: &str,
            _timeframe: Timeframe,
            limit: usize,
        ) -> Result<Vec<Candle>, FeedError> {
            Ok(self.candles.iter().take(limit).cloned().collect())
        }

        async fn candles_subscription(
            &self,
            _pair: &str,
            _timeframe: Timeframe,
        ) -> (mpsc::Receiver<Candle>, mpsc::Receiver<FeedError>) {
            let (candle_tx, candle_rx) = mpsc::channel(16);
            let (err_tx, err_rx) = mpsc::channel(16);
            for err in &self.errors {
                let _ = err_tx.try_send(FeedError::Transport(err.to_string()));
            }
            for candle in &self.candles {
                let _ = candle_tx.try_send(candle.clone());
            }
            (candle_rx, err_rx)
        }
    }

    #[tokio::test]
    async fn delivers_candles_to_subscribers() {
        let feeder = Arc::new(ScriptedFeeder {
            candles: vec![candle(0, true), candle(60, true)],
            errors: vec![],
        });
        let manager = DataFeedManager::new(feeder);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        manager.subscribe(
            "BTCUSDT",
            Timeframe::M1,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            false,
        );
        manager.start(true).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn completed_only_subscribers_skip_partial_bars() {
        let feeder = Arc::new(ScriptedFeeder {
            candles: vec![candle(0, false), candle(0, true), candle(60, false)],
            errors: vec![],
        });
        let manager = DataFeedManager::new(feeder);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        manager.subscribe(
            "BTCUSDT",
            Timeframe::M1,
            Arc::new(move |c: Candle| {
                assert!(c.complete);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            true,
        );
        manager.start(true).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_errors_do_not_terminate_the_loop() {
        let feeder = Arc::new(ScriptedFeeder {
            candles: vec![candle(0, true)],
            errors: vec![FeedError::Transport("socket reset".into())],
        });
        let manager = DataFeedManager::new(feeder);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        manager.subscribe(
            "BTCUSDT",
            Timeframe::M1,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            false,
        );
        manager.start(true).await;
        // the candle still arrived despite the transport error
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preload_replays_only_complete_bars() {
        let feeder = Arc::new(ScriptedFeeder { candles: vec![], errors: vec![] });
        let manager = DataFeedManager::new(feeder);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        manager.subscribe(
            "BTCUSDT",
            Timeframe::M1,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            false,
        );
        manager.preload(
            "BTCUSDT",
            Timeframe::M1,
            &[candle(0, true), candle(60, false), candle(120, true)],
        );
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
