//! End-to-end backtests: CSV feed → queue → strategy → paper wallet →
//! controller accounting.

use async_trait::async_trait;
use marlin_core::config::{PairConfig, Settings};
use marlin_core::domain::{Dataframe, Order, Side};
use marlin_core::engine::Engine;
use marlin_core::exchange::PaperWallet;
use marlin_core::feed::{CsvFeed, PairFeed, Timeframe};
use marlin_core::service::{Broker, Notifier};
use marlin_core::strategy::Strategy;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn write_csv(dir: &tempfile::TempDir, name: &str, rows: &[(i64, f64, f64, f64, f64)]) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "time,open,close,low,high,volume").unwrap();
    for (time, open, close, low, high) in rows {
        writeln!(file, "{time},{open},{close},{low},{high},10").unwrap();
    }
    path
}

fn settings(pairs: &[(&str, &str, &str)]) -> Settings {
    Settings {
        pairs: pairs
            .iter()
            .map(|(symbol, base, quote)| PairConfig::new(symbol, base, quote))
            .collect(),
    }
}

/// Buys once on the first decision bar, then exits when the close drops
/// below the highest close seen since entry.
struct TrailingExit {
    state: Mutex<TrailState>,
}

#[derive(Default)]
struct TrailState {
    bought: bool,
    high_watermark: f64,
}

enum Action {
    Buy,
    Sell,
    Hold,
}

impl TrailingExit {
    fn new() -> Self {
        Self { state: Mutex::new(TrailState::default()) }
    }
}

#[async_trait]
impl Strategy for TrailingExit {
    fn timeframe(&self) -> Timeframe {
        Timeframe::H1
    }

    fn warmup_period(&self) -> usize {
        1
    }

    fn indicators(&self, _df: &mut Dataframe) {}

    async fn on_candle(&self, df: &Dataframe, broker: &dyn Broker) {
        let Some(close) = df.close_from_end(0) else {
            return;
        };
        let action = {
            let mut state = self.state.lock().unwrap();
            if !state.bought {
                state.bought = true;
                state.high_watermark = close;
                Action::Buy
            } else if close > state.high_watermark {
                state.high_watermark = close;
                Action::Hold
            } else if close < state.high_watermark {
                Action::Sell
            } else {
                Action::Hold
            }
        };

        match action {
            Action::Buy => {
                broker
                    .create_order_market(Side::Buy, &df.pair, 1.0)
                    .await
                    .unwrap();
            }
            Action::Sell => {
                let (asset, _) = broker.position(&df.pair).await.unwrap();
                if asset > 0.0 {
                    broker
                        .create_order_market(Side::Sell, &df.pair, asset)
                        .await
                        .unwrap();
                }
            }
            Action::Hold => {}
        }
    }
}

/// Notifier double counting order callbacks and profit notifications.
#[derive(Default)]
struct RecordingNotifier {
    orders: AtomicUsize,
    errors: AtomicUsize,
    messages: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
    fn on_order(&self, _order: &Order) {
        self.orders.fetch_add(1, Ordering::SeqCst);
    }
    fn on_error(&self, _error: &dyn std::error::Error) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn backtest_profit_matches_emitted_results() {
    let dir = tempfile::tempdir().unwrap();
    // closes 100, 105, 95: buy on bar 1, trail up on bar 2, exit on bar 3
    let btc = write_csv(
        &dir,
        "btc.csv",
        &[
            (3600, 100.0, 100.0, 99.0, 101.0),
            (7200, 100.0, 105.0, 100.0, 106.0),
            (10800, 105.0, 95.0, 94.0, 105.0),
        ],
    );

    let settings = settings(&[("BTCUSDT", "BTC", "USDT")]);
    let instruments = settings.instruments().unwrap();
    let feed = Arc::new(
        CsvFeed::new(
            Timeframe::H1,
            instruments.clone(),
            vec![PairFeed {
                pair: "BTCUSDT".into(),
                file: btc,
                timeframe: Timeframe::H1,
                heikin_ashi: false,
            }],
        )
        .unwrap(),
    );
    let wallet = Arc::new(
        PaperWallet::builder("USDT", feed, instruments)
            .asset("USDT", 1_000.0)
            .build(),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let order_events = Arc::new(AtomicUsize::new(0));
    let order_counter = Arc::clone(&order_events);

    let engine = Engine::builder(settings, Arc::clone(&wallet), Arc::new(TrailingExit::new()))
        .backtest(Arc::clone(&wallet))
        .notifier(notifier.clone())
        .subscribe_orders(
            Arc::new(move |_| {
                order_counter.fetch_add(1, Ordering::SeqCst);
            }),
            false,
        )
        .build()
        .unwrap();

    engine.run().await.unwrap();

    // one round trip: buy 1 @ 100, sell 1 @ 95
    let controller = engine.controller();
    let summary = controller.summary("BTCUSDT").unwrap();
    assert_eq!(summary.trades(), 1);
    assert!((summary.profit() - (-5.0)).abs() < 1e-9);
    assert!((summary.volume - 195.0).abs() < 1e-9);
    assert_eq!(summary.win_rate(), 0.0);
    assert!(controller.open_position("BTCUSDT").is_none());

    // wallet balances reconcile with the same fills
    let (asset, quote) = Broker::position(wallet.as_ref(), "BTCUSDT").await.unwrap();
    assert_eq!(asset, 0.0);
    assert!((quote - 995.0).abs() < 1e-9);

    // equity recorded once per completed candle
    assert_eq!(wallet.equity_values().len(), 3);
    let wallet_summary = wallet.summary();
    assert!((wallet_summary.gross_profit - (-5.0)).abs() < 1e-9);

    // the realized result was notified exactly once
    let messages = notifier.messages.lock().unwrap();
    let profits: Vec<_> = messages.iter().filter(|m| m.contains("[PROFIT]")).collect();
    assert_eq!(profits.len(), 1);
    drop(messages);

    // both order creations reached the feed subscribers
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(order_events.load(Ordering::SeqCst), 2);
    assert_eq!(notifier.orders.load(Ordering::SeqCst), 2);
    assert_eq!(notifier.errors.load(Ordering::SeqCst), 0);
}

/// Records the order strategy decisions ran in across pairs.
struct RecorderStrategy {
    seen: Mutex<Vec<(String, i64)>>,
}

#[async_trait]
impl Strategy for RecorderStrategy {
    fn timeframe(&self) -> Timeframe {
        Timeframe::H1
    }
    fn warmup_period(&self) -> usize {
        1
    }
    fn indicators(&self, _df: &mut Dataframe) {}
    async fn on_candle(&self, df: &Dataframe, _broker: &dyn Broker) {
        let time = df.time.last().unwrap().timestamp();
        self.seen.lock().unwrap().push((df.pair.clone(), time));
    }
}

#[tokio::test]
async fn backtest_drains_pairs_in_global_time_order() {
    let dir = tempfile::tempdir().unwrap();
    let btc = write_csv(
        &dir,
        "btc.csv",
        &[
            (3600, 100.0, 100.0, 99.0, 101.0),
            (10800, 100.0, 101.0, 99.0, 102.0),
        ],
    );
    let eth = write_csv(
        &dir,
        "eth.csv",
        &[
            (7200, 10.0, 10.0, 9.0, 11.0),
            (14400, 10.0, 10.5, 9.5, 11.0),
        ],
    );

    let settings = settings(&[("BTCUSDT", "BTC", "USDT"), ("ETHUSDT", "ETH", "USDT")]);
    let instruments = settings.instruments().unwrap();
    let feed = Arc::new(
        CsvFeed::new(
            Timeframe::H1,
            instruments.clone(),
            vec![
                PairFeed {
                    pair: "BTCUSDT".into(),
                    file: btc,
                    timeframe: Timeframe::H1,
                    heikin_ashi: false,
                },
                PairFeed {
                    pair: "ETHUSDT".into(),
                    file: eth,
                    timeframe: Timeframe::H1,
                    heikin_ashi: false,
                },
            ],
        )
        .unwrap(),
    );
    let wallet = Arc::new(
        PaperWallet::builder("USDT", feed, instruments)
            .asset("USDT", 1_000.0)
            .build(),
    );
    let strategy = Arc::new(RecorderStrategy { seen: Mutex::new(Vec::new()) });

    let engine = Engine::builder(settings, Arc::clone(&wallet), strategy.clone())
        .backtest(Arc::clone(&wallet))
        .build()
        .unwrap();
    engine.run().await.unwrap();

    let seen = strategy.seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    let times: Vec<i64> = seen.iter().map(|(_, t)| *t).collect();
    assert_eq!(times, vec![3600, 7200, 10800, 14400]);
    assert_eq!(seen[0].0, "BTCUSDT");
    assert_eq!(seen[1].0, "ETHUSDT");
}
