//! Historical bar feed: CSV loading and timeframe resampling.
//!
//! Files carry a header row naming at least
//! `time, open, close, low, high, volume` (any order; extra columns are
//! kept as per-bar metadata). A headerless file — first token numeric —
//! falls back to that well-known column order. Bars are complete at the
//! source granularity and are resampled up to the requested target
//! timeframe at load time.

use crate::domain::{AssetInfo, Candle, HeikinAshi, InstrumentMap};
use crate::feed::Timeframe;
use crate::service::{FeedError, Feeder};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::mpsc;

const KNOWN_COLUMNS: [&str; 6] = ["time", "open", "close", "low", "high", "volume"];

/// One pair's source file and granularity.
#[derive(Debug, Clone)]
pub struct PairFeed {
    pub pair: String,
    pub file: PathBuf,
    pub timeframe: Timeframe,
    pub heikin_ashi: bool,
}

/// In-memory historical feed exposing the same contract as a live venue.
pub struct CsvFeed {
    instruments: InstrumentMap,
    series: Mutex<HashMap<(String, Timeframe), Vec<Candle>>>,
}

impl CsvFeed {
    /// Load every feed's file and resample it to `target`.
    pub fn new(
        target: Timeframe,
        instruments: InstrumentMap,
        feeds: Vec<PairFeed>,
    ) -> Result<Self, FeedError> {
        let mut series = HashMap::new();
        for feed in feeds {
            let candles = load_file(&feed)?;
            let resampled = resample(&candles, feed.timeframe, target);
            series.insert((feed.pair.clone(), feed.timeframe), candles);
            series.insert((feed.pair, target), resampled);
        }
        Ok(Self {
            instruments,
            series: Mutex::new(series),
        })
    }

    /// Trim every series to the trailing `window` before its last bar.
    pub fn limit(self, window: Duration) -> Self {
        {
            let mut series = self.series.lock().expect("feed lock poisoned");
            for candles in series.values_mut() {
                if let Some(last) = candles.last() {
                    let start = last.time - window;
                    candles.retain(|c| c.time > start);
                }
            }
        }
        self
    }

    fn with_series<R>(
        &self,
        pair: &str,
        timeframe: Timeframe,
        f: impl FnOnce(&mut Vec<Candle>) -> R,
    ) -> Option<R> {
        let mut series = self.series.lock().expect("feed lock poisoned");
        series.get_mut(&(pair.to_string(), timeframe)).map(f)
    }
}

#[async_trait]
impl Feeder for CsvFeed {
    fn asset_info(&self, pair: &str) -> AssetInfo {
        let (base, quote) = self.instruments.split(pair).unwrap_or(("", ""));
        AssetInfo::unconstrained(base, quote)
    }

    async fn last_quote(&self, _pair: &str) -> Result<f64, FeedError> {
        Err(FeedError::InvalidOperation)
    }

    async fn candles_by_period(
        &self,
        pair: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, FeedError> {
        Ok(self
            .with_series(pair, timeframe, |candles| {
                candles
                    .iter()
                    .filter(|c| c.time >= start && c.time <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Destructive: hands out the first `limit` bars and keeps the rest,
    /// so a later subscription replays only what was not consumed.
    async fn candles_by_limit(
        &self,
        pair: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, FeedError> {
        self.with_series(pair, timeframe, |candles| {
            if candles.len() < limit {
                return Err(FeedError::InsufficientData { pair: pair.to_string() });
            }
            let rest = candles.split_off(limit);
            Ok(std::mem::replace(candles, rest))
        })
        .unwrap_or_else(|| Err(FeedError::InsufficientData { pair: pair.to_string() }))
    }

    /// One-shot: replays the precomputed series, then closes.
    async fn candles_subscription(
        &self,
        pair: &str,
        timeframe: Timeframe,
    ) -> (mpsc::Receiver<Candle>, mpsc::Receiver<FeedError>) {
        let (candle_tx, candle_rx) = mpsc::channel(128);
        let (_err_tx, err_rx) = mpsc::channel::<FeedError>(1);
        let candles = self
            .with_series(pair, timeframe, |candles| candles.clone())
            .unwrap_or_default();
        tokio::spawn(async move {
            for candle in candles {
                if candle_tx.send(candle).await.is_err() {
                    break;
                }
            }
            // channels close when the senders drop
        });
        (candle_rx, err_rx)
    }
}

// ── Loading ────────────────────────────────────────────────────────────

/// Column indices resolved from a header row, plus any extra columns
/// carried through as metadata. Headerless files use positional order.
fn parse_headers(first: &csv::StringRecord) -> (HashMap<String, usize>, Vec<String>, bool) {
    let mut index: HashMap<String, usize> = KNOWN_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), i))
        .collect();

    let first_token = first.get(0).unwrap_or_default().trim();
    if first_token.parse::<i64>().is_ok() {
        return (index, Vec::new(), false);
    }

    let mut additional = Vec::new();
    for (i, name) in first.iter().enumerate() {
        let name = name.trim();
        if !KNOWN_COLUMNS.contains(&name) {
            additional.push(name.to_string());
        }
        index.insert(name.to_string(), i);
    }
    (index, additional, true)
}

fn load_file(feed: &PairFeed) -> Result<Vec<Candle>, FeedError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(&feed.file)?;

    let mut records = reader.records();
    let first = match records.next() {
        Some(record) => record?,
        None => return Ok(Vec::new()),
    };
    let (index, additional, has_headers) = parse_headers(&first);

    let mut candles = Vec::new();
    let mut heikin_ashi = HeikinAshi::new();
    let data_records = if has_headers { None } else { Some(first) };
    for record in data_records.into_iter().map(Ok).chain(records) {
        let record = record?;
        let mut candle = parse_record(&record, &index, &additional, &feed.pair)?;
        if feed.heikin_ashi {
            candle = heikin_ashi.apply(&candle);
        }
        candles.push(candle);
    }
    Ok(candles)
}

fn parse_record(
    record: &csv::StringRecord,
    index: &HashMap<String, usize>,
    additional: &[String],
    pair: &str,
) -> Result<Candle, FeedError> {
    let field = |name: &str| -> Result<&str, FeedError> {
        index
            .get(name)
            .and_then(|&i| record.get(i))
            .ok_or_else(|| FeedError::Malformed(format!("missing column {name}")))
    };
    let float = |name: &str| -> Result<f64, FeedError> {
        let raw = field(name)?;
        raw.parse()
            .map_err(|_| FeedError::Malformed(format!("bad {name}: {raw:?}")))
    };

    let raw_time = field("time")?;
    let timestamp: i64 = raw_time
        .parse()
        .map_err(|_| FeedError::Malformed(format!("bad time: {raw_time:?}")))?;
    let time = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| FeedError::Malformed(format!("bad unix time: {timestamp}")))?;

    let mut metadata = HashMap::new();
    for name in additional {
        metadata.insert(name.clone(), float(name)?);
    }

    Ok(Candle {
        pair: pair.to_string(),
        time,
        updated_at: time,
        open: float("open")?,
        close: float("close")?,
        low: float("low")?,
        high: float("high")?,
        volume: float("volume")?,
        complete: true,
        metadata,
    })
}

// ── Resampling ─────────────────────────────────────────────────────────

/// Aggregate source bars into the coarser `target` timeframe.
///
/// Skips forward to the first source bar aligned on a target boundary,
/// merges each period's bars (first open, running high/low envelope,
/// summed volume, last close), and drops a trailing incomplete period.
pub fn resample(candles: &[Candle], source: Timeframe, target: Timeframe) -> Vec<Candle> {
    let start = candles
        .iter()
        .position(|c| target.starts_period(c.time))
        .unwrap_or(candles.len());

    let mut out = Vec::new();
    let mut open_bar: Option<Candle> = None;
    for candle in &candles[start..] {
        match open_bar.as_mut() {
            None => {
                let mut bar = candle.clone();
                bar.complete = false;
                open_bar = Some(bar);
            }
            Some(bar) => {
                bar.high = bar.high.max(candle.high);
                bar.low = bar.low.min(candle.low);
                bar.close = candle.close;
                bar.volume += candle.volume;
                bar.updated_at = candle.time;
            }
        }
        if target.closes_with(candle.time, source) {
            let mut bar = open_bar.take().expect("open bar present");
            bar.complete = true;
            out.push(bar);
        }
    }
    // whatever is still open never saw its period close: dropped
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn candle(time: DateTime<Utc>, open: f64, close: f64, low: f64, high: f64, volume: f64) -> Candle {
        Candle {
            pair: "BTCUSDT".into(),
            time,
            updated_at: time,
            open,
            close,
            low,
            high,
            volume,
            complete: true,
            metadata: HashMap::new(),
        }
    }

    fn hourly(hours: &[(u32, f64)]) -> Vec<Candle> {
        hours
            .iter()
            .map(|&(h, close)| {
                candle(
                    Utc.with_ymd_and_hms(2024, 3, 15, h, 0, 0).unwrap(),
                    close - 1.0,
                    close,
                    close - 2.0,
                    close + 2.0,
                    10.0,
                )
            })
            .collect()
    }

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn feed_for(file: &tempfile::NamedTempFile, timeframe: Timeframe) -> PairFeed {
        PairFeed {
            pair: "BTCUSDT".into(),
            file: file.path().to_path_buf(),
            timeframe,
            heikin_ashi: false,
        }
    }

    fn instruments() -> InstrumentMap {
        let mut pairs = HashMap::new();
        pairs.insert(
            "BTCUSDT".to_string(),
            crate::domain::PairInfo { base: "BTC".into(), quote: "USDT".into() },
        );
        InstrumentMap::new(pairs)
    }

    // ── Header handling ────────────────────────────────────────────────

    #[test]
    fn loads_named_columns_in_any_order() {
        let file = write_csv("close,time,open,low,high,volume\n103,3600,100,98,105,7\n");
        let feed = CsvFeed::new(Timeframe::H1, instruments(), vec![feed_for(&file, Timeframe::H1)])
            .unwrap();
        let candles = feed
            .with_series("BTCUSDT", Timeframe::H1, |c| c.clone())
            .unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 103.0);
        assert_eq!(candles[0].open, 100.0);
        assert_eq!(candles[0].volume, 7.0);
        assert!(candles[0].complete);
    }

    #[test]
    fn extra_columns_become_metadata() {
        let file = write_csv("time,open,close,low,high,volume,rsi\n3600,100,103,98,105,7,55.5\n");
        let feed = CsvFeed::new(Timeframe::H1, instruments(), vec![feed_for(&file, Timeframe::H1)])
            .unwrap();
        let candles = feed
            .with_series("BTCUSDT", Timeframe::H1, |c| c.clone())
            .unwrap();
        assert_eq!(candles[0].metadata["rsi"], 55.5);
    }

    #[test]
    fn headerless_file_uses_well_known_order() {
        // time, open, close, low, high, volume
        let file = write_csv("3600,100,103,98,105,7\n7200,103,104,101,106,8\n");
        let feed = CsvFeed::new(Timeframe::H1, instruments(), vec![feed_for(&file, Timeframe::H1)])
            .unwrap();
        let candles = feed
            .with_series("BTCUSDT", Timeframe::H1, |c| c.clone())
            .unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].low, 98.0);
        assert_eq!(candles[1].high, 106.0);
    }

    // ── Resampling ─────────────────────────────────────────────────────

    #[test]
    fn resample_merges_periods() {
        // 8 hourly bars starting at 00:00 → two complete 4h bars
        let bars = hourly(&[(0, 100.0), (1, 101.0), (2, 102.0), (3, 103.0),
                            (4, 104.0), (5, 105.0), (6, 106.0), (7, 107.0)]);
        let out = resample(&bars, Timeframe::H1, Timeframe::H4);
        assert_eq!(out.len(), 2);

        let first = &out[0];
        assert_eq!(first.open, 99.0); // open of the 00:00 bar
        assert_eq!(first.close, 103.0); // close of the 03:00 bar
        assert_eq!(first.high, 105.0); // max high
        assert_eq!(first.low, 98.0); // min low
        assert_eq!(first.volume, 40.0); // summed
        assert!(first.complete);
        assert_eq!(first.time, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn resample_conserves_volume_and_envelope() {
        let bars = hourly(&[(0, 100.0), (1, 90.0), (2, 120.0), (3, 95.0)]);
        let out = resample(&bars, Timeframe::H1, Timeframe::H4);
        assert_eq!(out.len(), 1);
        let total: f64 = bars.iter().map(|b| b.volume).sum();
        assert_eq!(out[0].volume, total);
        let max_high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let min_low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        assert_eq!(out[0].high, max_high);
        assert_eq!(out[0].low, min_low);
    }

    #[test]
    fn resample_drops_trailing_incomplete_period() {
        let bars = hourly(&[(0, 100.0), (1, 101.0), (2, 102.0), (3, 103.0), (4, 104.0), (5, 105.0)]);
        let out = resample(&bars, Timeframe::H1, Timeframe::H4);
        assert_eq!(out.len(), 1); // 04:00–05:00 never closes
    }

    #[test]
    fn resample_skips_unaligned_prefix() {
        // starts at 02:00: the partial 00:00–04:00 period is skipped
        let bars = hourly(&[(2, 102.0), (3, 103.0), (4, 104.0), (5, 105.0), (6, 106.0), (7, 107.0)]);
        let out = resample(&bars, Timeframe::H1, Timeframe::H4);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].time, Utc.with_ymd_and_hms(2024, 3, 15, 4, 0, 0).unwrap());
    }

    #[test]
    fn resample_same_timeframe_passes_through() {
        let bars = hourly(&[(0, 100.0), (1, 101.0)]);
        let out = resample(&bars, Timeframe::H1, Timeframe::H1);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.complete));
    }

    // ── Feeder contract ────────────────────────────────────────────────

    #[tokio::test]
    async fn by_limit_is_destructive_from_the_front() {
        let file = write_csv("3600,100,103,98,105,7\n7200,103,104,101,106,8\n10800,104,105,102,107,9\n");
        let feed = CsvFeed::new(Timeframe::H1, instruments(), vec![feed_for(&file, Timeframe::H1)])
            .unwrap();
        let first = feed
            .candles_by_limit("BTCUSDT", Timeframe::H1, 2)
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].close, 103.0);

        let rest = feed
            .with_series("BTCUSDT", Timeframe::H1, |c| c.clone())
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].close, 105.0);

        let err = feed.candles_by_limit("BTCUSDT", Timeframe::H1, 5).await;
        assert!(matches!(err, Err(FeedError::InsufficientData { .. })));
    }

    #[tokio::test]
    async fn by_period_filters_inclusive_range() {
        let file = write_csv("3600,100,103,98,105,7\n7200,103,104,101,106,8\n10800,104,105,102,107,9\n");
        let feed = CsvFeed::new(Timeframe::H1, instruments(), vec![feed_for(&file, Timeframe::H1)])
            .unwrap();
        let candles = feed
            .candles_by_period(
                "BTCUSDT",
                Timeframe::H1,
                Utc.timestamp_opt(7200, 0).unwrap(),
                Utc.timestamp_opt(10800, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(candles.len(), 2);
    }

    #[tokio::test]
    async fn subscription_replays_then_closes() {
        let file = write_csv("3600,100,103,98,105,7\n7200,103,104,101,106,8\n");
        let feed = CsvFeed::new(Timeframe::H1, instruments(), vec![feed_for(&file, Timeframe::H1)])
            .unwrap();
        let (mut candles, _errors) = feed.candles_subscription("BTCUSDT", Timeframe::H1).await;
        assert_eq!(candles.recv().await.unwrap().close, 103.0);
        assert_eq!(candles.recv().await.unwrap().close, 104.0);
        assert!(candles.recv().await.is_none()); // closed after replay
    }

    #[test]
    fn limit_keeps_trailing_window() {
        let file = write_csv("3600,100,103,98,105,7\n7200,103,104,101,106,8\n10800,104,105,102,107,9\n");
        let feed = CsvFeed::new(Timeframe::H1, instruments(), vec![feed_for(&file, Timeframe::H1)])
            .unwrap()
            .limit(Duration::hours(1));
        let candles = feed
            .with_series("BTCUSDT", Timeframe::H1, |c| c.clone())
            .unwrap();
        // only bars strictly inside the trailing hour before the last bar
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 105.0);
    }

    #[tokio::test]
    async fn last_quote_is_invalid_for_historical_feed() {
        let file = write_csv("3600,100,103,98,105,7\n");
        let feed = CsvFeed::new(Timeframe::H1, instruments(), vec![feed_for(&file, Timeframe::H1)])
            .unwrap();
        let err = feed.last_quote("BTCUSDT").await;
        assert!(matches!(err, Err(FeedError::InvalidOperation)));
    }
}
