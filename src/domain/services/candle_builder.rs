use crate::domain::entities::candle::{Candle, ClosedCandle, Interval};
use crate::domain::entities::quote::QuoteSnapshot;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Timing knobs for the quiet-market close timer
#[derive(Debug, Clone, Copy)]
pub struct CandleBuilderConfig {
    /// Quotes are "live" if one arrived within this window
    pub freshness_ms: i64,
    /// Delay after a bucket's end before the timer closes it
    pub grace_ms: i64,
}

impl Default for CandleBuilderConfig {
    fn default() -> Self {
        Self {
            freshness_ms: 15_000,
            grace_ms: 2_000,
        }
    }
}

/// The bucket currently being filled for one instrument
#[derive(Debug, Clone, PartialEq)]
pub struct OpenBucket {
    pub bucket_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_count: u32,
}

impl OpenBucket {
    fn seeded(bucket_start: i64, price: f64, tick_count: u32) -> Self {
        Self {
            bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
            tick_count,
        }
    }

    fn update(&mut self, price: f64) {
        // a heartbeat bucket has no trades yet, so the first real one reseeds it
        if self.tick_count == 0 {
            *self = Self::seeded(self.bucket_start, price, 1);
            return;
        }
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.tick_count += 1;
    }

    fn close_out(&self, symbol: &str, forced: bool) -> ClosedCandle {
        ClosedCandle {
            candle: Candle::new(
                symbol,
                self.bucket_start,
                self.open,
                self.high,
                self.low,
                self.close,
            ),
            tick_count: self.tick_count,
            forced,
        }
    }
}

/// Builds fixed 15-second candles from the normalized quote stream
pub struct CandleBuilder {
    interval: Interval,
    config: CandleBuilderConfig,
    /// Open bucket per symbol
    buckets: HashMap<String, OpenBucket>,
    /// Start of the newest closed bucket per symbol
    last_closed: HashMap<String, i64>,
    /// Wall-clock time of the last accepted quote per symbol
    last_quote_ms: HashMap<String, i64>,
}

impl CandleBuilder {
    pub fn new(config: CandleBuilderConfig) -> Self {
        Self {
            interval: Interval::FifteenSeconds,
            config,
            buckets: HashMap::new(),
            last_closed: HashMap::new(),
            last_quote_ms: HashMap::new(),
        }
    }

    /// Fold a snapshot into its bucket
    ///
    /// Returns the previous bucket when this snapshot belongs to a later one.
    pub fn ingest(&mut self, snapshot: &QuoteSnapshot, now_ms: i64) -> Option<ClosedCandle> {
        let price = snapshot.trade_price()?.value();
        let symbol = snapshot.instrument_id.as_str();
        let bucket_start = self
            .interval
            .align(snapshot.observed_at_ms.div_euclid(1000));

        if let Some(&closed) = self.last_closed.get(symbol) {
            if bucket_start <= closed {
                trace!(
                    "Dropping late quote for {} in closed bucket {}",
                    symbol,
                    bucket_start
                );
                return None;
            }
        }

        self.last_quote_ms.insert(symbol.to_string(), now_ms);

        let Some(bucket) = self.buckets.get_mut(symbol) else {
            self.buckets.insert(
                symbol.to_string(),
                OpenBucket::seeded(bucket_start, price, 1),
            );
            return None;
        };

        if bucket_start == bucket.bucket_start {
            bucket.update(price);
            return None;
        }
        if bucket_start < bucket.bucket_start {
            return None;
        }

        let closed = bucket.close_out(symbol, false);
        *bucket = OpenBucket::seeded(bucket_start, price, 1);
        self.last_closed
            .insert(symbol.to_string(), closed.candle.interval_start);
        Some(closed)
    }

    /// Close every bucket whose interval (plus grace) has elapsed while its quotes are live
    ///
    /// Each forced close opens a flat heartbeat bucket for the next interval so
    /// a quiet but open market keeps producing candles.
    pub fn force_close_if_due(&mut self, now_ms: i64) -> Vec<ClosedCandle> {
        let mut closed = Vec::new();
        let step = self.interval.seconds();

        for (symbol, bucket) in self.buckets.iter_mut() {
            let live = self
                .last_quote_ms
                .get(symbol)
                .map(|&at| now_ms - at <= self.config.freshness_ms)
                .unwrap_or(false);
            if !live {
                continue;
            }

            let due_at_ms = (bucket.bucket_start + step) * 1000 + self.config.grace_ms;
            if now_ms < due_at_ms {
                continue;
            }

            debug!(
                "Force-closing {} bucket {} after {} ticks",
                symbol, bucket.bucket_start, bucket.tick_count
            );
            let candle = bucket.close_out(symbol, true);
            self.last_closed
                .insert(symbol.clone(), candle.candle.interval_start);
            *bucket = OpenBucket::seeded(bucket.bucket_start + step, candle.candle.close, 0);
            closed.push(candle);
        }

        closed
    }

    /// The bucket currently open for a symbol
    pub fn open_bucket(&self, symbol: &str) -> Option<&OpenBucket> {
        self.buckets.get(symbol)
    }
}

impl Default for CandleBuilder {
    fn default() -> Self {
        Self::new(CandleBuilderConfig::default())
    }
}
