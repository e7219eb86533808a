//! Derives 3-minute candles from the closed 15-second series.

use std::collections::HashMap;
use tracing::{debug, trace, warn};

use crate::domain::entities::candle::{Candle, Interval};

/// Number of 15-second candles in one 3-minute candle.
pub const CANDLES_PER_BUCKET: u32 = 12;

/// Default largest gap, in 3-minute buckets, that is filled with flat candles.
pub const DEFAULT_MAX_GAP_BUCKETS: i64 = 240;

#[derive(Debug, Clone)]
struct PartialBucket {
    start: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    count: u32,
}

impl PartialBucket {
    fn seeded(start: i64, candle: &Candle) -> Self {
        Self {
            start,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            count: 1,
        }
    }

    fn add(&mut self, candle: &Candle) {
        self.high = self.high.max(candle.high);
        self.low = self.low.min(candle.low);
        self.close = candle.close;
        self.count += 1;
    }
}

#[derive(Debug, Default)]
struct DeriverState {
    last_seen: Option<i64>,
    open: Option<PartialBucket>,
    last_emitted: Option<i64>,
    last_close: Option<f64>,
}

impl DeriverState {
    fn emit(&mut self, symbol: &str, bucket: PartialBucket) -> Candle {
        self.last_emitted = Some(bucket.start);
        self.last_close = Some(bucket.close);
        if bucket.count < CANDLES_PER_BUCKET {
            debug!(
                "Finalizing incomplete 3m bucket {} for {} with {} candles",
                bucket.start, symbol, bucket.count
            );
        }
        Candle::new(
            symbol,
            bucket.start,
            bucket.open,
            bucket.high,
            bucket.low,
            bucket.close,
        )
    }

    /// Flat candles for every bucket strictly between the last emitted one and `next_start`.
    fn fill_gap(&mut self, symbol: &str, next_start: i64, max_gap: i64, out: &mut Vec<Candle>) {
        let (Some(last), Some(close)) = (self.last_emitted, self.last_close) else {
            return;
        };
        let step = Interval::ThreeMinutes.seconds();
        let missing = (next_start - last) / step - 1;
        if missing <= 0 {
            return;
        }
        if missing > max_gap {
            warn!(
                "Discontinuity in 3m series for {}: {} buckets missing after {}, not filling",
                symbol, missing, last
            );
            return;
        }
        for k in 1..=missing {
            out.push(Candle::flat(symbol, last + k * step, close));
        }
        self.last_emitted = Some(last + missing * step);
    }
}

/// Folds closed 15-second candles into 3-minute candles per symbol.
pub struct CandleDeriver {
    max_gap_buckets: i64,
    states: HashMap<String, DeriverState>,
}

impl CandleDeriver {
    pub fn new(max_gap_buckets: i64) -> Self {
        Self {
            max_gap_buckets,
            states: HashMap::new(),
        }
    }

    /// Feed one closed 15-second candle.
    ///
    /// Returns the 3-minute candles closed by it, oldest first: an eagerly
    /// completed bucket, or an incomplete bucket finalized by a jump followed by
    /// flat fillers for any buckets skipped entirely.
    pub fn on_closed_15s(&mut self, candle: &Candle) -> Vec<Candle> {
        let symbol = candle.symbol.as_str();
        let state = self.states.entry(candle.symbol.clone()).or_default();

        if let Some(last_seen) = state.last_seen {
            if candle.interval_start <= last_seen {
                trace!(
                    "Deriver ignoring {} candle at {} (last seen {})",
                    symbol,
                    candle.interval_start,
                    last_seen
                );
                return Vec::new();
            }
        }
        state.last_seen = Some(candle.interval_start);

        let start = Interval::ThreeMinutes.align(candle.interval_start);
        let mut closed = Vec::new();

        match state.open.take() {
            Some(mut bucket) if bucket.start == start => {
                bucket.add(candle);
                state.open = Some(bucket);
            }
            previous => {
                if let Some(bucket) = previous {
                    closed.push(state.emit(symbol, bucket));
                }
                state.fill_gap(symbol, start, self.max_gap_buckets, &mut closed);
                state.open = Some(PartialBucket::seeded(start, candle));
            }
        }

        if let Some(bucket) = state.open.take() {
            if bucket.count >= CANDLES_PER_BUCKET {
                closed.push(state.emit(symbol, bucket));
            } else {
                state.open = Some(bucket);
            }
        }

        closed
    }

    /// Number of 15-second candles folded into the open bucket.
    pub fn pending_count(&self, symbol: &str) -> u32 {
        self.states
            .get(symbol)
            .and_then(|s| s.open.as_ref())
            .map(|b| b.count)
            .unwrap_or(0)
    }
}

impl Default for CandleDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_GAP_BUCKETS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const B0: i64 = 1_700_000_100; // aligned to 180s

    fn c15(t: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new("MNQ", t, open, high, low, close)
    }

    #[test]
    fn test_twelve_candles_compose_one_bucket() {
        assert_eq!(B0 % 180, 0);
        let mut deriver = CandleDeriver::default();
        let mut out = Vec::new();
        for i in 0..12 {
            let base = 100.0 + i as f64;
            out.extend(deriver.on_closed_15s(&c15(
                B0 + i * 15,
                base,
                base + 2.0,
                base - 1.0,
                base + 0.5,
            )));
        }

        assert_eq!(out.len(), 1);
        let bar = &out[0];
        assert_eq!(bar.interval_start, B0);
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.close, 111.5);
        assert_eq!(bar.high, 113.0);
        assert_eq!(bar.low, 99.0);
        assert_eq!(deriver.pending_count("MNQ"), 0);
    }

    #[test]
    fn test_bucket_stays_open_until_twelfth() {
        let mut deriver = CandleDeriver::default();
        for i in 0..11 {
            assert!(deriver
                .on_closed_15s(&c15(B0 + i * 15, 1.0, 1.0, 1.0, 1.0))
                .is_empty());
        }
        assert_eq!(deriver.pending_count("MNQ"), 11);
    }

    #[test]
    fn test_jump_finalizes_partial_and_fills_gap() {
        let mut deriver = CandleDeriver::default();
        deriver.on_closed_15s(&c15(B0, 100.0, 101.0, 99.0, 100.5));
        deriver.on_closed_15s(&c15(B0 + 15, 100.5, 102.0, 100.0, 101.0));

        // skip the next two buckets entirely
        let out = deriver.on_closed_15s(&c15(B0 + 540, 105.0, 106.0, 104.0, 105.5));
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].interval_start, B0);
        assert_eq!(out[0].close, 101.0);
        assert_eq!(out[0].high, 102.0);
        assert_eq!(out[1], Candle::flat("MNQ", B0 + 180, 101.0));
        assert_eq!(out[2], Candle::flat("MNQ", B0 + 360, 101.0));
        assert_eq!(deriver.pending_count("MNQ"), 1);
    }

    #[test]
    fn test_gap_after_eager_close_is_filled() {
        let mut deriver = CandleDeriver::default();
        for i in 0..12 {
            deriver.on_closed_15s(&c15(B0 + i * 15, 50.0, 50.0, 50.0, 50.0));
        }
        let out = deriver.on_closed_15s(&c15(B0 + 360, 60.0, 60.0, 60.0, 60.0));
        assert_eq!(out, vec![Candle::flat("MNQ", B0 + 180, 50.0)]);
    }

    #[test]
    fn test_gap_larger_than_limit_is_not_filled() {
        let mut deriver = CandleDeriver::new(2);
        deriver.on_closed_15s(&c15(B0, 1.0, 1.0, 1.0, 1.0));
        let out = deriver.on_closed_15s(&c15(B0 + 180 * 10, 2.0, 2.0, 2.0, 2.0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].interval_start, B0);
    }

    #[test]
    fn test_never_rewinds() {
        let mut deriver = CandleDeriver::default();
        deriver.on_closed_15s(&c15(B0 + 30, 1.0, 1.0, 1.0, 1.0));
        assert!(deriver.on_closed_15s(&c15(B0 + 15, 9.0, 9.0, 9.0, 9.0)).is_empty());
        assert!(deriver.on_closed_15s(&c15(B0 + 30, 9.0, 9.0, 9.0, 9.0)).is_empty());
        assert_eq!(deriver.pending_count("MNQ"), 1);
    }
}
