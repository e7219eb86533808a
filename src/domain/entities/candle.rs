use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::ValidationError;

/// Candle interval handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "15s")]
    FifteenSeconds,
    #[serde(rename = "3m")]
    ThreeMinutes,
}

impl Interval {
    pub fn seconds(&self) -> i64 {
        match self {
            Interval::FifteenSeconds => 15,
            Interval::ThreeMinutes => 180,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::FifteenSeconds => "15s",
            Interval::ThreeMinutes => "3m",
        }
    }

    /// Start of the bucket containing `epoch_seconds`.
    pub fn align(&self, epoch_seconds: i64) -> i64 {
        epoch_seconds.div_euclid(self.seconds()) * self.seconds()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "15s" => Ok(Interval::FifteenSeconds),
            "3m" => Ok(Interval::ThreeMinutes),
            other => Err(ValidationError::Unrecognized(format!("interval '{}'", other))),
        }
    }
}

/// OHLC candle for one aligned interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    /// Bucket start, epoch seconds, aligned to the interval
    pub interval_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(
        symbol: impl Into<String>,
        interval_start: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            interval_start,
            open,
            high,
            low,
            close,
        }
    }

    /// A candle with no range, used to fill quiet or missing intervals.
    pub fn flat(symbol: impl Into<String>, interval_start: i64, price: f64) -> Self {
        Self::new(symbol, interval_start, price, price, price, price)
    }

    /// Does `[low, high]` share at least one price with `[bottom, top]`?
    pub fn overlaps(&self, bottom: f64, top: f64) -> bool {
        self.low <= top && self.high >= bottom
    }
}

/// A 15-second bucket as it left the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedCandle {
    pub candle: Candle,
    pub tick_count: u32,
    /// Closed by the quiet-market timer rather than by a later quote
    pub forced: bool,
}

impl ClosedCandle {
    /// Only genuine rollovers built from more than one quote carry tradable information.
    pub fn is_tradable(&self) -> bool {
        !self.forced && self.tick_count > 1
    }
}
