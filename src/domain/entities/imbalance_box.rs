use serde::{Deserialize, Serialize};

use crate::domain::entities::candle::Candle;
use crate::domain::entities::order::Side;

/// A three-candle price gap on the 3-minute series (fair value gap).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImbalanceBox {
    pub side: Side,
    /// Start of the 3-minute candle that completed the gap, epoch seconds
    pub origin_time: i64,
    pub top: f64,
    pub bottom: f64,
    pub invalid: bool,
    pub retested: bool,
    pub traded: bool,
}

impl ImbalanceBox {
    /// Detect a gap between `c2` (two candles back) and `c0` (just closed).
    pub fn detect(c2: &Candle, c0: &Candle) -> Option<Self> {
        if c0.low > c2.high {
            Some(Self::new(Side::Long, c0.interval_start, c0.low, c2.high))
        } else if c0.high < c2.low {
            Some(Self::new(Side::Short, c0.interval_start, c2.low, c0.high))
        } else {
            None
        }
    }

    fn new(side: Side, origin_time: i64, top: f64, bottom: f64) -> Self {
        Self {
            side,
            origin_time,
            top,
            bottom,
            invalid: false,
            retested: false,
            traded: false,
        }
    }

    /// Has a 3-minute close moved through the boundary opposite the box's side?
    pub fn is_broken_by(&self, close: f64) -> bool {
        match self.side {
            Side::Long => close < self.bottom,
            Side::Short => close > self.top,
        }
    }

    pub fn is_tradable(&self) -> bool {
        self.retested && !self.invalid && !self.traded
    }
}
