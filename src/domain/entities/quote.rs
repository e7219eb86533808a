use serde::{Deserialize, Serialize};

use crate::domain::value_objects::price::Price;

/// A raw quote update as delivered by the broker adapter.
///
/// Any of the price fields may be missing; a missing field means "unchanged",
/// never "cleared".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub instrument_id: String,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    /// Exchange timestamp in epoch milliseconds
    pub observed_at_ms: i64,
}

impl Quote {
    pub fn last_trade(instrument_id: impl Into<String>, last: f64, observed_at_ms: i64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            bid: None,
            ask: None,
            last: Some(last),
            observed_at_ms,
        }
    }
}

/// Best bid/ask/last for one instrument after merging every quote seen so far.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSnapshot {
    pub instrument_id: String,
    pub bid: Option<Price>,
    pub ask: Option<Price>,
    pub last: Option<Price>,
    pub observed_at_ms: i64,
}

impl QuoteSnapshot {
    /// Price used for candle building: last trade, else mid, else whichever side exists.
    pub fn trade_price(&self) -> Option<Price> {
        if let Some(last) = self.last {
            return Some(last);
        }
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some(bid.midpoint(ask)),
            (Some(bid), None) => Some(bid),
            (None, Some(ask)) => Some(ask),
            (None, None) => None,
        }
    }
}
