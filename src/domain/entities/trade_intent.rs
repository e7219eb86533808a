use serde::{Deserialize, Serialize};

use crate::domain::entities::order::Side;

/// A fully sized entry produced by the strategy engine.
///
/// Immutable once built: it is either recorded as a signal or dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub side: Side,
    /// Start of the 15-second candle that confirmed the entry, epoch seconds
    pub entry_time: i64,
    /// Origin time of the imbalance box being traded, epoch seconds
    pub fvg_time: i64,
    pub entry_price: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
    pub stop_ticks: i64,
    pub tp_ticks: i64,
    pub rr: f64,
    pub contracts: i64,
    pub risk_usd_planned: f64,
}

impl TradeIntent {
    /// Are stop, entry and target ordered correctly for the side, with positive sizes?
    pub fn has_valid_bracket(&self) -> bool {
        if self.stop_ticks <= 0 || self.tp_ticks <= 0 || self.contracts <= 0 {
            return false;
        }
        match self.side {
            Side::Long => {
                self.stop_price < self.entry_price && self.entry_price < self.take_profit_price
            }
            Side::Short => {
                self.take_profit_price < self.entry_price && self.entry_price < self.stop_price
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_intent() -> TradeIntent {
        TradeIntent {
            symbol: "MNQ".to_string(),
            side: Side::Long,
            entry_time: 1_000,
            fvg_time: 720,
            entry_price: 100.0,
            stop_price: 99.0,
            take_profit_price: 102.0,
            stop_ticks: 4,
            tp_ticks: 8,
            rr: 2.0,
            contracts: 3,
            risk_usd_planned: 6.0,
        }
    }

    #[test]
    fn test_valid_long_bracket() {
        assert!(long_intent().has_valid_bracket());
    }

    #[test]
    fn test_inverted_bracket_is_invalid() {
        let mut intent = long_intent();
        intent.side = Side::Short;
        assert!(!intent.has_valid_bracket());
    }

    #[test]
    fn test_zero_target_ticks_is_invalid() {
        let mut intent = long_intent();
        intent.tp_ticks = 0;
        assert!(!intent.has_valid_bracket());
    }
}
