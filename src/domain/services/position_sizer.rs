//! Fixed-risk position sizing in whole ticks
//!
//! The stop distance is measured in ticks, the contract count is the largest
//! whole number whose stop loss fits the USD risk budget, and the take-profit
//! sits `reward_risk_ratio` stop distances beyond the entry.

use crate::domain::entities::order::Side;
use crate::domain::value_objects::position_sizing::{
    PositionSizingResult, RiskConfig, SizingRejection,
};
use crate::domain::value_objects::tick::TickSpec;

/// PositionSizer service for one instrument
#[derive(Debug, Clone, Copy)]
pub struct PositionSizer {
    tick: TickSpec,
}

impl PositionSizer {
    pub fn new(tick: TickSpec) -> Self {
        Self { tick }
    }

    /// Size an entry at `entry` protected by `stop`
    ///
    /// # Returns
    /// The sized bracket, or the rule that rejected it
    pub fn size(
        &self,
        side: Side,
        entry: f64,
        stop: f64,
        risk: &RiskConfig,
    ) -> Result<PositionSizingResult, SizingRejection> {
        let distance = match side {
            Side::Long => entry - stop,
            Side::Short => stop - entry,
        };
        if !distance.is_finite() || distance <= 0.0 {
            return Err(SizingRejection::NonPositiveStopDistance { distance });
        }

        let stop_ticks = self.tick.ticks_in(distance);
        if stop_ticks <= 0 {
            return Err(SizingRejection::ZeroStopTicks { distance });
        }
        if stop_ticks > risk.max_stop_ticks {
            return Err(SizingRejection::StopTooWide {
                stop_ticks,
                max_stop_ticks: risk.max_stop_ticks,
            });
        }

        let risk_per_contract = self.tick.usd_for(stop_ticks, 1);
        let contracts = (risk.risk_usd / risk_per_contract).floor() as i64;
        if contracts <= 0 {
            return Err(SizingRejection::ZeroContracts {
                risk_usd: risk.risk_usd,
                stop_ticks,
            });
        }

        let tp_ticks = (stop_ticks as f64 * risk.reward_risk_ratio).round() as i64;
        let take_profit_price = self.tick.offset(entry, side.sign() * tp_ticks);

        Ok(PositionSizingResult {
            stop_ticks,
            tp_ticks,
            contracts,
            take_profit_price,
            risk_usd_planned: self.tick.usd_for(stop_ticks, contracts),
        })
    }
}
