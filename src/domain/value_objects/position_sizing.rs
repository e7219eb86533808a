//! Risk configuration and position sizing value objects

use serde::{Deserialize, Serialize};

use crate::domain::entities::order::EntryType;
use crate::domain::errors::ValidationError;

/// Risk parameters applied to every entry.
///
/// Reloaded from the settings store at runtime; a new value always replaces
/// the previous one as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// USD budget risked per trade
    pub risk_usd: f64,
    /// Take-profit distance as a multiple of the stop distance
    pub reward_risk_ratio: f64,
    /// Widest acceptable stop, in ticks
    pub max_stop_ticks: i64,
    /// Order type used for the entry leg
    pub entry_type: EntryType,
}

impl RiskConfig {
    pub fn new(
        risk_usd: f64,
        reward_risk_ratio: f64,
        max_stop_ticks: i64,
        entry_type: EntryType,
    ) -> Result<Self, ValidationError> {
        let config = Self {
            risk_usd,
            reward_risk_ratio,
            max_stop_ticks,
            entry_type,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.risk_usd.is_finite() || !self.reward_risk_ratio.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if self.risk_usd <= 0.0 {
            return Err(ValidationError::InvalidRisk(
                "risk_usd must be positive".to_string(),
            ));
        }
        if self.reward_risk_ratio <= 0.0 {
            return Err(ValidationError::InvalidRisk(
                "reward_risk_ratio must be positive".to_string(),
            ));
        }
        if self.max_stop_ticks <= 0 {
            return Err(ValidationError::InvalidRisk(
                "max_stop_ticks must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_usd: 250.0,
            reward_risk_ratio: 2.0,
            max_stop_ticks: 80,
            entry_type: EntryType::Market,
        }
    }
}

/// Outcome of sizing one entry against a [`RiskConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSizingResult {
    pub stop_ticks: i64,
    pub tp_ticks: i64,
    pub contracts: i64,
    pub take_profit_price: f64,
    pub risk_usd_planned: f64,
}

/// Why an entry could not be sized.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SizingRejection {
    #[error("stop distance {distance} is not positive")]
    NonPositiveStopDistance { distance: f64 },

    #[error("stop distance {distance} rounds to zero ticks")]
    ZeroStopTicks { distance: f64 },

    #[error("stop of {stop_ticks} ticks exceeds maximum of {max_stop_ticks}")]
    StopTooWide { stop_ticks: i64, max_stop_ticks: i64 },

    #[error("risk budget {risk_usd:.2} buys zero contracts at {stop_ticks} ticks")]
    ZeroContracts { risk_usd: f64, stop_ticks: i64 },
}
