//! Tick arithmetic for a futures instrument.
//!
//! Every distance that feeds risk sizing is expressed in whole ticks, and every
//! price this crate produces lies on the instrument's tick grid.

use crate::domain::errors::ValidationError;

/// Tick size (price increment) and tick value (USD per tick per contract).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSpec {
    tick_size: f64,
    tick_value: f64,
}

impl TickSpec {
    pub fn new(tick_size: f64, tick_value: f64) -> Result<Self, ValidationError> {
        if !tick_size.is_finite() || !tick_value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if tick_size <= 0.0 {
            return Err(ValidationError::InvalidTick(format!(
                "tick size must be positive, got {}",
                tick_size
            )));
        }
        if tick_value <= 0.0 {
            return Err(ValidationError::InvalidTick(format!(
                "tick value must be positive, got {}",
                tick_value
            )));
        }
        Ok(Self {
            tick_size,
            tick_value,
        })
    }

    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    pub fn tick_value(&self) -> f64 {
        self.tick_value
    }

    /// Number of whole ticks in a price distance, rounded to the nearest tick.
    pub fn ticks_in(&self, distance: f64) -> i64 {
        (distance / self.tick_size).round() as i64
    }

    /// Move a price by a signed number of ticks.
    pub fn offset(&self, price: f64, ticks: i64) -> f64 {
        price + ticks as f64 * self.tick_size
    }

    /// USD exposure of `ticks` ticks on `contracts` contracts.
    pub fn usd_for(&self, ticks: i64, contracts: i64) -> f64 {
        ticks as f64 * self.tick_value * contracts as f64
    }
}

/// Micro E-mini Nasdaq-100: quarter-point ticks worth $0.50.
impl Default for TickSpec {
    fn default() -> Self {
        Self {
            tick_size: 0.25,
            tick_value: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mnq() -> TickSpec {
        TickSpec::new(0.25, 0.5).unwrap()
    }

    #[test]
    fn test_tick_spec_rejects_non_positive() {
        assert!(TickSpec::new(0.0, 1.0).is_err());
        assert!(TickSpec::new(0.25, -1.0).is_err());
        assert!(TickSpec::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_ticks_in_rounds_to_nearest() {
        let spec = mnq();
        assert_eq!(spec.ticks_in(10.0), 40);
        assert_eq!(spec.ticks_in(10.1), 40);
        assert_eq!(spec.ticks_in(10.13), 41);
        assert_eq!(spec.ticks_in(0.0), 0);
    }

    #[test]
    fn test_offset_moves_by_whole_ticks() {
        let spec = mnq();
        assert_eq!(spec.offset(18000.25, 8), 18002.25);
        assert_eq!(spec.offset(18000.25, -8), 17998.25);
        // a midpoint stays off the grid
        assert_eq!(spec.offset(18000.125, 4), 18001.125);
    }

    #[test]
    fn test_usd_for() {
        let spec = mnq();
        assert_eq!(spec.usd_for(40, 6), 120.0);
    }
}
