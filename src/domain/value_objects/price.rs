use crate::domain::errors::ValidationError;

/// A quoted instrument price. Always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if value <= 0.0 {
            return Err(ValidationError::InvalidPrice(format!(
                "price must be positive, got {}",
                value
            )));
        }
        Ok(Price(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Midpoint between two prices.
    pub fn midpoint(&self, other: Price) -> Price {
        Price((self.0 + other.0) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_new_valid() {
        let price = Price::new(100.25).unwrap();
        assert_eq!(price.value(), 100.25);
    }

    #[test]
    fn test_price_rejects_zero_and_negative() {
        assert!(Price::new(0.0).is_err());
        assert!(Price::new(-10.0).is_err());
    }

    #[test]
    fn test_price_rejects_nan() {
        assert!(matches!(
            Price::new(f64::NAN),
            Err(ValidationError::MustBeFinite)
        ));
        assert!(Price::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_price_midpoint() {
        let bid = Price::new(100.0).unwrap();
        let ask = Price::new(100.5).unwrap();
        assert_eq!(bid.midpoint(ask).value(), 100.25);
    }
}
