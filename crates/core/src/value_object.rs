//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Monetary amount in the currency's smallest unit.
///
/// All arithmetic is checked; overflow surfaces as a validation error rather
/// than wrapping.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn new(amount: i64) -> Self {
        Self(amount)
    }

    /// Construct a non-negative amount (prices, fees).
    pub fn non_negative(amount: i64) -> DomainResult<Self> {
        if amount < 0 {
            return Err(DomainError::validation(format!(
                "amount must not be negative (got {amount})"
            )));
        }
        Ok(Self(amount))
    }

    pub fn amount(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("money overflow"))
    }

    /// Multiply a unit price by a quantity.
    pub fn times(self, quantity: i64) -> DomainResult<Money> {
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or_else(|| DomainError::validation("money overflow"))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn negative_prices_are_rejected() {
        assert!(Money::non_negative(-1).is_err());
        assert_eq!(Money::non_negative(0).unwrap(), Money::ZERO);
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let err = Money::new(i64::MAX).checked_add(Money::new(1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(Money::new(i64::MAX / 2 + 1).times(2).is_err());
    }

    proptest! {
        #[test]
        fn times_matches_repeated_addition(price in 0i64..1_000_000, qty in 0i64..50) {
            let mut acc = Money::ZERO;
            for _ in 0..qty {
                acc = acc.checked_add(Money::new(price)).unwrap();
            }
            prop_assert_eq!(Money::new(price).times(qty).unwrap(), acc);
        }
    }
}
