//! Fixed-point monetary values.
//!
//! Amounts are always a signed integer count of minor units — never a
//! float. Scaling (e.g. multiplying a unit price by a quantity) goes
//! through [`rust_decimal::Decimal`] so the intermediate result is exact,
//! then gets rounded half-to-even back onto the minor-unit grid.

use pf_errors::Error;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::currency::Currency;

/// A signed amount in the smallest unit of `currency` (e.g. cents for
/// USD, dong for VND). Negative amounts represent outflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount_minor: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount_minor: i64, currency: Currency) -> Self {
        Self {
            amount_minor,
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    fn require_same_currency(&self, other: &Money) -> Result<(), Error> {
        if self.currency != other.currency {
            return Err(Error::validation(format!(
                "currency mismatch: {} vs {}",
                self.currency, other.currency
            )));
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, Error> {
        self.require_same_currency(other)?;
        let amount_minor = self
            .amount_minor
            .checked_add(other.amount_minor)
            .ok_or_else(|| Error::internal("money addition overflowed i64"))?;
        Ok(Money::new(amount_minor, self.currency))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, Error> {
        self.require_same_currency(other)?;
        let amount_minor = self
            .amount_minor
            .checked_sub(other.amount_minor)
            .ok_or_else(|| Error::internal("money subtraction overflowed i64"))?;
        Ok(Money::new(amount_minor, self.currency))
    }

    pub fn negate(&self) -> Result<Money, Error> {
        let amount_minor = self
            .amount_minor
            .checked_neg()
            .ok_or_else(|| Error::internal("money negation overflowed i64"))?;
        Ok(Money::new(amount_minor, self.currency))
    }

    /// Multiply by a scalar, rounding half-to-even to the nearest minor
    /// unit. Used for applying an FX rate or a unit price to a quantity.
    pub fn checked_mul_scalar(&self, scalar: Decimal) -> Result<Money, Error> {
        let exact = Decimal::from(self.amount_minor) * scalar;
        round_half_to_even_i64(exact).map(|amount_minor| Money::new(amount_minor, self.currency))
    }

    /// Divide by a non-zero scalar, rounding half-to-even.
    pub fn checked_div_scalar(&self, scalar: Decimal) -> Result<Money, Error> {
        if scalar.is_zero() {
            return Err(Error::validation("division by zero"));
        }
        let exact = Decimal::from(self.amount_minor) / scalar;
        round_half_to_even_i64(exact).map(|amount_minor| Money::new(amount_minor, self.currency))
    }

    pub fn is_negative(&self) -> bool {
        self.amount_minor < 0
    }
}

/// Round an exact decimal value to the nearest whole minor unit using
/// banker's rounding, then pack it into an `i64`, failing on overflow.
///
/// This uses `Decimal`'s checked rounding rather than a signed
/// comparison against `i64::MIN`/`i64::MAX`, which does not reliably
/// detect overflow at the boundary (e.g. negating `i64::MIN`).
pub fn round_half_to_even_i64(exact: Decimal) -> Result<i64, Error> {
    let rounded = exact.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
    rounded
        .to_string()
        .parse::<i64>()
        .map_err(|_| Error::internal("rounded amount does not fit in i64"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_cross_currency_addition() {
        let a = Money::new(100, Currency::Usd);
        let b = Money::new(100, Currency::Vnd);
        let err = a.checked_add(&b).unwrap_err();
        assert_eq!(err.kind(), pf_errors::ErrorKind::Validation);
    }

    #[test]
    fn half_to_even_rounds_ties_to_even() {
        assert_eq!(round_half_to_even_i64(dec!(2.5)).unwrap(), 2);
        assert_eq!(round_half_to_even_i64(dec!(3.5)).unwrap(), 4);
        assert_eq!(round_half_to_even_i64(dec!(-2.5)).unwrap(), -2);
    }

    #[test]
    fn mul_scalar_applies_rate_with_rounding() {
        let price = Money::new(1000, Currency::Usd);
        let result = price.checked_mul_scalar(dec!(1.005)).unwrap();
        assert_eq!(result.amount_minor, 1005);
    }

    #[test]
    fn div_by_zero_is_rejected() {
        let m = Money::new(100, Currency::Usd);
        let err = m.checked_div_scalar(Decimal::ZERO).unwrap_err();
        assert_eq!(err.kind(), pf_errors::ErrorKind::Validation);
    }
}
