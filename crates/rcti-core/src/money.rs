//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Decimal Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    8.5 h × $85.10 = 723.3499999999999  ❌ WRONG!                        │
//! │                                                                         │
//! │  OUR SOLUTION: Exact decimals, always held at 2 decimal places         │
//! │    8.5 × 85.10 = 723.350 → $723.35 (round half up)                     │
//! │                                                                         │
//! │  Hours and percentages stay as `Decimal`; anything that is an amount   │
//! │  of dollars passes through `Money::from_decimal` exactly once.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use rcti_core::money::Money;
//!
//! let rate = Money::from_cents(8500); // $85.00
//! let doubled = rate + rate;          // $170.00
//! assert_eq!(doubled.cents(), 17000);
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::error::ValidationError;
use crate::types::TaxRate;

/// Number of decimal places every monetary amount is held at.
pub const MONEY_SCALE: u32 = 2;

/// Rounds a decimal to cents, half-up (midpoint away from zero).
///
/// ## Example
/// ```rust
/// use rcti_core::money::round_to_cents;
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
///
/// let levy = Decimal::from_str("48.438").unwrap();
/// assert_eq!(round_to_cents(levy).to_string(), "48.44");
///
/// let half = Decimal::from_str("0.125").unwrap();
/// assert_eq!(round_to_cents(half).to_string(), "0.13");
/// ```
pub fn round_to_cents(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary amount in dollars, held exactly at two decimal places.
///
/// ## Design Decisions
/// - **Decimal (signed)**: negative values carry break deductions and clawbacks
/// - **Scale is always 2**: every constructor rounds and rescales, so
///   `cents()` is the decimal mantissa and storage is an integer column
/// - **Serde via Decimal**: deserialized values are normalised the same way
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Zero dollars.
    pub const ZERO: Money = Money(Decimal::from_parts(0, 0, 0, false, MONEY_SCALE));

    /// Creates a Money value from cents (the storage representation).
    ///
    /// ## Example
    /// ```rust
    /// use rcti_core::money::Money;
    ///
    /// let rate = Money::from_cents(8550);
    /// assert_eq!(rate.to_string(), "$85.50");
    /// ```
    #[inline]
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, MONEY_SCALE))
    }

    /// Creates a Money value from an arbitrary decimal, rounding half-up to cents.
    ///
    /// ## Example
    /// ```rust
    /// use rcti_core::money::Money;
    /// use rust_decimal::Decimal;
    /// use std::str::FromStr;
    ///
    /// let raw = Decimal::from_str("722.505").unwrap();
    /// assert_eq!(Money::from_decimal(raw).cents(), 72251);
    /// ```
    #[inline]
    pub fn from_decimal(value: Decimal) -> Self {
        Money(round_to_cents(value))
    }

    /// Returns the value in cents.
    #[inline]
    pub fn cents(&self) -> i64 {
        // Scale is pinned to 2, so the mantissa is the cent count.
        self.0.mantissa() as i64
    }

    /// Returns the underlying decimal (scale 2).
    #[inline]
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money::ZERO
    }

    /// Checks if the value is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Returns the absolute value.
    #[inline]
    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies by a decimal quantity (hours, trip counts) and rounds to cents.
    ///
    /// ## Example
    /// ```rust
    /// use rcti_core::money::Money;
    /// use rust_decimal::Decimal;
    /// use std::str::FromStr;
    ///
    /// let rate = Money::from_cents(8500);
    /// let hours = Decimal::from_str("8.5").unwrap();
    /// assert_eq!(rate.multiply(hours).cents(), 72250);
    /// ```
    pub fn multiply(&self, quantity: Decimal) -> Money {
        Money::from_decimal(self.0 * quantity)
    }

    /// Takes a percentage of this amount (`10` = 10%) and rounds to cents.
    ///
    /// ## Example
    /// ```rust
    /// use rcti_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// let subtotal = Money::from_cents(48438);
    /// assert_eq!(subtotal.percentage(Decimal::from(10)).cents(), 4844);
    /// ```
    pub fn percentage(&self, percent: Decimal) -> Money {
        Money::from_decimal(self.0 * percent / Decimal::ONE_HUNDRED)
    }

    /// Calculates tax on a tax-exclusive amount, rounding half-up.
    ///
    /// ## User Workflow
    /// ```text
    /// Line ex-GST: $722.50
    ///      │
    ///      ▼
    /// calculate_tax(10%) ← THIS FUNCTION
    ///      │
    ///      ▼
    /// GST: $72.25 → inc-GST $794.75
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        Money::from_decimal(self.0 * rate.as_decimal())
    }

    /// Backs the tax-exclusive portion out of a tax-inclusive amount.
    ///
    /// ## Example
    /// ```rust
    /// use rcti_core::money::Money;
    /// use rcti_core::types::TaxRate;
    ///
    /// let inclusive = Money::from_cents(11000); // $110.00 inc GST
    /// let exclusive = inclusive.exclusive_of(TaxRate::from_bps(1000));
    /// assert_eq!(exclusive.cents(), 10000);
    /// ```
    pub fn exclusive_of(&self, rate: TaxRate) -> Money {
        Money::from_decimal(self.0 / (Decimal::ONE + rate.as_decimal()))
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self <= other {
            self
        } else {
            other
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows money as `$1234.50` (logs and debugging only).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        write!(f, "{}${}", sign, self.0.abs())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::ZERO
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money::from_decimal(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

/// Parses plain decimal text (`"85.00"`, `"-12.5"`); a leading `$` is accepted.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let digits = digits.strip_prefix('$').unwrap_or(digits);
        let value = Decimal::from_str(digits).map_err(|e| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: e.to_string(),
        })?;
        let money = Money::from_decimal(value);
        Ok(if negative { -money } else { money })
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.as_decimal(), dec!(10.99));
    }

    #[test]
    fn test_scale_is_pinned() {
        // A whole-dollar decimal still reports cents correctly.
        let money = Money::from_decimal(dec!(1000));
        assert_eq!(money.cents(), 100_000);
        assert_eq!(Money::ZERO.cents(), 0);
        assert_eq!((money - money).cents(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::zero()), "$0.00");
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(Money::from_decimal(dec!(0.125)).cents(), 13);
        assert_eq!(Money::from_decimal(dec!(0.124)).cents(), 12);
        // Midpoints on negative amounts round away from zero.
        assert_eq!(Money::from_decimal(dec!(-0.125)).cents(), -13);
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((-a).cents(), -1000);

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_tax_calculation_basic() {
        let amount = Money::from_cents(72250);
        let tax = amount.calculate_tax(TaxRate::from_bps(1000));
        assert_eq!(tax.cents(), 7225);
    }

    #[test]
    fn test_exclusive_of() {
        // $100.00 inc GST → $90.909… → $90.91
        let inclusive = Money::from_cents(10000);
        assert_eq!(inclusive.exclusive_of(TaxRate::from_bps(1000)).cents(), 9091);
    }

    #[test]
    fn test_parse() {
        assert_eq!("85.00".parse::<Money>().unwrap().cents(), 8500);
        assert_eq!("$12.5".parse::<Money>().unwrap().cents(), 1250);
        assert_eq!("-$3.10".parse::<Money>().unwrap().cents(), -310);
        assert!("twelve".parse::<Money>().is_err());
    }

    #[test]
    fn test_serde_normalises_scale() {
        let money: Money = serde_json::from_str("\"10.5\"").unwrap();
        assert_eq!(money.cents(), 1050);
        assert_eq!(serde_json::to_string(&money).unwrap(), "\"10.50\"");
    }

    #[test]
    fn test_min() {
        let remaining = Money::from_cents(10000);
        let per_cycle = Money::from_cents(15000);
        assert_eq!(remaining.min(per_cycle), remaining);
        assert_eq!(per_cycle.min(remaining), remaining);
    }
}
