//! # Validation Module
//!
//! Input validation for everything that reaches the calculators or the
//! store. Calculators assume their inputs passed through here.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Service entry (rcti-db InvoiceService / DeductionLedger)      │
//! │  ├── THIS MODULE: value rules (ranges, required text, amounts)         │
//! │  └── lifecycle: state rules (what may change in which status)          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Pure calculators                                             │
//! │  └── No checks; inputs are trusted                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── UNIQUE invoice number                                             │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use rcti_core::validation::{validate_levy_percent, validate_units};
//! use rust_decimal::Decimal;
//!
//! assert!(validate_units(Decimal::new(85, 1)).is_ok());
//! assert!(validate_levy_percent(Decimal::new(101, 0)).is_err());
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{BillingSettings, TollTrips};
use crate::{MAX_BREAK_HOURS_PER_SHIFT, MAX_CATEGORY_LEN, MAX_LEVY_PERCENT, MAX_NAME_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn validate_required_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a payee or driver name.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 200 characters
///
/// ## Example
/// ```rust
/// use rcti_core::validation::validate_payee_name;
///
/// assert!(validate_payee_name("Sam Citizen").is_ok());
/// assert!(validate_payee_name("   ").is_err());
/// ```
pub fn validate_payee_name(name: &str) -> ValidationResult<()> {
    validate_required_text("payee name", name, MAX_NAME_LEN)
}

/// Validates a vehicle class label; it becomes a line category.
pub fn validate_vehicle_class(class: &str) -> ValidationResult<()> {
    validate_required_text("vehicle class", class, MAX_CATEGORY_LEN)
}

/// Validates the category of a manually entered line.
pub fn validate_category(category: &str) -> ValidationResult<()> {
    validate_required_text("category", category, MAX_CATEGORY_LEN)
}

pub fn validate_description(description: &str) -> ValidationResult<()> {
    validate_required_text("description", description, MAX_NAME_LEN)
}

/// Validates an Australian BSB: six digits, optionally written `NNN-NNN`.
///
/// An empty value is accepted and means "no BSB".
pub fn validate_bsb(bsb: &str) -> ValidationResult<()> {
    let bsb = bsb.trim();
    if bsb.is_empty() {
        return Ok(());
    }

    let digits: String = bsb.chars().filter(|c| *c != '-').collect();
    let hyphen_ok = !bsb.contains('-') || (bsb.len() == 7 && bsb.as_bytes()[3] == b'-');

    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_digit()) || !hyphen_ok {
        return Err(ValidationError::InvalidFormat {
            field: "bsb".to_string(),
            reason: "must be six digits, e.g. 063-000".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line's units (hours).
///
/// ## Rules
/// - Must be zero or greater. Negative units are reserved for generated
///   break lines, which never pass through here.
pub fn validate_units(units: Decimal) -> ValidationResult<()> {
    if units.is_sign_negative() && !units.is_zero() {
        return Err(ValidationError::MustNotBeNegative {
            field: "units".to_string(),
        });
    }

    Ok(())
}

/// Validates a fuel levy percentage.
///
/// ## Rules
/// - Between 0 and 100 inclusive
pub fn validate_levy_percent(percent: Decimal) -> ValidationResult<()> {
    if percent < Decimal::ZERO || percent > MAX_LEVY_PERCENT {
        return Err(ValidationError::OutOfRange {
            field: "fuel levy percent".to_string(),
            min: "0".to_string(),
            max: MAX_LEVY_PERCENT.to_string(),
        });
    }

    Ok(())
}

/// Validates the unpaid break per shift. `None` is "no breaks".
pub fn validate_break_hours(hours: Option<Decimal>) -> ValidationResult<()> {
    match hours {
        Some(h) if h < Decimal::ZERO || h > MAX_BREAK_HOURS_PER_SHIFT => {
            Err(ValidationError::OutOfRange {
                field: "break hours per shift".to_string(),
                min: "0".to_string(),
                max: MAX_BREAK_HOURS_PER_SHIFT.to_string(),
            })
        }
        _ => Ok(()),
    }
}

pub fn validate_toll_trips(trips: &TollTrips) -> ValidationResult<()> {
    if trips.eastlink < 0 || trips.citylink < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "toll trips".to_string(),
        });
    }

    Ok(())
}

/// Validates a money amount that must be strictly positive.
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates the amounts of a new standing deduction.
///
/// ## Rules
/// - Total and per-cycle amounts are both positive
pub fn validate_deduction_amounts(total: Money, per_cycle: Money) -> ValidationResult<()> {
    validate_positive_amount("total amount", total)?;
    validate_positive_amount("amount per cycle", per_cycle)
}

/// Validates a driver's billing settings as a whole.
pub fn validate_billing_settings(settings: &BillingSettings) -> ValidationResult<()> {
    validate_break_hours(settings.break_hours_per_shift)?;
    validate_levy_percent(settings.fuel_levy_percent)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_payee_name() {
        assert!(validate_payee_name("Sam Citizen").is_ok());
        assert!(matches!(
            validate_payee_name(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_payee_name(&"A".repeat(201)).is_err());
    }

    #[test]
    fn test_validate_units() {
        assert!(validate_units(dec!(0)).is_ok());
        assert!(validate_units(dec!(8.5)).is_ok());
        assert!(validate_units(dec!(-0.25)).is_err());
    }

    #[test]
    fn test_validate_levy_percent() {
        assert!(validate_levy_percent(dec!(0)).is_ok());
        assert!(validate_levy_percent(dec!(12.5)).is_ok());
        assert!(validate_levy_percent(dec!(100)).is_ok());
        assert!(validate_levy_percent(dec!(100.01)).is_err());
        assert!(validate_levy_percent(dec!(-1)).is_err());
    }

    #[test]
    fn test_validate_break_hours() {
        assert!(validate_break_hours(None).is_ok());
        assert!(validate_break_hours(Some(dec!(0.5))).is_ok());
        assert!(validate_break_hours(Some(dec!(24))).is_ok());
        assert!(validate_break_hours(Some(dec!(24.5))).is_err());
        assert!(validate_break_hours(Some(dec!(-0.5))).is_err());
    }

    #[test]
    fn test_validate_deduction_amounts() {
        assert!(validate_deduction_amounts(Money::from_cents(100_000), Money::from_cents(15_000)).is_ok());
        assert!(validate_deduction_amounts(Money::ZERO, Money::from_cents(15_000)).is_err());
        assert!(matches!(
            validate_deduction_amounts(Money::from_cents(100), Money::from_cents(-1)),
            Err(ValidationError::MustBePositive { .. })
        ));
    }

    #[test]
    fn test_validate_bsb() {
        assert!(validate_bsb("063-000").is_ok());
        assert!(validate_bsb("063000").is_ok());
        assert!(validate_bsb("").is_ok());
        assert!(validate_bsb("06-3000").is_err());
        assert!(validate_bsb("0630001").is_err());
        assert!(validate_bsb("abc-def").is_err());
    }

    #[test]
    fn test_validate_toll_trips() {
        assert!(validate_toll_trips(&TollTrips { eastlink: 2, citylink: 0 }).is_ok());
        assert!(validate_toll_trips(&TollTrips { eastlink: -1, citylink: 0 }).is_err());
    }
}
