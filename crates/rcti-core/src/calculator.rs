//! # Line Calculator
//!
//! Prices one line (units × rate) under a tax status and tax mode, and sums
//! a set of lines into invoice totals.
//!
//! ## GST Split
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         GST Treatment                                   │
//! │                                                                         │
//! │  gross = round(units × rate)                                           │
//! │                                                                         │
//! │  registered + exclusive   ex = gross                                   │
//! │                           tax = round(ex × 10%)                        │
//! │                           inc = ex + tax                               │
//! │                                                                         │
//! │  registered + inclusive   inc = gross                                  │
//! │                           ex = round(inc / 1.10)                       │
//! │                           tax = inc − ex                               │
//! │                                                                         │
//! │  not registered           ex = inc = gross, tax = 0                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;

use crate::money::Money;
use crate::types::{InvoiceLine, InvoiceTotals, LineAmounts, Priced, TaxMode, TaxStatus};
use crate::GST_RATE;

/// Computes the ex-tax / tax / inc-tax split of a line.
///
/// Inputs are expected to be validated already: `units` is non-negative for
/// billable work, `rate` may be negative for a clawback, and synthetic break
/// lines pass negative units.
///
/// ## Example
/// ```rust
/// use rcti_core::calculator::compute_line_amounts;
/// use rcti_core::money::Money;
/// use rcti_core::types::{TaxMode, TaxStatus};
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
///
/// let amounts = compute_line_amounts(
///     Decimal::from_str("8.5").unwrap(),
///     Money::from_cents(8500),
///     TaxStatus::Registered,
///     TaxMode::Exclusive,
/// );
/// assert_eq!(amounts.ex_tax.cents(), 72250);
/// assert_eq!(amounts.tax.cents(), 7225);
/// assert_eq!(amounts.inc_tax.cents(), 79475);
/// ```
pub fn compute_line_amounts(
    units: Decimal,
    rate: Money,
    tax_status: TaxStatus,
    tax_mode: TaxMode,
) -> LineAmounts {
    let gross = rate.multiply(units);

    match (tax_status, tax_mode) {
        (TaxStatus::NotRegistered, _) => LineAmounts {
            ex_tax: gross,
            tax: Money::ZERO,
            inc_tax: gross,
        },
        (TaxStatus::Registered, TaxMode::Exclusive) => {
            let tax = gross.calculate_tax(GST_RATE);
            LineAmounts {
                ex_tax: gross,
                tax,
                inc_tax: gross + tax,
            }
        }
        (TaxStatus::Registered, TaxMode::Inclusive) => {
            let ex_tax = gross.exclusive_of(GST_RATE);
            LineAmounts {
                ex_tax,
                tax: gross - ex_tax,
                inc_tax: gross,
            }
        }
    }
}

/// Re-prices an existing line under new tax settings. Units and rate stay.
pub fn recompute_line(line: &InvoiceLine, tax_status: TaxStatus, tax_mode: TaxMode) -> InvoiceLine {
    InvoiceLine {
        amounts: compute_line_amounts(line.units, line.rate, tax_status, tax_mode),
        ..line.clone()
    }
}

/// Sums a line set into subtotal (ex-tax), tax and total (inc-tax).
///
/// Order-independent; an empty slice yields zeros.
pub fn compute_totals<T: Priced>(lines: &[T]) -> InvoiceTotals {
    lines.iter().fold(InvoiceTotals::default(), |mut acc, line| {
        let amounts = line.amounts();
        acc.subtotal += amounts.ex_tax;
        acc.tax += amounts.tax;
        acc.total += amounts.inc_tax;
        acc
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
