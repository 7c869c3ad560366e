//! # Repository Module
//!
//! Row mapping and conditional writes for every table.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Entry Points Per Table                          │
//! │                                                                         │
//! │  Caller outside a transaction                                          │
//! │       │  db.invoices().get_by_id(id)                                   │
//! │       ▼                                                                 │
//! │  InvoiceRepository (owns a pool clone, acquires a connection)          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  invoice::fetch_invoice(&mut conn, id)  ◄── InvoiceService / ledger    │
//! │       │                                     call these directly with   │
//! │       │                                     their open transaction     │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes whose success depends on current state (`status = 'draft'`,
//! `amount_remaining_cents = ?`) return the affected row count; zero means
//! the condition no longer held.
//!
//! ## Available Repositories
//!
//! - [`DriverRepository`](driver::DriverRepository) - Drivers and billable records
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Invoices and lines
//! - [`DeductionRepository`](deduction::DeductionRepository) - Standing deductions and applications

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{DbError, DbResult};

pub mod deduction;
pub mod driver;
pub mod invoice;

/// Parses a decimal stored as TEXT.
pub(crate) fn decode_decimal(column: &str, text: &str) -> DbResult<Decimal> {
    Decimal::from_str(text).map_err(|e| DbError::invalid_data(column, e))
}

pub(crate) fn decode_optional_decimal(column: &str, text: Option<&str>) -> DbResult<Option<Decimal>> {
    text.map(|t| decode_decimal(column, t)).transpose()
}

/// Normalises optional free text: blank means absent.
pub(crate) fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_decimal() {
        assert_eq!(decode_decimal("hours", "8.50").unwrap(), dec!(8.5));
        assert!(matches!(
            decode_decimal("hours", "eight"),
            Err(DbError::InvalidData { .. })
        ));
        assert_eq!(decode_optional_decimal("break", None).unwrap(), None);
    }

    #[test]
    fn test_blank_to_none() {
        assert_eq!(blank_to_none(Some("  ".to_string())), None);
        assert_eq!(blank_to_none(Some("x".to_string())), Some("x".to_string()));
    }
}
