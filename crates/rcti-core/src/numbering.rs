//! # Invoice Numbering
//!
//! Human-readable invoice numbers of the form `RCTI-<YYYYMMDD>-<PAYEE>`.
//!
//! The generator is pure: the caller supplies the numbers already in use and
//! the store's UNIQUE constraint backs the result. Two invoices for the same
//! payee and period become `…-SMITH`, `…-SMITH-2`, `…-SMITH-3`.

use chrono::NaiveDate;
use std::collections::HashSet;

/// Prefix shared by every generated number.
pub const INVOICE_PREFIX: &str = "RCTI";

/// Longest payee slug kept in a number.
pub const MAX_PAYEE_SLUG_LEN: usize = 16;

/// Slug used when the payee name has no alphanumeric characters.
pub const FALLBACK_PAYEE_SLUG: &str = "PAYEE";

/// Upper-cases the payee name and drops everything but ASCII alphanumerics.
pub fn payee_slug(payee_name: &str) -> String {
    let slug: String = payee_name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .take(MAX_PAYEE_SLUG_LEN)
        .collect();

    if slug.is_empty() {
        FALLBACK_PAYEE_SLUG.to_string()
    } else {
        slug
    }
}

/// The number an invoice gets when nothing collides with it.
pub fn base_invoice_number(period_ending: NaiveDate, payee_name: &str) -> String {
    format!(
        "{}-{}-{}",
        INVOICE_PREFIX,
        period_ending.format("%Y%m%d"),
        payee_slug(payee_name)
    )
}

/// Returns a number not present in `existing`.
///
/// Tries the base number first, then `-2`, `-3`, … in order.
pub fn generate_invoice_number(
    existing: &HashSet<String>,
    period_ending: NaiveDate,
    payee_name: &str,
) -> String {
    let base = base_invoice_number(period_ending, payee_name);
    if !existing.contains(&base) {
        return base;
    }

    (2u32..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or(base)
}
