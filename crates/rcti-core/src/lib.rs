//! # rcti-core: Pure Business Logic for the RCTI Ledger
//!
//! This crate holds every rule of recipient-created tax invoicing as pure
//! functions with zero I/O dependencies: line pricing under GST, synthetic
//! break / toll / levy lines, totals, invoice numbering, the invoice
//! lifecycle, and standing-deduction arithmetic.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RCTI Ledger Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           Callers (HTTP layer, PDF renderer, CLI, seed bin)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    rcti-db (Store Layer)                        │   │
//! │  │   InvoiceService, DeductionLedger, repositories, migrations     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ rcti-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────┐ ┌──────────┐ ┌────────────┐ ┌───────────────┐ │   │
//! │  │   │ calculator │ │  breaks  │ │ surcharges │ │   numbering   │ │   │
//! │  │   │ line + tot │ │ per class│ │ toll, levy │ │  RCTI-…-PAYEE │ │   │
//! │  │   └────────────┘ └──────────┘ └────────────┘ └───────────────┘ │   │
//! │  │   ┌────────────┐ ┌──────────┐ ┌────────────┐ ┌───────────────┐ │   │
//! │  │   │ lifecycle  │ │deduction │ │   money    │ │  validation   │ │   │
//! │  │   │ rule table │ │ per cycle│ │ 2-dp exact │ │     rules     │ │   │
//! │  │   └────────────┘ └──────────┘ └────────────┘ └───────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Driver, Invoice, InvoiceLine, ...)
//! - [`money`] - Exact 2-dp money over `rust_decimal`
//! - [`calculator`] - GST split of one line, totals of many
//! - [`breaks`] - Unpaid-break lines per vehicle class
//! - [`surcharges`] - Toll and fuel-levy lines, full line assembly
//! - [`numbering`] - Invoice numbers
//! - [`lifecycle`] - Invoice state machine and update rules
//! - [`deduction`] - Standing deduction arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output
//! 2. **No I/O**: the database lives in rcti-db
//! 3. **Exact Money**: decimal at two places, rounded half away from zero
//! 4. **Explicit Errors**: every rejection is a typed error naming its rule
//!
//! ## Example Usage
//!
//! ```rust
//! use rcti_core::calculator::compute_line_amounts;
//! use rcti_core::money::Money;
//! use rcti_core::types::{TaxMode, TaxStatus};
//! use rust_decimal::Decimal;
//!
//! // 8.5 hours at $85.00, GST on top
//! let amounts = compute_line_amounts(
//!     Decimal::new(85, 1),
//!     Money::from_cents(8500),
//!     TaxStatus::Registered,
//!     TaxMode::Exclusive,
//! );
//! assert_eq!(amounts.inc_tax.to_string(), "$794.75");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod breaks;
pub mod calculator;
pub mod deduction;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod numbering;
pub mod surcharges;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use deduction::{
    ApplyResult, DeductionApplication, DeductionFrequency, DeductionKind, DeductionStatus,
    DeductionUpdate, StandingDeduction,
};
pub use error::{CoreError, CoreResult, StateConflict, ValidationError};
pub use lifecycle::{InvoiceUpdate, MutationPlan};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

use rust_decimal::Decimal;

/// Australian GST, 10%.
pub const GST_RATE: TaxRate = TaxRate::from_bps(1000);

/// Longest payee, driver or deduction description text.
pub const MAX_NAME_LEN: usize = 200;

/// Longest vehicle class or line category label.
pub const MAX_CATEGORY_LEN: usize = 80;

/// A break can't exceed a full day.
pub const MAX_BREAK_HOURS_PER_SHIFT: Decimal = Decimal::from_parts(24, 0, 0, false, 0);

pub const MAX_LEVY_PERCENT: Decimal = Decimal::ONE_HUNDRED;
