//! # Error Types
//!
//! Domain-specific error types for rcti-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  rcti-core errors (this file)                                          │
//! │  ├── CoreError        - Wraps the two below                            │
//! │  ├── ValidationError  - Malformed / out-of-range input                 │
//! │  └── StateConflict    - A lifecycle or ledger rule blocked a mutation  │
//! │                                                                         │
//! │  rcti-db errors (separate crate)                                       │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── RctiError        - What callers of the service see               │
//! │                                                                         │
//! │  Flow: ValidationError / StateConflict → RctiError → caller            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A lost optimistic-concurrency race in the deduction ledger is NOT an
//! error: another writer's success is the correct outcome, so it never
//! appears in this hierarchy.

use thiserror::Error;

use crate::types::InvoiceStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A lifecycle or ledger rule rejected the mutation.
    #[error("State conflict: {0}")]
    StateConflict(#[from] StateConflict),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any computation runs; nothing has been written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: String,
        min: String,
        max: String,
    },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or greater.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, unparseable decimal).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set (e.g., unknown tax status).
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// A mutation request carried no fields.
    #[error("update request contains no changes")]
    EmptyUpdate,
}

impl ValidationError {
    /// Creates a NotAllowed error for an enum-like text field.
    pub fn not_allowed(field: impl Into<String>, allowed: &[&str]) -> Self {
        ValidationError::NotAllowed {
            field: field.into(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// =============================================================================
// State Conflict
// =============================================================================

/// A mutation was refused because of the current state of the record.
///
/// Every variant names the rule that fired so callers can explain it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateConflict {
    /// `status = finalised` was requested through the generic update path.
    #[error("status cannot be set to finalised by an update; use the finalise operation")]
    FinaliseViaUpdate,

    /// `status = paid` was requested through the generic update path.
    #[error("status cannot be set to paid by an update; use the pay operation")]
    PayViaUpdate,

    /// Any status change on a paid invoice, including re-setting paid.
    #[error("invoice is paid; its status can no longer change")]
    PaidIsImmutable,

    /// Finalised invoices never return to draft.
    #[error("invoice is {current}; it cannot return to draft")]
    NoReturnToDraft { current: InvoiceStatus },

    /// Tax status / tax mode edits are only possible on drafts.
    #[error("{field} can only change while the invoice is draft (currently {current})")]
    TaxSettingsLocked {
        field: &'static str,
        current: InvoiceStatus,
    },

    /// A dedicated operation that requires a draft invoice.
    #[error("cannot {operation}: invoice is {current}, expected draft")]
    NotDraft {
        operation: &'static str,
        current: InvoiceStatus,
    },

    /// A dedicated operation that requires a finalised invoice.
    #[error("cannot {operation}: invoice is {current}, expected finalised")]
    NotFinalised {
        operation: &'static str,
        current: InvoiceStatus,
    },

    /// The status read before a conditional write changed underneath it.
    #[error("invoice status changed concurrently (expected {expected})")]
    StatusChanged { expected: InvoiceStatus },

    /// The total of a deduction that has already been charged cannot change.
    #[error("deduction total is locked: {applications} application(s) already recorded")]
    DeductionTotalLocked { applications: i64 },

    /// A deduction was charged between reading it and writing an amendment.
    #[error("deduction {id} changed concurrently; reload and retry")]
    DeductionChanged { id: String },

    /// The line does not belong to the invoice it was addressed through.
    #[error("line {line_id} does not belong to invoice {invoice_id}")]
    LineNotOnInvoice { line_id: String, invoice_id: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "payee name".to_string(),
        };
        assert_eq!(err.to_string(), "payee name is required");

        let err = ValidationError::OutOfRange {
            field: "fuel levy".to_string(),
            min: "0".to_string(),
            max: "100".to_string(),
        };
        assert_eq!(err.to_string(), "fuel levy must be between 0 and 100");
    }

    #[test]
    fn test_state_conflict_messages_name_the_rule() {
        let err = StateConflict::TaxSettingsLocked {
            field: "tax mode",
            current: InvoiceStatus::Finalised,
        };
        assert_eq!(
            err.to_string(),
            "tax mode can only change while the invoice is draft (currently finalised)"
        );

        let err = StateConflict::DeductionTotalLocked { applications: 2 };
        assert!(err.to_string().contains("2 application(s)"));
    }

    #[test]
    fn test_conversions_into_core_error() {
        let core_err: CoreError = ValidationError::EmptyUpdate.into();
        assert!(matches!(core_err, CoreError::Validation(_)));

        let core_err: CoreError = StateConflict::PaidIsImmutable.into();
        assert!(matches!(core_err, CoreError::StateConflict(_)));
    }
}
