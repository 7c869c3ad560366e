//! # Deduction Ledger
//!
//! Applies a driver's standing deductions and reimbursements to a finalised
//! invoice, at most once per (deduction, invoice) pair, without locks.
//!
//! ## Apply Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 apply_in_tx(invoice, driver, period_ending)            │
//! │                                                                         │
//! │  1. fetch_candidates   active, start_date <= period_ending,            │
//! │                        no application for this invoice yet             │
//! │                                                                         │
//! │  2. for each candidate, independently:                                 │
//! │        amount = min(remaining, per_cycle)      ≤ 0 → skip              │
//! │        compare_and_apply(expected = remaining as read in 1)            │
//! │          ├── 1 row → insert DeductionApplication, count it             │
//! │          └── 0 rows → lost race, skip (debug log, not an error)        │
//! │                                                                         │
//! │  3. ApplyResult { applied_count, total_deduction, total_reimbursement }│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on the caller's connection. Finalisation calls
//! [`apply_in_tx`] inside its own transaction so the status change and
//! every application commit together.

use chrono::{DateTime, NaiveDate, Utc};
use rcti_core::deduction::plan_amendment;
use rcti_core::lifecycle::check_apply_deductions;
use rcti_core::validation::{validate_deduction_amounts, validate_description, validate_positive_amount};
use rcti_core::{
    ApplyResult, DeductionApplication, DeductionUpdate, InvoiceStatus, StandingDeduction,
    StateConflict, ValidationError,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbResult, RctiError, RctiResult};
use crate::repository::deduction as deductions;
use crate::repository::driver::fetch_driver;
use crate::repository::invoice as invoices;

// =============================================================================
// Connection-Level Apply
// =============================================================================

/// Result of trying to charge one deduction against one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(DeductionApplication),
    /// The balance changed after selection; another invocation charged it.
    LostRace,
    /// Nothing left to charge.
    NothingToApply,
}

/// Charges one cycle of `deduction` against `invoice_id`.
///
/// `deduction` is the row as read at selection time; its
/// `amount_remaining` is the value the compare-and-swap expects.
pub async fn try_apply(
    conn: &mut SqliteConnection,
    deduction: &StandingDeduction,
    invoice_id: &str,
    now: DateTime<Utc>,
) -> DbResult<ApplyOutcome> {
    let amount = deduction.amount_to_apply();
    if !amount.is_positive() {
        return Ok(ApplyOutcome::NothingToApply);
    }

    let next = deduction.after_application(amount, now);
    let rows = deductions::compare_and_apply(
        conn,
        &deduction.id,
        deduction.amount_remaining,
        &next,
        now,
    )
    .await?;

    if rows == 0 {
        debug!(
            deduction_id = %deduction.id,
            invoice_id = %invoice_id,
            expected_remaining = %deduction.amount_remaining,
            "Deduction balance moved since selection; skipping"
        );
        return Ok(ApplyOutcome::LostRace);
    }

    let application = DeductionApplication::new(&deduction.id, invoice_id, amount, now);
    deductions::insert_application(conn, &application).await?;

    debug!(
        deduction_id = %deduction.id,
        invoice_id = %invoice_id,
        amount = %amount,
        remaining = %next.amount_remaining,
        status = next.status.as_str(),
        "Deduction applied"
    );

    Ok(ApplyOutcome::Applied(application))
}

/// Selects and applies every eligible deduction of `driver_id` to
/// `invoice_id` on the given connection.
pub async fn apply_in_tx(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    driver_id: &str,
    period_ending: NaiveDate,
) -> DbResult<ApplyResult> {
    let candidates =
        deductions::fetch_candidates(conn, driver_id, invoice_id, period_ending).await?;
    let now = Utc::now();
    let mut result = ApplyResult::default();

    for deduction in candidates.iter().filter(|d| d.is_eligible(period_ending)) {
        if let ApplyOutcome::Applied(application) =
            try_apply(conn, deduction, invoice_id, now).await?
        {
            result.record(deduction.kind, application.applied_amount);
        }
    }

    Ok(result)
}

// =============================================================================
// Ledger Service
// =============================================================================

/// Standing-deduction operations that own their unit of work.
#[derive(Debug, Clone)]
pub struct DeductionLedger {
    pool: SqlitePool,
}

impl DeductionLedger {
    pub fn new(pool: SqlitePool) -> Self {
        DeductionLedger { pool }
    }

    /// Applies standing deductions to an already finalised invoice.
    ///
    /// Finalisation runs this automatically; calling it again for the same
    /// invoice applies only deductions that became eligible since.
    pub async fn apply_standing_deductions(
        &self,
        invoice_id: &str,
        driver_id: &str,
        period_ending: NaiveDate,
    ) -> RctiResult<ApplyResult> {
        let mut tx = self.pool.begin().await?;

        // Opening write: serialises concurrent runs for this invoice.
        let touched = invoices::touch_if_status(&mut tx, invoice_id, InvoiceStatus::Finalised).await?;
        let invoice = invoices::fetch_invoice(&mut tx, invoice_id)
            .await?
            .ok_or_else(|| RctiError::not_found("Invoice", invoice_id))?;
        if touched == 0 {
            check_apply_deductions(invoice.status)?;
            return Err(StateConflict::StatusChanged {
                expected: InvoiceStatus::Finalised,
            }
            .into());
        }
        if invoice.driver_id != driver_id {
            return Err(ValidationError::InvalidFormat {
                field: "driver id".to_string(),
                reason: format!("invoice {} belongs to another driver", invoice_id),
            }
            .into());
        }

        let result = apply_in_tx(&mut tx, invoice_id, driver_id, period_ending).await?;
        tx.commit().await?;

        info!(
            invoice_id = %invoice_id,
            applied = result.applied_count,
            deductions = %result.total_deduction_amount,
            reimbursements = %result.total_reimbursement_amount,
            "Standing deductions applied"
        );

        Ok(result)
    }

    /// Validates and stores a new standing deduction.
    pub async fn create_deduction(
        &self,
        deduction: StandingDeduction,
    ) -> RctiResult<StandingDeduction> {
        validate_description(&deduction.description)?;
        validate_deduction_amounts(deduction.total_amount, deduction.amount_per_cycle)?;

        let mut conn = self.pool.acquire().await?;
        if fetch_driver(&mut conn, &deduction.driver_id).await?.is_none() {
            return Err(RctiError::not_found("Driver", &deduction.driver_id));
        }
        deductions::insert_deduction(&mut conn, &deduction).await?;

        info!(
            deduction_id = %deduction.id,
            driver_id = %deduction.driver_id,
            kind = %deduction.kind,
            total = %deduction.total_amount,
            per_cycle = %deduction.amount_per_cycle,
            "Standing deduction created"
        );

        Ok(deduction)
    }

    /// Amends description, per-cycle amount, total or status.
    ///
    /// The write is conditional on `amount_paid` as read here, so an
    /// application landing in between surfaces as
    /// [`StateConflict::DeductionChanged`] instead of being overwritten.
    pub async fn amend_deduction(
        &self,
        id: &str,
        update: DeductionUpdate,
    ) -> RctiResult<StandingDeduction> {
        if update.is_empty() {
            return Err(ValidationError::EmptyUpdate.into());
        }
        if let Some(description) = &update.description {
            validate_description(description)?;
        }
        if let Some(per_cycle) = update.amount_per_cycle {
            validate_positive_amount("amount per cycle", per_cycle)?;
        }
        if let Some(total) = update.total_amount {
            validate_positive_amount("total amount", total)?;
        }

        let mut conn = self.pool.acquire().await?;
        let current = deductions::fetch_deduction(&mut conn, id)
            .await?
            .ok_or_else(|| RctiError::not_found("Deduction", id))?;
        let applications = deductions::count_applications(&mut conn, id).await?;

        let next = plan_amendment(&current, &update, applications, Utc::now())?;
        let rows = deductions::update_amended(&mut conn, &next, current.amount_paid).await?;
        if rows == 0 {
            return Err(StateConflict::DeductionChanged { id: id.to_string() }.into());
        }

        info!(
            deduction_id = %id,
            total = %next.total_amount,
            remaining = %next.amount_remaining,
            status = next.status.as_str(),
            "Standing deduction amended"
        );

        Ok(next)
    }
}

// =============================================================================
// Tests
// =============================================================================
