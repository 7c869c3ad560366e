//! # Standing Deductions
//!
//! Recurring charges (deductions) and credits (reimbursements) taken from
//! a driver's invoices one cycle at a time until the total is exhausted.
//!
//! This module holds the arithmetic only. Selecting candidates and writing
//! the compare-and-swap lives in the store layer's ledger.
//!
//! ```text
//! total 1000.00, per cycle 150.00
//!
//!   cycle   apply    paid     remaining   status
//!   ─────   ──────   ───────  ─────────   ─────────
//!     1     150.00    150.00     850.00   active
//!     …
//!     6     150.00    900.00     100.00   active
//!     7     100.00   1000.00       0.00   completed
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{StateConflict, ValidationError};
use crate::money::Money;

// =============================================================================
// Enums
// =============================================================================

/// Direction of a standing deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DeductionKind {
    /// Withheld from the driver (e.g. vehicle lease).
    Deduction,
    /// Paid back to the driver (e.g. equipment refund).
    Reimbursement,
}

impl DeductionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeductionKind::Deduction => "deduction",
            DeductionKind::Reimbursement => "reimbursement",
        }
    }
}

impl fmt::Display for DeductionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeductionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deduction" => Ok(DeductionKind::Deduction),
            "reimbursement" => Ok(DeductionKind::Reimbursement),
            _ => Err(ValidationError::not_allowed(
                "deduction kind",
                &["deduction", "reimbursement"],
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DeductionFrequency {
    #[default]
    Weekly,
    Fortnightly,
    Monthly,
}

impl DeductionFrequency {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeductionFrequency::Weekly => "weekly",
            DeductionFrequency::Fortnightly => "fortnightly",
            DeductionFrequency::Monthly => "monthly",
        }
    }
}

impl FromStr for DeductionFrequency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(DeductionFrequency::Weekly),
            "fortnightly" => Ok(DeductionFrequency::Fortnightly),
            "monthly" => Ok(DeductionFrequency::Monthly),
            _ => Err(ValidationError::not_allowed(
                "frequency",
                &["weekly", "fortnightly", "monthly"],
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DeductionStatus {
    #[default]
    Active,
    Completed,
}

impl DeductionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeductionStatus::Active => "active",
            DeductionStatus::Completed => "completed",
        }
    }
}

impl FromStr for DeductionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(DeductionStatus::Active),
            "completed" => Ok(DeductionStatus::Completed),
            _ => Err(ValidationError::not_allowed("status", &["active", "completed"])),
        }
    }
}

// =============================================================================
// Standing Deduction
// =============================================================================

/// A recurring deduction or reimbursement owed by or to a driver.
///
/// `amount_remaining` is always `total_amount - amount_paid` and never
/// negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingDeduction {
    pub id: String,
    pub driver_id: String,
    pub kind: DeductionKind,
    pub description: String,
    pub total_amount: Money,
    pub amount_paid: Money,
    pub amount_remaining: Money,
    pub amount_per_cycle: Money,
    pub frequency: DeductionFrequency,
    pub start_date: NaiveDate,
    pub status: DeductionStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StandingDeduction {
    /// Creates an active deduction with nothing paid yet.
    pub fn new(
        driver_id: impl Into<String>,
        kind: DeductionKind,
        description: impl Into<String>,
        total_amount: Money,
        amount_per_cycle: Money,
        start_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        StandingDeduction {
            id: Uuid::new_v4().to_string(),
            driver_id: driver_id.into(),
            kind,
            description: description.into(),
            total_amount,
            amount_paid: Money::ZERO,
            amount_remaining: total_amount,
            amount_per_cycle,
            frequency: DeductionFrequency::default(),
            start_date,
            status: DeductionStatus::Active,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active and already started by the invoice's period end.
    pub fn is_eligible(&self, period_ending: NaiveDate) -> bool {
        self.status == DeductionStatus::Active && self.start_date <= period_ending
    }

    /// `min(remaining, per cycle)`; zero or less means nothing to apply.
    pub fn amount_to_apply(&self) -> Money {
        self.amount_remaining.min(self.amount_per_cycle)
    }

    /// The state this deduction moves to after `applied` is charged.
    pub fn after_application(&self, applied: Money, at: DateTime<Utc>) -> AppliedState {
        let remaining = self.amount_remaining - applied;
        let completed = !remaining.is_positive();
        AppliedState {
            amount_paid: self.amount_paid + applied,
            amount_remaining: if completed { Money::ZERO } else { remaining },
            status: if completed {
                DeductionStatus::Completed
            } else {
                DeductionStatus::Active
            },
            completed_at: completed.then_some(at),
        }
    }
}

/// Paid / remaining / status after one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedState {
    pub amount_paid: Money,
    pub amount_remaining: Money,
    pub status: DeductionStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One charge of a standing deduction against one invoice. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionApplication {
    pub id: String,
    pub deduction_id: String,
    pub invoice_id: String,
    pub applied_amount: Money,
    pub applied_at: DateTime<Utc>,
}

impl DeductionApplication {
    pub fn new(
        deduction_id: impl Into<String>,
        invoice_id: impl Into<String>,
        applied_amount: Money,
        applied_at: DateTime<Utc>,
    ) -> Self {
        DeductionApplication {
            id: Uuid::new_v4().to_string(),
            deduction_id: deduction_id.into(),
            invoice_id: invoice_id.into(),
            applied_amount,
            applied_at,
        }
    }
}

// =============================================================================
// Apply Summary
// =============================================================================

/// What one ledger run applied to an invoice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub applied_count: u32,
    pub total_deduction_amount: Money,
    pub total_reimbursement_amount: Money,
}

impl ApplyResult {
    /// Counts one successful application.
    pub fn record(&mut self, kind: DeductionKind, amount: Money) {
        self.applied_count += 1;
        match kind {
            DeductionKind::Deduction => self.total_deduction_amount += amount,
            DeductionKind::Reimbursement => self.total_reimbursement_amount += amount,
        }
    }

    /// Reimbursements minus deductions: what the ledger adds to the payout.
    pub fn net_adjustment(&self) -> Money {
        self.total_reimbursement_amount - self.total_deduction_amount
    }
}

// =============================================================================
// Amendment
// =============================================================================

/// An administrative edit of a standing deduction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionUpdate {
    pub description: Option<String>,
    pub amount_per_cycle: Option<Money>,
    pub total_amount: Option<Money>,
    pub status: Option<DeductionStatus>,
}

impl DeductionUpdate {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.amount_per_cycle.is_none()
            && self.total_amount.is_none()
            && self.status.is_none()
    }
}

/// Applies `update` to `current`, given how many applications exist.
///
/// The total is frozen once the deduction has been charged at least once.
/// Otherwise the remaining balance is re-derived as `total - paid`, and a
/// deduction whose balance reaches zero is completed.
pub fn plan_amendment(
    current: &StandingDeduction,
    update: &DeductionUpdate,
    application_count: i64,
    now: DateTime<Utc>,
) -> Result<StandingDeduction, StateConflict> {
    let mut next = current.clone();

    if let Some(total) = update.total_amount {
        if total != current.total_amount {
            if application_count > 0 {
                return Err(StateConflict::DeductionTotalLocked {
                    applications: application_count,
                });
            }
            next.total_amount = total;
            next.amount_remaining = (total - next.amount_paid).max(Money::ZERO);
        }
    }

    if let Some(description) = &update.description {
        next.description = description.clone();
    }
    if let Some(per_cycle) = update.amount_per_cycle {
        next.amount_per_cycle = per_cycle;
    }
    if let Some(status) = update.status {
        next.status = status;
    }

    if next.amount_remaining.is_zero() {
        next.status = DeductionStatus::Completed;
    }
    next.completed_at = match next.status {
        DeductionStatus::Completed => current.completed_at.or(Some(now)),
        DeductionStatus::Active => None,
    };
    next.updated_at = now;

    Ok(next)
}

// =============================================================================
// Unit Tests
// =============================================================================
