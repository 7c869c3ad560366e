//! # Invoice Lifecycle
//!
//! The invoice state machine and the rule table that decides which fields
//! a generic update may touch in each state.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │    ┌─────────┐   finalise()   ┌───────────┐    pay()    ┌────────┐     │
//! │    │  Draft  │ ─────────────► │ Finalised │ ──────────► │  Paid  │     │
//! │    └─────────┘                └───────────┘             └────────┘     │
//! │      lines editable             deductions applied        terminal     │
//! │      tax settings editable      no way back to draft                   │
//! │      deletable                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Field Rules (generic update path)
//! ```text
//! field                     draft               finalised     paid
//! ───────────────────────── ─────────────────── ───────────── ─────────────
//! status = draft            no-op               deny          deny
//! status = finalised        deny (finalise)     deny          deny
//! status = paid             deny (pay)          deny (pay)    deny
//! tax status / tax mode     allow + recompute   deny          deny
//! payee / bank / notes      allow               allow         allow
//! ```
//!
//! Status transitions only happen through the dedicated operations, whose
//! guards live at the bottom of this module.

use serde::{Deserialize, Serialize};

use crate::error::StateConflict;
use crate::types::{Invoice, InvoiceStatus, TaxMode, TaxStatus};

// =============================================================================
// Fields & Rules
// =============================================================================

/// A field a generic update may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvoiceField {
    Status,
    TaxStatus,
    TaxMode,
    PayeeName,
    PayeeBusinessName,
    PayeeAddress,
    PayeeTaxId,
    BankAccountName,
    BankBsb,
    BankAccountNumber,
    Notes,
}

impl InvoiceField {
    pub const fn as_str(&self) -> &'static str {
        match self {
            InvoiceField::Status => "status",
            InvoiceField::TaxStatus => "tax status",
            InvoiceField::TaxMode => "tax mode",
            InvoiceField::PayeeName => "payee name",
            InvoiceField::PayeeBusinessName => "payee business name",
            InvoiceField::PayeeAddress => "payee address",
            InvoiceField::PayeeTaxId => "payee tax id",
            InvoiceField::BankAccountName => "bank account name",
            InvoiceField::BankBsb => "bank BSB",
            InvoiceField::BankAccountNumber => "bank account number",
            InvoiceField::Notes => "notes",
        }
    }
}

/// Outcome of looking a (state, field) pair up in the rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    /// Write the value.
    Allow,
    /// Write the value, then re-price every line and the totals.
    AllowAndRecompute,
    /// Refuse the whole update.
    Deny(StateConflict),
}

/// Rule for a non-status field in the given state.
///
/// Status changes are governed by [`status_rule`] instead.
pub fn field_rule(current: InvoiceStatus, field: InvoiceField) -> FieldRule {
    match field {
        InvoiceField::TaxStatus | InvoiceField::TaxMode => match current {
            InvoiceStatus::Draft => FieldRule::AllowAndRecompute,
            _ => FieldRule::Deny(StateConflict::TaxSettingsLocked {
                field: field.as_str(),
                current,
            }),
        },
        InvoiceField::Status => match current {
            InvoiceStatus::Paid => FieldRule::Deny(StateConflict::PaidIsImmutable),
            _ => FieldRule::Allow,
        },
        _ => FieldRule::Allow,
    }
}

/// Result of a status change requested through the generic update path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusRule {
    /// The invoice already has the requested status.
    NoOp,
    Deny(StateConflict),
}

/// Rule for `status = target` on an invoice currently in `current`.
///
/// The generic path can never move an invoice; the only accepted request is
/// `draft` on a draft.
pub fn status_rule(current: InvoiceStatus, target: InvoiceStatus) -> StatusRule {
    if current == InvoiceStatus::Paid {
        return StatusRule::Deny(StateConflict::PaidIsImmutable);
    }

    match target {
        InvoiceStatus::Finalised => StatusRule::Deny(StateConflict::FinaliseViaUpdate),
        InvoiceStatus::Paid => StatusRule::Deny(StateConflict::PayViaUpdate),
        InvoiceStatus::Draft => match current {
            InvoiceStatus::Draft => StatusRule::NoOp,
            other => StatusRule::Deny(StateConflict::NoReturnToDraft { current: other }),
        },
    }
}

// =============================================================================
// Update Request
// =============================================================================

/// A generic invoice update. `None` leaves a field untouched; an empty
/// string clears an optional text field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceUpdate {
    pub status: Option<InvoiceStatus>,
    pub tax_status: Option<TaxStatus>,
    pub tax_mode: Option<TaxMode>,
    pub payee_name: Option<String>,
    pub payee_business_name: Option<String>,
    pub payee_address: Option<String>,
    pub payee_tax_id: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_bsb: Option<String>,
    pub bank_account_number: Option<String>,
    pub notes: Option<String>,
}

impl InvoiceUpdate {
    /// Fields present in the request.
    pub fn fields(&self) -> Vec<InvoiceField> {
        let present = [
            (self.status.is_some(), InvoiceField::Status),
            (self.tax_status.is_some(), InvoiceField::TaxStatus),
            (self.tax_mode.is_some(), InvoiceField::TaxMode),
            (self.payee_name.is_some(), InvoiceField::PayeeName),
            (self.payee_business_name.is_some(), InvoiceField::PayeeBusinessName),
            (self.payee_address.is_some(), InvoiceField::PayeeAddress),
            (self.payee_tax_id.is_some(), InvoiceField::PayeeTaxId),
            (self.bank_account_name.is_some(), InvoiceField::BankAccountName),
            (self.bank_bsb.is_some(), InvoiceField::BankBsb),
            (self.bank_account_number.is_some(), InvoiceField::BankAccountNumber),
            (self.notes.is_some(), InvoiceField::Notes),
        ];
        present
            .into_iter()
            .filter_map(|(is_set, field)| is_set.then_some(field))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

/// What an accepted update will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPlan {
    /// Fields that will be written. A no-op status request is not listed.
    pub fields: Vec<InvoiceField>,
    /// Tax settings after the update.
    pub tax_status: TaxStatus,
    pub tax_mode: TaxMode,
    /// Every line and the totals must be re-priced.
    pub recompute_lines: bool,
}

impl MutationPlan {
    /// Nothing would be written.
    pub fn is_noop(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Validates a generic update against the invoice's current state.
///
/// The first rule that denies wins; nothing is written in that case. Outside
/// draft any tax setting is refused, even one equal to the current value. On
/// a draft an unchanged tax setting is dropped from the plan and does not
/// trigger a recompute.
pub fn validate_mutation(
    invoice: &Invoice,
    update: &InvoiceUpdate,
) -> Result<MutationPlan, StateConflict> {
    let current = invoice.status;

    if let Some(target) = update.status {
        if let StatusRule::Deny(conflict) = status_rule(current, target) {
            return Err(conflict);
        }
    }

    let tax_status_change = update.tax_status.filter(|s| *s != invoice.tax_status);
    let tax_mode_change = update.tax_mode.filter(|m| *m != invoice.tax_mode);
    let tax_locked = current != InvoiceStatus::Draft;

    let mut fields = Vec::new();
    let mut recompute_lines = false;

    for field in update.fields() {
        let changes = match field {
            InvoiceField::Status => false,
            InvoiceField::TaxStatus => tax_locked || tax_status_change.is_some(),
            InvoiceField::TaxMode => tax_locked || tax_mode_change.is_some(),
            _ => true,
        };
        if !changes {
            continue;
        }

        match field_rule(current, field) {
            FieldRule::Allow => fields.push(field),
            FieldRule::AllowAndRecompute => {
                recompute_lines = true;
                fields.push(field);
            }
            FieldRule::Deny(conflict) => return Err(conflict),
        }
    }

    Ok(MutationPlan {
        fields,
        tax_status: tax_status_change.unwrap_or(invoice.tax_status),
        tax_mode: tax_mode_change.unwrap_or(invoice.tax_mode),
        recompute_lines,
    })
}

// =============================================================================
// Dedicated Operation Guards
// =============================================================================

/// Requires a draft invoice for `operation`.
pub fn require_draft(operation: &'static str, current: InvoiceStatus) -> Result<(), StateConflict> {
    match current {
        InvoiceStatus::Draft => Ok(()),
        _ => Err(StateConflict::NotDraft { operation, current }),
    }
}

/// Finalise: draft → finalised.
pub fn check_finalise(current: InvoiceStatus) -> Result<(), StateConflict> {
    require_draft("finalise", current)
}

/// Pay: finalised → paid.
pub fn check_pay(current: InvoiceStatus) -> Result<(), StateConflict> {
    match current {
        InvoiceStatus::Finalised => Ok(()),
        InvoiceStatus::Paid => Err(StateConflict::PaidIsImmutable),
        InvoiceStatus::Draft => Err(StateConflict::NotFinalised {
            operation: "pay",
            current,
        }),
    }
}

/// Adding, removing or re-pricing a line.
pub fn check_line_edit(current: InvoiceStatus) -> Result<(), StateConflict> {
    require_draft("edit lines", current)
}

pub fn check_delete(current: InvoiceStatus) -> Result<(), StateConflict> {
    require_draft("delete", current)
}

/// Running the deduction ledger on its own needs a finalised invoice.
pub fn check_apply_deductions(current: InvoiceStatus) -> Result<(), StateConflict> {
    match current {
        InvoiceStatus::Finalised => Ok(()),
        _ => Err(StateConflict::NotFinalised {
            operation: "apply deductions",
            current,
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BankDetails, InvoiceTotals, PayeeSnapshot};
    use chrono::{NaiveDate, Utc};

    fn invoice(status: InvoiceStatus) -> Invoice {
        Invoice {
            id: "inv-1".to_string(),
            driver_id: "drv-1".to_string(),
            invoice_number: "RCTI-20240630-SMITH".to_string(),
            period_ending: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            payee: PayeeSnapshot {
                name: "Smith".to_string(),
                business_name: None,
                address: None,
                tax_id: None,
                bank: BankDetails::default(),
            },
            tax_status: TaxStatus::Registered,
            tax_mode: TaxMode::Exclusive,
            totals: InvoiceTotals::default(),
            status,
            paid_at: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn status_update(target: InvoiceStatus) -> InvoiceUpdate {
        InvoiceUpdate {
            status: Some(target),
            ..Default::default()
        }
    }

    #[test]
    fn test_status_table_is_exhaustive() {
        use InvoiceStatus::*;

        let expected = [
            (Draft, Draft, Ok(())),
            (Draft, Finalised, Err(StateConflict::FinaliseViaUpdate)),
            (Draft, Paid, Err(StateConflict::PayViaUpdate)),
            (Finalised, Draft, Err(StateConflict::NoReturnToDraft { current: Finalised })),
            (Finalised, Finalised, Err(StateConflict::FinaliseViaUpdate)),
            (Finalised, Paid, Err(StateConflict::PayViaUpdate)),
            (Paid, Draft, Err(StateConflict::PaidIsImmutable)),
            (Paid, Finalised, Err(StateConflict::PaidIsImmutable)),
            (Paid, Paid, Err(StateConflict::PaidIsImmutable)),
        ];

        for (current, target, outcome) in expected {
            let result = validate_mutation(&invoice(current), &status_update(target)).map(|_| ());
            assert_eq!(result, outcome, "{} -> {}", current, target);
        }
    }

    #[test]
    fn test_draft_to_draft_is_noop() {
        let plan = validate_mutation(&invoice(InvoiceStatus::Draft), &status_update(InvoiceStatus::Draft))
            .unwrap();
        assert!(plan.is_noop());
        assert!(!plan.recompute_lines);
    }

    #[test]
    fn test_tax_settings_recompute_in_draft() {
        let update = InvoiceUpdate {
            tax_mode: Some(TaxMode::Inclusive),
            ..Default::default()
        };
        let plan = validate_mutation(&invoice(InvoiceStatus::Draft), &update).unwrap();

        assert!(plan.recompute_lines);
        assert_eq!(plan.fields, vec![InvoiceField::TaxMode]);
        assert_eq!(plan.tax_mode, TaxMode::Inclusive);
        assert_eq!(plan.tax_status, TaxStatus::Registered);
    }

    #[test]
    fn test_tax_settings_locked_outside_draft() {
        for current in [InvoiceStatus::Finalised, InvoiceStatus::Paid] {
            let update = InvoiceUpdate {
                tax_status: Some(TaxStatus::NotRegistered),
                ..Default::default()
            };
            let err = validate_mutation(&invoice(current), &update).unwrap_err();
            assert_eq!(
                err,
                StateConflict::TaxSettingsLocked {
                    field: "tax status",
                    current
                }
            );
        }
    }

    #[test]
    fn test_unchanged_tax_setting_on_draft_is_not_a_change() {
        let update = InvoiceUpdate {
            tax_status: Some(TaxStatus::Registered),
            notes: Some("paid by EFT".to_string()),
            ..Default::default()
        };
        let plan = validate_mutation(&invoice(InvoiceStatus::Draft), &update).unwrap();
        assert_eq!(plan.fields, vec![InvoiceField::Notes]);
        assert!(!plan.recompute_lines);
    }

    #[test]
    fn test_same_value_tax_setting_rejected_outside_draft() {
        for current in [InvoiceStatus::Finalised, InvoiceStatus::Paid] {
            let status_only = InvoiceUpdate {
                tax_status: Some(TaxStatus::Registered),
                ..Default::default()
            };
            assert_eq!(
                validate_mutation(&invoice(current), &status_only),
                Err(StateConflict::TaxSettingsLocked {
                    field: "tax status",
                    current
                })
            );

            let mode_only = InvoiceUpdate {
                tax_mode: Some(TaxMode::Exclusive),
                notes: Some("paid by EFT".to_string()),
                ..Default::default()
            };
            assert_eq!(
                validate_mutation(&invoice(current), &mode_only),
                Err(StateConflict::TaxSettingsLocked {
                    field: "tax mode",
                    current
                })
            );
        }
    }

    #[test]
    fn test_payee_bank_and_notes_allowed_in_every_state() {
        let update = InvoiceUpdate {
            payee_name: Some("Smith Haulage".to_string()),
            bank_bsb: Some("063-000".to_string()),
            notes: Some("corrected BSB".to_string()),
            ..Default::default()
        };
        for current in InvoiceStatus::ALL {
            let plan = validate_mutation(&invoice(current), &update).unwrap();
            assert_eq!(
                plan.fields,
                vec![InvoiceField::PayeeName, InvoiceField::BankBsb, InvoiceField::Notes]
            );
        }
    }

    #[test]
    fn test_denied_status_blocks_allowed_fields() {
        let update = InvoiceUpdate {
            status: Some(InvoiceStatus::Paid),
            notes: Some("x".to_string()),
            ..Default::default()
        };
        assert_eq!(
            validate_mutation(&invoice(InvoiceStatus::Finalised), &update),
            Err(StateConflict::PayViaUpdate)
        );
    }

    #[test]
    fn test_field_rule_table() {
        assert_eq!(
            field_rule(InvoiceStatus::Draft, InvoiceField::TaxStatus),
            FieldRule::AllowAndRecompute
        );
        assert_eq!(field_rule(InvoiceStatus::Paid, InvoiceField::Notes), FieldRule::Allow);
        assert!(matches!(
            field_rule(InvoiceStatus::Paid, InvoiceField::Status),
            FieldRule::Deny(StateConflict::PaidIsImmutable)
        ));
    }

    #[test]
    fn test_update_fields_and_emptiness() {
        assert!(InvoiceUpdate::default().is_empty());
        let update = InvoiceUpdate {
            payee_tax_id: Some("51 824 753 556".to_string()),
            ..Default::default()
        };
        assert_eq!(update.fields(), vec![InvoiceField::PayeeTaxId]);
    }

    #[test]
    fn test_dedicated_operation_guards() {
        use InvoiceStatus::*;

        assert!(check_finalise(Draft).is_ok());
        assert_eq!(
            check_finalise(Finalised),
            Err(StateConflict::NotDraft {
                operation: "finalise",
                current: Finalised
            })
        );

        assert!(check_pay(Finalised).is_ok());
        assert!(matches!(check_pay(Draft), Err(StateConflict::NotFinalised { .. })));
        assert_eq!(check_pay(Paid), Err(StateConflict::PaidIsImmutable));

        assert!(check_line_edit(Draft).is_ok());
        assert!(check_line_edit(Paid).is_err());
        assert!(check_delete(Draft).is_ok());
        assert!(check_delete(Finalised).is_err());

        assert!(check_apply_deductions(Finalised).is_ok());
        assert_eq!(
            check_apply_deductions(Draft),
            Err(StateConflict::NotFinalised {
                operation: "apply deductions",
                current: Draft
            })
        );
        assert!(check_apply_deductions(Paid).is_err());
    }
}
