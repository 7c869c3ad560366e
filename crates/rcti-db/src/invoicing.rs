//! # Invoice Service
//!
//! Creates invoices from unbilled records and drives them through the
//! lifecycle. Every operation is one unit of work: it commits completely
//! or not at all.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  create_invoice ──► Draft ──finalise_invoice──► Finalised ──pay──► Paid│
//! │                       │                            │                    │
//! │     add_manual_line   │                            └─ deductions       │
//! │     remove_line       │                               applied in the   │
//! │     reprice_line      │                               same transaction │
//! │     update_invoice    │                                                 │
//! │     delete_invoice ───┘ (records released)                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write-First Transactions
//! Each transaction that depends on invoice state opens with the
//! conditional write itself (`... WHERE status = 'draft'`). SQLite then
//! holds the write lock for the rest of the unit of work, so concurrent
//! callers queue on the busy timeout and always read committed state.
//! Zero affected rows means the guard failed; the invoice is re-read only
//! to name the rule that fired.

use chrono::{NaiveDate, Utc};
use rcti_core::calculator::{compute_line_amounts, compute_totals, recompute_line};
use rcti_core::lifecycle::{
    check_delete, check_finalise, check_line_edit, check_pay, validate_mutation,
};
use rcti_core::numbering::{base_invoice_number, generate_invoice_number};
use rcti_core::surcharges::build_invoice_lines;
use rcti_core::validation::{
    validate_billing_settings, validate_bsb, validate_category, validate_payee_name,
    validate_toll_trips, validate_units, validate_vehicle_class,
};
use rcti_core::{
    ApplyResult, BillableRecord, Driver, Invoice, InvoiceLine, InvoiceStatus, InvoiceTotals,
    InvoiceUpdate, LineDraft, LineKind, Money, StateConflict, TaxMode, TaxStatus, ValidationError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult, RctiError, RctiResult};
use crate::ledger;
use crate::repository::blank_to_none;
use crate::repository::driver::{self as drivers, DriverRepository};
use crate::repository::invoice as invoices;

/// Default number of invoice-number generations before giving up.
pub const DEFAULT_MAX_NUMBER_ATTEMPTS: u32 = 5;

// =============================================================================
// Results
// =============================================================================

/// An invoice together with its lines in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLine>,
}

/// What finalisation did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinaliseOutcome {
    pub invoice: Invoice,
    pub deductions: ApplyResult,
}

/// A line entered by hand on a draft invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualLine {
    pub line_date: NaiveDate,
    pub category: String,
    pub units: Decimal,
    pub rate: Money,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug, Clone)]
pub struct InvoiceService {
    pool: SqlitePool,
    max_number_attempts: u32,
}

impl InvoiceService {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceService {
            pool,
            max_number_attempts: DEFAULT_MAX_NUMBER_ATTEMPTS,
        }
    }

    /// Overrides how many times a clashing invoice number is regenerated.
    pub fn with_max_number_attempts(mut self, attempts: u32) -> Self {
        self.max_number_attempts = attempts.max(1);
        self
    }

    // -------------------------------------------------------------------------
    // Drivers & Records
    // -------------------------------------------------------------------------

    /// Validates and stores a driver.
    pub async fn register_driver(&self, driver: Driver) -> RctiResult<Driver> {
        validate_payee_name(&driver.name)?;
        if let Some(bsb) = &driver.bank.bsb {
            validate_bsb(bsb)?;
        }
        validate_billing_settings(&driver.billing)?;

        DriverRepository::new(self.pool.clone()).insert(&driver).await?;
        info!(driver_id = %driver.id, name = %driver.name, "Driver registered");
        Ok(driver)
    }

    /// Validates and stores an unbilled record for an existing driver.
    pub async fn add_billable_record(&self, record: BillableRecord) -> RctiResult<BillableRecord> {
        validate_vehicle_class(&record.vehicle_class)?;
        validate_units(record.hours)?;
        validate_toll_trips(&record.toll_trips)?;

        let repo = DriverRepository::new(self.pool.clone());
        if repo.get_by_id(&record.driver_id).await?.is_none() {
            return Err(RctiError::not_found("Driver", &record.driver_id));
        }
        repo.insert_record(&record).await?;
        Ok(record)
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    /// Invoices every unbilled record of `driver_id` up to `period_ending`.
    ///
    /// Lines come out ordinary first, then break, toll and fuel-levy lines.
    /// The number is generated against the numbers already taken; if another
    /// writer takes it first, it is regenerated against a fresh set.
    pub async fn create_invoice(
        &self,
        driver_id: &str,
        period_ending: NaiveDate,
    ) -> RctiResult<InvoiceDetail> {
        let driver = {
            let mut conn = self.pool.acquire().await?;
            drivers::fetch_driver(&mut conn, driver_id)
                .await?
                .ok_or_else(|| RctiError::not_found("Driver", driver_id))?
        };
        let payee_name = driver.snapshot().display_name().to_string();
        let prefix = base_invoice_number(period_ending, &payee_name);

        let mut attempt = 0;
        loop {
            attempt += 1;

            let taken = {
                let mut conn = self.pool.acquire().await?;
                invoices::numbers_with_prefix(&mut conn, &prefix).await?
            };
            let number = generate_invoice_number(&taken, period_ending, &payee_name);

            match self.insert_draft(&driver, &number, period_ending).await {
                Ok(detail) => {
                    info!(
                        invoice_id = %detail.invoice.id,
                        invoice_number = %number,
                        driver_id = %driver_id,
                        lines = detail.lines.len(),
                        total = %detail.invoice.totals.total,
                        "Invoice created"
                    );
                    return Ok(detail);
                }
                Err(RctiError::Persistence(err))
                    if err.is_unique_violation_on("invoice_number")
                        && attempt < self.max_number_attempts =>
                {
                    warn!(invoice_number = %number, attempt, "Invoice number taken; regenerating");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn insert_draft(
        &self,
        driver: &Driver,
        number: &str,
        period_ending: NaiveDate,
    ) -> RctiResult<InvoiceDetail> {
        let mut invoice = Invoice::draft(driver, number, period_ending);

        let mut tx = self.pool.begin().await?;
        invoices::insert_invoice(&mut tx, &invoice).await?;

        let records = drivers::fetch_unbilled_records(&mut tx, &driver.id, period_ending).await?;
        let lines: Vec<InvoiceLine> = build_invoice_lines(&driver.billing, &records, period_ending)
            .into_iter()
            .map(|draft| InvoiceLine::from_draft(&invoice.id, draft))
            .collect();

        for (position, line) in lines.iter().enumerate() {
            invoices::insert_line(&mut tx, line, position as i64).await?;
        }

        let record_ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let billed = drivers::mark_records_billed(&mut tx, &invoice.id, &record_ids).await?;
        if billed != record_ids.len() as u64 {
            return Err(DbError::TransactionFailed(format!(
                "{} of {} records were billed by another invoice",
                record_ids.len() as u64 - billed,
                record_ids.len()
            ))
            .into());
        }

        invoice.totals = compute_totals(&lines);
        invoices::update_totals(&mut tx, &invoice.id, &invoice.totals).await?;
        tx.commit().await?;

        Ok(InvoiceDetail { invoice, lines })
    }

    // -------------------------------------------------------------------------
    // Read
    // -------------------------------------------------------------------------

    pub async fn get_invoice(&self, id: &str) -> RctiResult<InvoiceDetail> {
        let mut conn = self.pool.acquire().await?;
        let invoice = invoices::fetch_invoice(&mut conn, id)
            .await?
            .ok_or_else(|| RctiError::not_found("Invoice", id))?;
        let lines = invoices::fetch_lines(&mut conn, id).await?;
        Ok(InvoiceDetail { invoice, lines })
    }

    // -------------------------------------------------------------------------
    // Generic Update
    // -------------------------------------------------------------------------

    /// Applies a generic update after checking it against the lifecycle
    /// rules. A tax-setting change re-prices every line and the totals.
    pub async fn update_invoice(&self, id: &str, update: InvoiceUpdate) -> RctiResult<InvoiceDetail> {
        if update.is_empty() {
            return Err(ValidationError::EmptyUpdate.into());
        }
        if let Some(name) = &update.payee_name {
            validate_payee_name(name)?;
        }
        if let Some(bsb) = &update.bank_bsb {
            validate_bsb(bsb)?;
        }

        // Lock the row before reading it.
        let mut tx = self.pool.begin().await?;
        if invoices::touch(&mut tx, id).await? == 0 {
            return Err(RctiError::not_found("Invoice", id));
        }
        let current = invoices::fetch_invoice(&mut tx, id)
            .await?
            .ok_or_else(|| RctiError::not_found("Invoice", id))?;

        let plan = validate_mutation(&current, &update)?;
        if plan.is_noop() {
            tx.rollback().await?;
            return self.get_invoice(id).await;
        }

        let next = apply_update(&current, &update, plan.tax_status, plan.tax_mode);
        if invoices::update_details(&mut tx, &next, &current).await? == 0 {
            return Err(StateConflict::StatusChanged {
                expected: current.status,
            }
            .into());
        }

        if plan.recompute_lines {
            let lines = invoices::fetch_lines(&mut tx, id).await?;
            for line in &lines {
                let repriced = recompute_line(line, next.tax_status, next.tax_mode);
                invoices::update_line_pricing(&mut tx, &repriced).await?;
            }
            let (_, totals) = refresh_totals(&mut tx, id).await?;
            tx.commit().await?;

            info!(
                invoice_id = %id,
                tax_status = next.tax_status.as_str(),
                tax_mode = next.tax_mode.as_str(),
                lines = lines.len(),
                total = %totals.total,
                "Invoice re-priced"
            );
        } else {
            tx.commit().await?;
        }

        debug!(invoice_id = %id, fields = ?plan.fields, "Invoice updated");
        self.get_invoice(id).await
    }

    // -------------------------------------------------------------------------
    // Lifecycle Operations
    // -------------------------------------------------------------------------

    /// Draft → finalised, applying standing deductions in the same
    /// transaction.
    pub async fn finalise_invoice(&self, id: &str) -> RctiResult<FinaliseOutcome> {
        let mut tx = self.pool.begin().await?;

        let rows = invoices::transition_status(
            &mut tx,
            id,
            InvoiceStatus::Draft,
            InvoiceStatus::Finalised,
            None,
        )
        .await?;
        if rows == 0 {
            let current = invoices::fetch_invoice(&mut tx, id)
                .await?
                .ok_or_else(|| RctiError::not_found("Invoice", id))?;
            check_finalise(current.status)?;
            return Err(StateConflict::StatusChanged {
                expected: InvoiceStatus::Draft,
            }
            .into());
        }

        let invoice = invoices::fetch_invoice(&mut tx, id)
            .await?
            .ok_or_else(|| RctiError::not_found("Invoice", id))?;
        let deductions =
            ledger::apply_in_tx(&mut tx, &invoice.id, &invoice.driver_id, invoice.period_ending)
                .await?;
        tx.commit().await?;

        info!(
            invoice_id = %id,
            invoice_number = %invoice.invoice_number,
            applied = deductions.applied_count,
            deductions = %deductions.total_deduction_amount,
            reimbursements = %deductions.total_reimbursement_amount,
            "Invoice finalised"
        );

        Ok(FinaliseOutcome { invoice, deductions })
    }

    /// Finalised → paid, stamping `paid_at`.
    pub async fn pay_invoice(&self, id: &str) -> RctiResult<Invoice> {
        let mut conn = self.pool.acquire().await?;

        let rows = invoices::transition_status(
            &mut conn,
            id,
            InvoiceStatus::Finalised,
            InvoiceStatus::Paid,
            Some(Utc::now()),
        )
        .await?;

        let invoice = invoices::fetch_invoice(&mut conn, id)
            .await?
            .ok_or_else(|| RctiError::not_found("Invoice", id))?;
        if rows == 0 {
            check_pay(invoice.status)?;
            return Err(StateConflict::StatusChanged {
                expected: InvoiceStatus::Finalised,
            }
            .into());
        }

        info!(invoice_id = %id, total = %invoice.totals.total, "Invoice paid");
        Ok(invoice)
    }

    /// Deletes a draft and its lines; its records become unbilled again.
    pub async fn delete_invoice(&self, id: &str) -> RctiResult<()> {
        let mut tx = self.pool.begin().await?;

        let released = drivers::release_records_of_draft(&mut tx, id).await?;
        if invoices::delete_draft(&mut tx, id).await? == 0 {
            let current = invoices::fetch_invoice(&mut tx, id)
                .await?
                .ok_or_else(|| RctiError::not_found("Invoice", id))?;
            check_delete(current.status)?;
            return Err(StateConflict::StatusChanged {
                expected: InvoiceStatus::Draft,
            }
            .into());
        }
        tx.commit().await?;

        info!(invoice_id = %id, released_records = released, "Draft invoice deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Line Editing (draft only)
    // -------------------------------------------------------------------------

    pub async fn add_manual_line(&self, invoice_id: &str, line: ManualLine) -> RctiResult<InvoiceDetail> {
        validate_category(&line.category)?;
        validate_units(line.units)?;

        let mut tx = self.pool.begin().await?;
        let mut invoice = open_draft_for_edit(&mut tx, invoice_id).await?;

        let draft = LineDraft {
            source_record_id: None,
            line_date: line.line_date,
            kind: LineKind::Manual,
            category: line.category.trim().to_string(),
            units: line.units,
            rate: line.rate,
            amounts: compute_line_amounts(line.units, line.rate, invoice.tax_status, invoice.tax_mode),
        };
        let line = InvoiceLine::from_draft(invoice_id, draft);
        let position = invoices::next_position(&mut tx, invoice_id).await?;
        invoices::insert_line(&mut tx, &line, position).await?;

        let (lines, totals) = refresh_totals(&mut tx, invoice_id).await?;
        tx.commit().await?;

        debug!(invoice_id = %invoice_id, line_id = %line.id, "Manual line added");
        invoice.totals = totals;
        Ok(InvoiceDetail { invoice, lines })
    }

    /// Removes a line. A line priced from a billable record releases it.
    pub async fn remove_line(&self, invoice_id: &str, line_id: &str) -> RctiResult<InvoiceDetail> {
        let mut tx = self.pool.begin().await?;
        let mut invoice = open_draft_for_edit(&mut tx, invoice_id).await?;
        let line = line_on_invoice(&mut tx, invoice_id, line_id).await?;

        invoices::delete_line(&mut tx, invoice_id, line_id).await?;
        if let Some(record_id) = &line.source_record_id {
            drivers::release_record(&mut tx, record_id).await?;
        }

        let (lines, totals) = refresh_totals(&mut tx, invoice_id).await?;
        tx.commit().await?;

        debug!(invoice_id = %invoice_id, line_id = %line_id, kind = ?line.kind, "Line removed");
        invoice.totals = totals;
        Ok(InvoiceDetail { invoice, lines })
    }

    /// Changes a line's units and rate and re-prices it.
    pub async fn reprice_line(
        &self,
        invoice_id: &str,
        line_id: &str,
        units: Decimal,
        rate: Money,
    ) -> RctiResult<InvoiceDetail> {
        validate_units(units)?;

        let mut tx = self.pool.begin().await?;
        let mut invoice = open_draft_for_edit(&mut tx, invoice_id).await?;
        let mut line = line_on_invoice(&mut tx, invoice_id, line_id).await?;

        line.units = units;
        line.rate = rate;
        let line = recompute_line(&line, invoice.tax_status, invoice.tax_mode);
        invoices::update_line_pricing(&mut tx, &line).await?;

        let (lines, totals) = refresh_totals(&mut tx, invoice_id).await?;
        tx.commit().await?;

        debug!(invoice_id = %invoice_id, line_id = %line_id, ex_tax = %line.amounts.ex_tax, "Line re-priced");
        invoice.totals = totals;
        Ok(InvoiceDetail { invoice, lines })
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// The invoice as it will look after `update`. Blank optional text clears.
fn apply_update(
    current: &Invoice,
    update: &InvoiceUpdate,
    tax_status: TaxStatus,
    tax_mode: TaxMode,
) -> Invoice {
    let mut next = current.clone();
    let text = |value: &Option<String>, slot: &mut Option<String>| {
        if let Some(v) = value {
            *slot = blank_to_none(Some(v.trim().to_string()));
        }
    };

    if let Some(name) = &update.payee_name {
        next.payee.name = name.trim().to_string();
    }
    text(&update.payee_business_name, &mut next.payee.business_name);
    text(&update.payee_address, &mut next.payee.address);
    text(&update.payee_tax_id, &mut next.payee.tax_id);
    text(&update.bank_account_name, &mut next.payee.bank.account_name);
    text(&update.bank_bsb, &mut next.payee.bank.bsb);
    text(&update.bank_account_number, &mut next.payee.bank.account_number);
    text(&update.notes, &mut next.notes);
    next.tax_status = tax_status;
    next.tax_mode = tax_mode;
    next
}

/// Opening write of every line edit: the invoice must be a draft.
async fn open_draft_for_edit(conn: &mut SqliteConnection, id: &str) -> RctiResult<Invoice> {
    let touched = invoices::touch_if_status(conn, id, InvoiceStatus::Draft).await?;
    let invoice = invoices::fetch_invoice(conn, id)
        .await?
        .ok_or_else(|| RctiError::not_found("Invoice", id))?;
    if touched == 0 {
        check_line_edit(invoice.status)?;
        return Err(StateConflict::StatusChanged {
            expected: InvoiceStatus::Draft,
        }
        .into());
    }
    Ok(invoice)
}

async fn line_on_invoice(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    line_id: &str,
) -> RctiResult<InvoiceLine> {
    let line = invoices::fetch_line(conn, line_id)
        .await?
        .ok_or_else(|| RctiError::not_found("Invoice line", line_id))?;
    if line.invoice_id != invoice_id {
        return Err(StateConflict::LineNotOnInvoice {
            line_id: line_id.to_string(),
            invoice_id: invoice_id.to_string(),
        }
        .into());
    }
    Ok(line)
}

/// Re-sums the invoice's lines and persists the totals.
async fn refresh_totals(
    conn: &mut SqliteConnection,
    invoice_id: &str,
) -> DbResult<(Vec<InvoiceLine>, InvoiceTotals)> {
    let lines = invoices::fetch_lines(conn, invoice_id).await?;
    let totals = compute_totals(&lines);
    invoices::update_totals(conn, invoice_id, &totals).await?;
    Ok((lines, totals))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use rcti_core::{DeductionKind, StandingDeduction, TollTrips};
    use rust_decimal_macros::dec;

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn driver_with_shift(db: &Database) -> (Driver, BillableRecord) {
        let driver = db.invoicing().register_driver(Driver::new("Sam Citizen")).await.unwrap();
        let record = BillableRecord::new(&driver.id, june(28), "Tray", dec!(8.5), Money::from_cents(8_500));
        let record = db.invoicing().add_billable_record(record).await.unwrap();
        (driver, record)
    }

    #[tokio::test]
    async fn test_create_prices_single_shift() {
        let db = db().await;
        let (driver, record) = driver_with_shift(&db).await;

        let detail = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();
        assert_eq!(detail.invoice.invoice_number, "RCTI-20240630-SAMCITIZEN");
        assert_eq!(detail.invoice.status, InvoiceStatus::Draft);
        assert_eq!(detail.lines.len(), 1);
        assert_eq!(detail.invoice.totals.subtotal.cents(), 72_250);
        assert_eq!(detail.invoice.totals.tax.cents(), 7_225);
        assert_eq!(detail.invoice.totals.total.cents(), 79_475);

        let stored = db.invoicing().get_invoice(&detail.invoice.id).await.unwrap();
        assert_eq!(stored.invoice.totals, detail.invoice.totals);
        assert_eq!(stored.lines, detail.lines);

        let billed = db.drivers().get_record(&record.id).await.unwrap().unwrap();
        assert_eq!(billed.invoice_id.as_deref(), Some(detail.invoice.id.as_str()));
    }

    #[tokio::test]
    async fn test_create_adds_break_toll_and_levy_lines() {
        let db = db().await;
        let mut driver = Driver::new("Sam Citizen");
        driver.billing.break_hours_per_shift = Some(dec!(0.5));
        driver.billing.tolls_enabled = true;
        driver.billing.fuel_levy_percent = dec!(10);
        let driver = db.invoicing().register_driver(driver).await.unwrap();

        for (day, trips) in [(24, 1), (25, 2)] {
            let mut record = BillableRecord::new(&driver.id, june(day), "Tray", dec!(8), Money::from_cents(8_500));
            record.toll_trips = TollTrips { eastlink: trips, citylink: 0 };
            db.invoicing().add_billable_record(record).await.unwrap();
        }

        let detail = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();
        let kinds: Vec<LineKind> = detail.lines.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LineKind::Ordinary,
                LineKind::Ordinary,
                LineKind::Break,
                LineKind::Toll,
                LineKind::FuelLevy
            ]
        );
        assert_eq!(detail.lines[2].units, dec!(-1.0));
        assert_eq!(detail.lines[2].amounts.ex_tax.cents(), -8_500);
        assert_eq!(detail.lines[3].amounts.ex_tax.cents(), 2_550);
        assert_eq!(detail.lines[4].amounts.ex_tax.cents(), 13_600);

        assert_eq!(detail.invoice.totals.subtotal.cents(), 143_650);
        assert_eq!(detail.invoice.totals.tax.cents(), 14_365);
        assert_eq!(detail.invoice.totals.total.cents(), 158_015);
    }

    #[tokio::test]
    async fn test_second_invoice_gets_suffixed_number_and_no_records() {
        let db = db().await;
        let (driver, _) = driver_with_shift(&db).await;

        let first = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();
        let second = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();

        assert_ne!(first.invoice.invoice_number, second.invoice.invoice_number);
        assert_eq!(second.invoice.invoice_number, "RCTI-20240630-SAMCITIZEN-2");
        assert!(second.lines.is_empty());
        assert!(second.invoice.totals.total.is_zero());
    }

    #[tokio::test]
    async fn test_tax_mode_change_reprices_draft() {
        let db = db().await;
        let (driver, _) = driver_with_shift(&db).await;
        let created = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();

        let update = InvoiceUpdate {
            tax_mode: Some(TaxMode::Inclusive),
            ..Default::default()
        };
        let updated = db.invoicing().update_invoice(&created.invoice.id, update).await.unwrap();

        assert_eq!(updated.invoice.tax_mode, TaxMode::Inclusive);
        assert_eq!(updated.lines[0].amounts.inc_tax.cents(), 72_250);
        assert_eq!(updated.lines[0].amounts.ex_tax.cents(), 65_682);
        assert_eq!(updated.lines[0].amounts.tax.cents(), 6_568);
        assert_eq!(updated.invoice.totals.total.cents(), 72_250);
        assert_eq!(updated.invoice.totals.subtotal.cents(), 65_682);

        let update = InvoiceUpdate {
            tax_status: Some(TaxStatus::NotRegistered),
            ..Default::default()
        };
        let updated = db.invoicing().update_invoice(&created.invoice.id, update).await.unwrap();
        assert!(updated.invoice.totals.tax.is_zero());
        assert_eq!(updated.invoice.totals.subtotal, updated.invoice.totals.total);
    }

    #[tokio::test]
    async fn test_stale_notes_write_cannot_restore_old_tax_status() {
        let db = db().await;
        let (driver, _) = driver_with_shift(&db).await;
        let id = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap().invoice.id;

        let notes = InvoiceUpdate {
            notes: Some("Week 26".to_string()),
            ..Default::default()
        };
        let (stale, stale_next) = {
            let mut conn = db.pool().acquire().await.unwrap();
            let stale = invoices::fetch_invoice(&mut conn, &id).await.unwrap().unwrap();
            let next = apply_update(&stale, &notes, stale.tax_status, stale.tax_mode);
            (stale, next)
        };

        let update = InvoiceUpdate {
            tax_status: Some(TaxStatus::NotRegistered),
            ..Default::default()
        };
        db.invoicing().update_invoice(&id, update).await.unwrap();

        let rows = {
            let mut conn = db.pool().acquire().await.unwrap();
            invoices::update_details(&mut conn, &stale_next, &stale).await.unwrap()
        };
        assert_eq!(rows, 0);

        // The same notes through the service land on top of the new settings.
        let detail = db.invoicing().update_invoice(&id, notes).await.unwrap();
        assert_eq!(detail.invoice.notes.as_deref(), Some("Week 26"));
        assert_eq!(detail.invoice.tax_status, TaxStatus::NotRegistered);
        assert!(detail.lines.iter().all(|l| l.amounts.tax.is_zero()));
        assert!(detail.invoice.totals.tax.is_zero());
    }

    #[tokio::test]
    async fn test_finalised_invoice_locks_tax_but_allows_notes() {
        let db = db().await;
        let (driver, _) = driver_with_shift(&db).await;
        let created = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();
        let id = created.invoice.id;
        db.invoicing().finalise_invoice(&id).await.unwrap();

        let err = db
            .invoicing()
            .update_invoice(
                &id,
                InvoiceUpdate {
                    tax_mode: Some(TaxMode::Inclusive),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RctiError::StateConflict(StateConflict::TaxSettingsLocked { field: "tax mode", .. })
        ));

        let updated = db
            .invoicing()
            .update_invoice(
                &id,
                InvoiceUpdate {
                    notes: Some("Paid by EFT".to_string()),
                    bank_bsb: Some("063-000".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.invoice.notes.as_deref(), Some("Paid by EFT"));
        assert_eq!(updated.invoice.payee.bank.bsb.as_deref(), Some("063-000"));
        assert_eq!(updated.invoice.status, InvoiceStatus::Finalised);

        let err = db
            .invoicing()
            .update_invoice(
                &id,
                InvoiceUpdate {
                    status: Some(InvoiceStatus::Draft),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RctiError::StateConflict(StateConflict::NoReturnToDraft { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_validation() {
        let db = db().await;
        let (driver, _) = driver_with_shift(&db).await;
        let created = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();

        let err = db
            .invoicing()
            .update_invoice(&created.invoice.id, InvoiceUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RctiError::Validation(ValidationError::EmptyUpdate)));

        let err = db
            .invoicing()
            .update_invoice(
                &created.invoice.id,
                InvoiceUpdate {
                    bank_bsb: Some("12345".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RctiError::Validation(ValidationError::InvalidFormat { .. })));

        let err = db
            .invoicing()
            .update_invoice(
                "missing",
                InvoiceUpdate {
                    notes: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RctiError::NotFound { entity: "Invoice", .. }));
    }

    #[tokio::test]
    async fn test_finalise_then_pay() {
        let db = db().await;
        let (driver, _) = driver_with_shift(&db).await;
        let lease = StandingDeduction::new(
            &driver.id,
            DeductionKind::Deduction,
            "Vehicle lease",
            Money::from_cents(100_000),
            Money::from_cents(15_000),
            june(1),
        );
        db.ledger().create_deduction(lease).await.unwrap();
        let created = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();
        let id = created.invoice.id;

        let err = db.invoicing().pay_invoice(&id).await.unwrap_err();
        assert!(matches!(
            err,
            RctiError::StateConflict(StateConflict::NotFinalised { operation: "pay", .. })
        ));

        let outcome = db.invoicing().finalise_invoice(&id).await.unwrap();
        assert_eq!(outcome.invoice.status, InvoiceStatus::Finalised);
        assert_eq!(outcome.deductions.applied_count, 1);
        assert_eq!(outcome.deductions.total_deduction_amount.cents(), 15_000);
        // Deductions do not alter the invoice totals.
        assert_eq!(outcome.invoice.totals.total.cents(), 79_475);

        let err = db.invoicing().finalise_invoice(&id).await.unwrap_err();
        assert!(matches!(
            err,
            RctiError::StateConflict(StateConflict::NotDraft { operation: "finalise", .. })
        ));

        let paid = db.invoicing().pay_invoice(&id).await.unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert!(paid.paid_at.is_some());

        let err = db.invoicing().pay_invoice(&id).await.unwrap_err();
        assert!(matches!(err, RctiError::StateConflict(StateConflict::PaidIsImmutable)));

        let err = db
            .invoicing()
            .update_invoice(
                &id,
                InvoiceUpdate {
                    status: Some(InvoiceStatus::Paid),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RctiError::StateConflict(StateConflict::PaidIsImmutable)));

        let err = db.invoicing().finalise_invoice("missing").await.unwrap_err();
        assert!(matches!(err, RctiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_draft_releases_records() {
        let db = db().await;
        let (driver, record) = driver_with_shift(&db).await;
        let created = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();

        db.invoicing().delete_invoice(&created.invoice.id).await.unwrap();

        let released = db.drivers().get_record(&record.id).await.unwrap().unwrap();
        assert!(released.invoice_id.is_none());
        assert!(db.invoices().get_by_id(&created.invoice.id).await.unwrap().is_none());
        assert!(db.invoices().get_lines(&created.invoice.id).await.unwrap().is_empty());

        let again = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();
        assert_eq!(again.lines.len(), 1);
        assert_eq!(again.invoice.invoice_number, "RCTI-20240630-SAMCITIZEN");

        db.invoicing().finalise_invoice(&again.invoice.id).await.unwrap();
        let err = db.invoicing().delete_invoice(&again.invoice.id).await.unwrap_err();
        assert!(matches!(
            err,
            RctiError::StateConflict(StateConflict::NotDraft { operation: "delete", .. })
        ));

        let err = db.invoicing().delete_invoice("missing").await.unwrap_err();
        assert!(matches!(err, RctiError::NotFound { entity: "Invoice", .. }));
    }

    #[tokio::test]
    async fn test_line_editing_updates_totals() {
        let db = db().await;
        let (driver, record) = driver_with_shift(&db).await;
        let created = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();
        let id = created.invoice.id.clone();

        let manual = ManualLine {
            line_date: june(30),
            category: "Yard cleanup".to_string(),
            units: dec!(1),
            rate: Money::from_cents(5_000),
        };
        let detail = db.invoicing().add_manual_line(&id, manual).await.unwrap();
        assert_eq!(detail.lines.len(), 2);
        assert_eq!(detail.lines[1].kind, LineKind::Manual);
        assert_eq!(detail.invoice.totals.subtotal.cents(), 77_250);
        assert_eq!(detail.invoice.totals.total.cents(), 84_975);

        let manual_id = detail.lines[1].id.clone();
        let detail = db
            .invoicing()
            .reprice_line(&id, &manual_id, dec!(2), Money::from_cents(5_000))
            .await
            .unwrap();
        assert_eq!(detail.invoice.totals.subtotal.cents(), 82_250);

        let ordinary_id = created.lines[0].id.clone();
        let detail = db.invoicing().remove_line(&id, &ordinary_id).await.unwrap();
        assert_eq!(detail.lines.len(), 1);
        assert_eq!(detail.invoice.totals.subtotal.cents(), 10_000);
        assert_eq!(detail.invoice.totals.total.cents(), 11_000);

        let released = db.drivers().get_record(&record.id).await.unwrap().unwrap();
        assert!(released.invoice_id.is_none());

        let stored = db.invoices().get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.totals, detail.invoice.totals);
    }

    #[tokio::test]
    async fn test_line_edits_rejected_outside_draft_or_invoice() {
        let db = db().await;
        let (driver, _) = driver_with_shift(&db).await;
        let first = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();
        let other = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap();

        let err = db
            .invoicing()
            .remove_line(&other.invoice.id, &first.lines[0].id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RctiError::StateConflict(StateConflict::LineNotOnInvoice { .. })
        ));

        let err = db
            .invoicing()
            .reprice_line(&first.invoice.id, &first.lines[0].id, dec!(-1), Money::from_cents(100))
            .await
            .unwrap_err();
        assert!(matches!(err, RctiError::Validation(ValidationError::MustNotBeNegative { .. })));

        db.invoicing().finalise_invoice(&first.invoice.id).await.unwrap();
        let err = db
            .invoicing()
            .remove_line(&first.invoice.id, &first.lines[0].id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RctiError::StateConflict(StateConflict::NotDraft { operation: "edit lines", .. })
        ));
    }

    #[tokio::test]
    async fn test_register_driver_validation() {
        let db = db().await;

        let err = db.invoicing().register_driver(Driver::new("  ")).await.unwrap_err();
        assert!(matches!(err, RctiError::Validation(ValidationError::Required { .. })));

        let mut driver = Driver::new("Sam");
        driver.billing.fuel_levy_percent = dec!(150);
        let err = db.invoicing().register_driver(driver).await.unwrap_err();
        assert!(matches!(err, RctiError::Validation(ValidationError::OutOfRange { .. })));

        let record = BillableRecord::new("nobody", june(1), "Tray", dec!(8), Money::from_cents(8_500));
        let err = db.invoicing().add_billable_record(record).await.unwrap_err();
        assert!(matches!(err, RctiError::NotFound { entity: "Driver", .. }));

        let err = db.invoicing().create_invoice("nobody", june(30)).await.unwrap_err();
        assert!(matches!(err, RctiError::NotFound { entity: "Driver", .. }));
    }
}
