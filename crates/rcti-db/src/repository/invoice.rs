//! # Invoice Repository
//!
//! Database operations for invoices and invoice lines.
//!
//! ## Conditional Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every state-dependent write names the state it expects:               │
//! │                                                                         │
//! │  transition_status(id, Draft → Finalised)                              │
//! │     UPDATE invoices SET status = 'finalised' ...                       │
//! │     WHERE id = ? AND status = 'draft'                                  │
//! │                                                                         │
//! │  rows_affected() == 1  → the transition happened                       │
//! │  rows_affected() == 0  → missing, or someone else moved it first       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use rcti_core::{
    BankDetails, Invoice, InvoiceLine, InvoiceStatus, InvoiceTotals, LineAmounts, LineKind, Money,
    PayeeSnapshot, TaxMode, TaxStatus,
};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::debug;

use super::decode_decimal;
use crate::error::{DbError, DbResult};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRecord {
    id: String,
    driver_id: String,
    invoice_number: String,
    period_ending: NaiveDate,
    payee_name: String,
    payee_business_name: Option<String>,
    payee_address: Option<String>,
    payee_tax_id: Option<String>,
    bank_account_name: Option<String>,
    bank_bsb: Option<String>,
    bank_account_number: Option<String>,
    tax_status: TaxStatus,
    tax_mode: TaxMode,
    subtotal_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    status: InvoiceStatus,
    paid_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InvoiceRecord> for Invoice {
    fn from(r: InvoiceRecord) -> Self {
        Invoice {
            id: r.id,
            driver_id: r.driver_id,
            invoice_number: r.invoice_number,
            period_ending: r.period_ending,
            payee: PayeeSnapshot {
                name: r.payee_name,
                business_name: r.payee_business_name,
                address: r.payee_address,
                tax_id: r.payee_tax_id,
                bank: BankDetails {
                    account_name: r.bank_account_name,
                    bsb: r.bank_bsb,
                    account_number: r.bank_account_number,
                },
            },
            tax_status: r.tax_status,
            tax_mode: r.tax_mode,
            totals: InvoiceTotals {
                subtotal: Money::from_cents(r.subtotal_cents),
                tax: Money::from_cents(r.tax_cents),
                total: Money::from_cents(r.total_cents),
            },
            status: r.status,
            paid_at: r.paid_at,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRecord {
    id: String,
    invoice_id: String,
    source_record_id: Option<String>,
    line_date: NaiveDate,
    kind: LineKind,
    category: String,
    units: String,
    rate_cents: i64,
    ex_tax_cents: i64,
    tax_cents: i64,
    inc_tax_cents: i64,
}

impl TryFrom<LineRecord> for InvoiceLine {
    type Error = DbError;

    fn try_from(r: LineRecord) -> DbResult<Self> {
        Ok(InvoiceLine {
            id: r.id,
            invoice_id: r.invoice_id,
            source_record_id: r.source_record_id,
            line_date: r.line_date,
            kind: r.kind,
            category: r.category,
            units: decode_decimal("units", &r.units)?,
            rate: Money::from_cents(r.rate_cents),
            amounts: LineAmounts {
                ex_tax: Money::from_cents(r.ex_tax_cents),
                tax: Money::from_cents(r.tax_cents),
                inc_tax: Money::from_cents(r.inc_tax_cents),
            },
        })
    }
}

const INVOICE_COLUMNS: &str = r#"
    id, driver_id, invoice_number, period_ending,
    payee_name, payee_business_name, payee_address, payee_tax_id,
    bank_account_name, bank_bsb, bank_account_number,
    tax_status, tax_mode, subtotal_cents, tax_cents, total_cents,
    status, paid_at, notes, created_at, updated_at
"#;

const LINE_COLUMNS: &str = r#"
    id, invoice_id, source_record_id, line_date, kind, category,
    units, rate_cents, ex_tax_cents, tax_cents, inc_tax_cents
"#;

// =============================================================================
// Invoices
// =============================================================================

/// Inserts a new invoice row. A clashing invoice number surfaces as
/// [`DbError::UniqueViolation`].
pub async fn insert_invoice(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
    debug!(
        id = %invoice.id,
        invoice_number = %invoice.invoice_number,
        "Inserting invoice"
    );

    sqlx::query(&format!(
        r#"
        INSERT INTO invoices ({})
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
        "#,
        INVOICE_COLUMNS
    ))
    .bind(&invoice.id)
    .bind(&invoice.driver_id)
    .bind(&invoice.invoice_number)
    .bind(invoice.period_ending)
    .bind(&invoice.payee.name)
    .bind(&invoice.payee.business_name)
    .bind(&invoice.payee.address)
    .bind(&invoice.payee.tax_id)
    .bind(&invoice.payee.bank.account_name)
    .bind(&invoice.payee.bank.bsb)
    .bind(&invoice.payee.bank.account_number)
    .bind(invoice.tax_status)
    .bind(invoice.tax_mode)
    .bind(invoice.totals.subtotal.cents())
    .bind(invoice.totals.tax.cents())
    .bind(invoice.totals.total.cents())
    .bind(invoice.status)
    .bind(invoice.paid_at)
    .bind(&invoice.notes)
    .bind(invoice.created_at)
    .bind(invoice.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn fetch_invoice(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Invoice>> {
    let row: Option<InvoiceRecord> =
        sqlx::query_as(&format!("SELECT {} FROM invoices WHERE id = ?1", INVOICE_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(row.map(Invoice::from))
}

/// Invoice numbers already taken that start with `prefix`.
pub async fn numbers_with_prefix(
    conn: &mut SqliteConnection,
    prefix: &str,
) -> DbResult<HashSet<String>> {
    let numbers: Vec<String> =
        sqlx::query_scalar("SELECT invoice_number FROM invoices WHERE invoice_number LIKE ?1 || '%'")
            .bind(prefix)
            .fetch_all(&mut *conn)
            .await?;

    Ok(numbers.into_iter().collect())
}

/// Moves an invoice from `from` to `to`. Returns affected rows (0 or 1).
pub async fn transition_status(
    conn: &mut SqliteConnection,
    id: &str,
    from: InvoiceStatus,
    to: InvoiceStatus,
    paid_at: Option<DateTime<Utc>>,
) -> DbResult<u64> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE invoices SET
            status = ?3,
            paid_at = COALESCE(?4, paid_at),
            updated_at = ?5
        WHERE id = ?1 AND status = ?2
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(paid_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    debug!(id = %id, from = %from, to = %to, rows = result.rows_affected(), "Status transition");
    Ok(result.rows_affected())
}

/// Bumps `updated_at` if the invoice is in `expected`. Used as the opening
/// write of a unit of work that must not run against any other state.
pub async fn touch_if_status(
    conn: &mut SqliteConnection,
    id: &str,
    expected: InvoiceStatus,
) -> DbResult<u64> {
    let result = sqlx::query("UPDATE invoices SET updated_at = ?3 WHERE id = ?1 AND status = ?2")
        .bind(id)
        .bind(expected)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Bumps `updated_at` whatever the status. As the opening write of a
/// transaction it takes the write lock, so the reads that follow see the
/// latest committed row and no other writer can slip in before commit.
pub async fn touch(conn: &mut SqliteConnection, id: &str) -> DbResult<u64> {
    let result = sqlx::query("UPDATE invoices SET updated_at = ?2 WHERE id = ?1")
        .bind(id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Writes the editable columns of `invoice`, provided status and tax
/// settings still match `read`, the copy the new values were derived from.
pub async fn update_details(
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    read: &Invoice,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE invoices SET
            payee_name = ?3,
            payee_business_name = ?4,
            payee_address = ?5,
            payee_tax_id = ?6,
            bank_account_name = ?7,
            bank_bsb = ?8,
            bank_account_number = ?9,
            tax_status = ?10,
            tax_mode = ?11,
            notes = ?12,
            updated_at = ?13
        WHERE id = ?1 AND status = ?2 AND tax_status = ?14 AND tax_mode = ?15
        "#,
    )
    .bind(&invoice.id)
    .bind(read.status)
    .bind(&invoice.payee.name)
    .bind(&invoice.payee.business_name)
    .bind(&invoice.payee.address)
    .bind(&invoice.payee.tax_id)
    .bind(&invoice.payee.bank.account_name)
    .bind(&invoice.payee.bank.bsb)
    .bind(&invoice.payee.bank.account_number)
    .bind(invoice.tax_status)
    .bind(invoice.tax_mode)
    .bind(&invoice.notes)
    .bind(Utc::now())
    .bind(read.tax_status)
    .bind(read.tax_mode)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Persists totals of a draft invoice.
pub async fn update_totals(
    conn: &mut SqliteConnection,
    id: &str,
    totals: &InvoiceTotals,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE invoices SET
            subtotal_cents = ?2,
            tax_cents = ?3,
            total_cents = ?4,
            updated_at = ?5
        WHERE id = ?1 AND status = 'draft'
        "#,
    )
    .bind(id)
    .bind(totals.subtotal.cents())
    .bind(totals.tax.cents())
    .bind(totals.total.cents())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Deletes a draft invoice; its lines go with it.
pub async fn delete_draft(conn: &mut SqliteConnection, id: &str) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM invoices WHERE id = ?1 AND status = 'draft'")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Lines
// =============================================================================

/// Lines of an invoice in display order.
pub async fn fetch_lines(
    conn: &mut SqliteConnection,
    invoice_id: &str,
) -> DbResult<Vec<InvoiceLine>> {
    let rows: Vec<LineRecord> = sqlx::query_as(&format!(
        "SELECT {} FROM invoice_lines WHERE invoice_id = ?1 ORDER BY position, id",
        LINE_COLUMNS
    ))
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(InvoiceLine::try_from).collect()
}

pub async fn fetch_line(conn: &mut SqliteConnection, line_id: &str) -> DbResult<Option<InvoiceLine>> {
    let row: Option<LineRecord> =
        sqlx::query_as(&format!("SELECT {} FROM invoice_lines WHERE id = ?1", LINE_COLUMNS))
            .bind(line_id)
            .fetch_optional(&mut *conn)
            .await?;

    row.map(InvoiceLine::try_from).transpose()
}

/// Position after the last line of the invoice.
pub async fn next_position(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<i64> {
    let max: Option<i64> =
        sqlx::query_scalar("SELECT MAX(position) FROM invoice_lines WHERE invoice_id = ?1")
            .bind(invoice_id)
            .fetch_one(&mut *conn)
            .await?;

    Ok(max.map_or(0, |m| m + 1))
}

pub async fn insert_line(
    conn: &mut SqliteConnection,
    line: &InvoiceLine,
    position: i64,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO invoice_lines (
            id, invoice_id, position, source_record_id, line_date, kind, category,
            units, rate_cents, ex_tax_cents, tax_cents, inc_tax_cents
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&line.id)
    .bind(&line.invoice_id)
    .bind(position)
    .bind(&line.source_record_id)
    .bind(line.line_date)
    .bind(line.kind)
    .bind(&line.category)
    .bind(line.units.to_string())
    .bind(line.rate.cents())
    .bind(line.amounts.ex_tax.cents())
    .bind(line.amounts.tax.cents())
    .bind(line.amounts.inc_tax.cents())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Rewrites units, rate and amounts of a line.
pub async fn update_line_pricing(conn: &mut SqliteConnection, line: &InvoiceLine) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE invoice_lines SET
            units = ?3,
            rate_cents = ?4,
            ex_tax_cents = ?5,
            tax_cents = ?6,
            inc_tax_cents = ?7
        WHERE id = ?1 AND invoice_id = ?2
        "#,
    )
    .bind(&line.id)
    .bind(&line.invoice_id)
    .bind(line.units.to_string())
    .bind(line.rate.cents())
    .bind(line.amounts.ex_tax.cents())
    .bind(line.amounts.tax.cents())
    .bind(line.amounts.inc_tax.cents())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn delete_line(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    line_id: &str,
) -> DbResult<u64> {
    let result = sqlx::query("DELETE FROM invoice_lines WHERE id = ?1 AND invoice_id = ?2")
        .bind(line_id)
        .bind(invoice_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to invoices outside a unit of work.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        fetch_invoice(&mut conn, id).await
    }

    pub async fn get_by_number(&self, invoice_number: &str) -> DbResult<Option<Invoice>> {
        let row: Option<InvoiceRecord> = sqlx::query_as(&format!(
            "SELECT {} FROM invoices WHERE invoice_number = ?1",
            INVOICE_COLUMNS
        ))
        .bind(invoice_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Invoice::from))
    }

    pub async fn get_lines(&self, invoice_id: &str) -> DbResult<Vec<InvoiceLine>> {
        let mut conn = self.pool.acquire().await?;
        fetch_lines(&mut conn, invoice_id).await
    }

    /// A driver's invoices, newest period first.
    pub async fn list_for_driver(&self, driver_id: &str) -> DbResult<Vec<Invoice>> {
        let rows: Vec<InvoiceRecord> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM invoices
            WHERE driver_id = ?1
            ORDER BY period_ending DESC, created_at DESC
            "#,
            INVOICE_COLUMNS
        ))
        .bind(driver_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Invoice::from).collect())
    }
}
