//! # Deduction Repository
//!
//! Standing deductions, their append-only applications, and the
//! compare-and-swap that charges one cycle.
//!
//! ## Compare-and-Swap
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  selection read:  remaining = 1000.00                                  │
//! │                                                                         │
//! │  UPDATE standing_deductions SET remaining = 850.00, paid = 150.00 ...  │
//! │  WHERE id = ? AND amount_remaining_cents = 100000                      │
//! │                AND status = 'active'                                   │
//! │                                                                         │
//! │  1 row  → this caller charged the cycle                                │
//! │  0 rows → someone else changed the balance first; skip                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use rcti_core::deduction::AppliedState;
use rcti_core::{
    DeductionApplication, DeductionFrequency, DeductionKind, DeductionStatus, Money,
    StandingDeduction,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct DeductionRecord {
    id: String,
    driver_id: String,
    kind: DeductionKind,
    description: String,
    total_amount_cents: i64,
    amount_paid_cents: i64,
    amount_remaining_cents: i64,
    amount_per_cycle_cents: i64,
    frequency: DeductionFrequency,
    start_date: NaiveDate,
    status: DeductionStatus,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DeductionRecord> for StandingDeduction {
    fn from(r: DeductionRecord) -> Self {
        StandingDeduction {
            id: r.id,
            driver_id: r.driver_id,
            kind: r.kind,
            description: r.description,
            total_amount: Money::from_cents(r.total_amount_cents),
            amount_paid: Money::from_cents(r.amount_paid_cents),
            amount_remaining: Money::from_cents(r.amount_remaining_cents),
            amount_per_cycle: Money::from_cents(r.amount_per_cycle_cents),
            frequency: r.frequency,
            start_date: r.start_date,
            status: r.status,
            completed_at: r.completed_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ApplicationRecord {
    id: String,
    deduction_id: String,
    invoice_id: String,
    applied_amount_cents: i64,
    applied_at: DateTime<Utc>,
}

impl From<ApplicationRecord> for DeductionApplication {
    fn from(r: ApplicationRecord) -> Self {
        DeductionApplication {
            id: r.id,
            deduction_id: r.deduction_id,
            invoice_id: r.invoice_id,
            applied_amount: Money::from_cents(r.applied_amount_cents),
            applied_at: r.applied_at,
        }
    }
}

const DEDUCTION_COLUMNS: &str = r#"
    id, driver_id, kind, description,
    total_amount_cents, amount_paid_cents, amount_remaining_cents, amount_per_cycle_cents,
    frequency, start_date, status, completed_at, created_at, updated_at
"#;

// =============================================================================
// Connection-Level Operations
// =============================================================================

pub async fn insert_deduction(
    conn: &mut SqliteConnection,
    deduction: &StandingDeduction,
) -> DbResult<()> {
    debug!(
        id = %deduction.id,
        driver_id = %deduction.driver_id,
        kind = %deduction.kind,
        total = %deduction.total_amount,
        "Inserting standing deduction"
    );

    sqlx::query(&format!(
        r#"
        INSERT INTO standing_deductions ({})
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
        DEDUCTION_COLUMNS
    ))
    .bind(&deduction.id)
    .bind(&deduction.driver_id)
    .bind(deduction.kind)
    .bind(&deduction.description)
    .bind(deduction.total_amount.cents())
    .bind(deduction.amount_paid.cents())
    .bind(deduction.amount_remaining.cents())
    .bind(deduction.amount_per_cycle.cents())
    .bind(deduction.frequency)
    .bind(deduction.start_date)
    .bind(deduction.status)
    .bind(deduction.completed_at)
    .bind(deduction.created_at)
    .bind(deduction.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn fetch_deduction(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<StandingDeduction>> {
    let row: Option<DeductionRecord> = sqlx::query_as(&format!(
        "SELECT {} FROM standing_deductions WHERE id = ?1",
        DEDUCTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(StandingDeduction::from))
}

/// Deductions of `driver_id` eligible for `invoice_id`: active, started by
/// `period_ending`, and not yet applied to this invoice.
pub async fn fetch_candidates(
    conn: &mut SqliteConnection,
    driver_id: &str,
    invoice_id: &str,
    period_ending: NaiveDate,
) -> DbResult<Vec<StandingDeduction>> {
    let rows: Vec<DeductionRecord> = sqlx::query_as(&format!(
        r#"
        SELECT {}
        FROM standing_deductions d
        WHERE d.driver_id = ?1
          AND d.status = 'active'
          AND d.start_date <= ?3
          AND NOT EXISTS (
              SELECT 1 FROM deduction_applications a
              WHERE a.deduction_id = d.id AND a.invoice_id = ?2
          )
        ORDER BY d.start_date, d.created_at, d.id
        "#,
        DEDUCTION_COLUMNS
    ))
    .bind(driver_id)
    .bind(invoice_id)
    .bind(period_ending)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(StandingDeduction::from).collect())
}

/// Charges one cycle if the balance still equals `expected_remaining`.
///
/// Returns affected rows: 1 on success, 0 when the balance moved.
pub async fn compare_and_apply(
    conn: &mut SqliteConnection,
    deduction_id: &str,
    expected_remaining: Money,
    next: &AppliedState,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE standing_deductions SET
            amount_paid_cents = ?3,
            amount_remaining_cents = ?4,
            status = ?5,
            completed_at = ?6,
            updated_at = ?7
        WHERE id = ?1
          AND amount_remaining_cents = ?2
          AND status = 'active'
        "#,
    )
    .bind(deduction_id)
    .bind(expected_remaining.cents())
    .bind(next.amount_paid.cents())
    .bind(next.amount_remaining.cents())
    .bind(next.status)
    .bind(next.completed_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn insert_application(
    conn: &mut SqliteConnection,
    application: &DeductionApplication,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO deduction_applications (
            id, deduction_id, invoice_id, applied_amount_cents, applied_at
        ) VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&application.id)
    .bind(&application.deduction_id)
    .bind(&application.invoice_id)
    .bind(application.applied_amount.cents())
    .bind(application.applied_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn count_applications(conn: &mut SqliteConnection, deduction_id: &str) -> DbResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM deduction_applications WHERE deduction_id = ?1")
            .bind(deduction_id)
            .fetch_one(&mut *conn)
            .await?;

    Ok(count)
}

/// Writes an amended deduction, provided nothing was paid since `expected_paid`
/// was read.
pub async fn update_amended(
    conn: &mut SqliteConnection,
    deduction: &StandingDeduction,
    expected_paid: Money,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE standing_deductions SET
            description = ?3,
            total_amount_cents = ?4,
            amount_remaining_cents = ?5,
            amount_per_cycle_cents = ?6,
            status = ?7,
            completed_at = ?8,
            updated_at = ?9
        WHERE id = ?1 AND amount_paid_cents = ?2
        "#,
    )
    .bind(&deduction.id)
    .bind(expected_paid.cents())
    .bind(&deduction.description)
    .bind(deduction.total_amount.cents())
    .bind(deduction.amount_remaining.cents())
    .bind(deduction.amount_per_cycle.cents())
    .bind(deduction.status)
    .bind(deduction.completed_at)
    .bind(deduction.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for standing deductions and their applications.
#[derive(Debug, Clone)]
pub struct DeductionRepository {
    pool: SqlitePool,
}

impl DeductionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DeductionRepository { pool }
    }

    pub async fn insert(&self, deduction: &StandingDeduction) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_deduction(&mut conn, deduction).await
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<StandingDeduction>> {
        let mut conn = self.pool.acquire().await?;
        fetch_deduction(&mut conn, id).await
    }

    pub async fn list_for_driver(&self, driver_id: &str) -> DbResult<Vec<StandingDeduction>> {
        let rows: Vec<DeductionRecord> = sqlx::query_as(&format!(
            "SELECT {} FROM standing_deductions WHERE driver_id = ?1 ORDER BY start_date, id",
            DEDUCTION_COLUMNS
        ))
        .bind(driver_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StandingDeduction::from).collect())
    }

    /// Applications charged against one invoice, oldest first.
    pub async fn applications_for_invoice(
        &self,
        invoice_id: &str,
    ) -> DbResult<Vec<DeductionApplication>> {
        let rows: Vec<ApplicationRecord> = sqlx::query_as(
            r#"
            SELECT id, deduction_id, invoice_id, applied_amount_cents, applied_at
            FROM deduction_applications
            WHERE invoice_id = ?1
            ORDER BY applied_at, id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DeductionApplication::from).collect())
    }

    /// Every application of one deduction, oldest first.
    pub async fn applications_for_deduction(
        &self,
        deduction_id: &str,
    ) -> DbResult<Vec<DeductionApplication>> {
        let rows: Vec<ApplicationRecord> = sqlx::query_as(
            r#"
            SELECT id, deduction_id, invoice_id, applied_amount_cents, applied_at
            FROM deduction_applications
            WHERE deduction_id = ?1
            ORDER BY applied_at, id
            "#,
        )
        .bind(deduction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DeductionApplication::from).collect())
    }
}
