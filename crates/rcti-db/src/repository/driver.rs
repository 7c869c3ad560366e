//! # Driver Repository
//!
//! Drivers (payees) with their billing settings, and the billable records
//! (shifts) waiting to be invoiced.
//!
//! ## Billable Record Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  insert_record()           invoice_id = NULL   (unbilled)              │
//! │       │                                                                 │
//! │       ▼  create_invoice()                                              │
//! │  mark_records_billed()     invoice_id = <draft>                        │
//! │       │                                                                 │
//! │       ├── draft deleted / line removed ──► release  (NULL again)      │
//! │       ▼                                                                 │
//! │  finalised / paid          stays billed forever                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use rcti_core::{
    BankDetails, BillableRecord, BillingSettings, Driver, Money, TaxMode, TaxStatus, TollTrips,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{decode_decimal, decode_optional_decimal};
use crate::error::{DbError, DbResult};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct DriverRecord {
    id: String,
    name: String,
    business_name: Option<String>,
    address: Option<String>,
    tax_id: Option<String>,
    bank_account_name: Option<String>,
    bank_bsb: Option<String>,
    bank_account_number: Option<String>,
    tax_status: TaxStatus,
    tax_mode: TaxMode,
    break_hours_per_shift: Option<String>,
    tolls_enabled: bool,
    fuel_levy_percent: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DriverRecord> for Driver {
    type Error = DbError;

    fn try_from(r: DriverRecord) -> DbResult<Self> {
        Ok(Driver {
            id: r.id,
            name: r.name,
            business_name: r.business_name,
            address: r.address,
            tax_id: r.tax_id,
            bank: BankDetails {
                account_name: r.bank_account_name,
                bsb: r.bank_bsb,
                account_number: r.bank_account_number,
            },
            billing: BillingSettings {
                tax_status: r.tax_status,
                tax_mode: r.tax_mode,
                break_hours_per_shift: decode_optional_decimal(
                    "break_hours_per_shift",
                    r.break_hours_per_shift.as_deref(),
                )?,
                tolls_enabled: r.tolls_enabled,
                fuel_levy_percent: decode_decimal("fuel_levy_percent", &r.fuel_levy_percent)?,
            },
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BillableRecordRow {
    id: String,
    driver_id: String,
    work_date: NaiveDate,
    vehicle_class: String,
    hours: String,
    rate_cents: i64,
    eastlink_trips: i64,
    citylink_trips: i64,
    invoice_id: Option<String>,
}

impl TryFrom<BillableRecordRow> for BillableRecord {
    type Error = DbError;

    fn try_from(r: BillableRecordRow) -> DbResult<Self> {
        Ok(BillableRecord {
            id: r.id,
            driver_id: r.driver_id,
            work_date: r.work_date,
            vehicle_class: r.vehicle_class,
            hours: decode_decimal("hours", &r.hours)?,
            rate: Money::from_cents(r.rate_cents),
            toll_trips: TollTrips {
                eastlink: r.eastlink_trips,
                citylink: r.citylink_trips,
            },
            invoice_id: r.invoice_id,
        })
    }
}

const DRIVER_COLUMNS: &str = r#"
    id, name, business_name, address, tax_id,
    bank_account_name, bank_bsb, bank_account_number,
    tax_status, tax_mode, break_hours_per_shift, tolls_enabled, fuel_levy_percent,
    created_at, updated_at
"#;

const RECORD_COLUMNS: &str = r#"
    id, driver_id, work_date, vehicle_class, hours, rate_cents,
    eastlink_trips, citylink_trips, invoice_id
"#;

// =============================================================================
// Connection-Level Operations
// =============================================================================

pub async fn fetch_driver(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Driver>> {
    let row: Option<DriverRecord> =
        sqlx::query_as(&format!("SELECT {} FROM drivers WHERE id = ?1", DRIVER_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    row.map(Driver::try_from).transpose()
}

/// Unbilled records of a driver worked on or before `period_ending`,
/// oldest first.
pub async fn fetch_unbilled_records(
    conn: &mut SqliteConnection,
    driver_id: &str,
    period_ending: NaiveDate,
) -> DbResult<Vec<BillableRecord>> {
    let rows: Vec<BillableRecordRow> = sqlx::query_as(&format!(
        r#"
        SELECT {}
        FROM billable_records
        WHERE driver_id = ?1 AND invoice_id IS NULL AND work_date <= ?2
        ORDER BY work_date, created_at, id
        "#,
        RECORD_COLUMNS
    ))
    .bind(driver_id)
    .bind(period_ending)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(BillableRecord::try_from).collect()
}

/// Attaches records to an invoice. Only records still unbilled are taken;
/// returns how many were.
pub async fn mark_records_billed(
    conn: &mut SqliteConnection,
    invoice_id: &str,
    record_ids: &[String],
) -> DbResult<u64> {
    let mut billed = 0;
    for record_id in record_ids {
        let result = sqlx::query(
            "UPDATE billable_records SET invoice_id = ?1 WHERE id = ?2 AND invoice_id IS NULL",
        )
        .bind(invoice_id)
        .bind(record_id)
        .execute(&mut *conn)
        .await?;
        billed += result.rows_affected();
    }
    Ok(billed)
}

/// Detaches one record from its invoice.
pub async fn release_record(conn: &mut SqliteConnection, record_id: &str) -> DbResult<u64> {
    let result = sqlx::query("UPDATE billable_records SET invoice_id = NULL WHERE id = ?1")
        .bind(record_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Detaches every record of an invoice, provided the invoice is still a
/// draft.
pub async fn release_records_of_draft(
    conn: &mut SqliteConnection,
    invoice_id: &str,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE billable_records SET invoice_id = NULL
        WHERE invoice_id = ?1
          AND EXISTS (SELECT 1 FROM invoices WHERE id = ?1 AND status = 'draft')
        "#,
    )
    .bind(invoice_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for drivers and billable records.
#[derive(Debug, Clone)]
pub struct DriverRepository {
    pool: SqlitePool,
}

impl DriverRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DriverRepository { pool }
    }

    /// Inserts a driver.
    pub async fn insert(&self, driver: &Driver) -> DbResult<()> {
        debug!(id = %driver.id, name = %driver.name, "Inserting driver");

        sqlx::query(&format!(
            r#"
            INSERT INTO drivers ({})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            DRIVER_COLUMNS
        ))
        .bind(&driver.id)
        .bind(&driver.name)
        .bind(&driver.business_name)
        .bind(&driver.address)
        .bind(&driver.tax_id)
        .bind(&driver.bank.account_name)
        .bind(&driver.bank.bsb)
        .bind(&driver.bank.account_number)
        .bind(driver.billing.tax_status)
        .bind(driver.billing.tax_mode)
        .bind(driver.billing.break_hours_per_shift.map(|h| h.to_string()))
        .bind(driver.billing.tolls_enabled)
        .bind(driver.billing.fuel_levy_percent.to_string())
        .bind(driver.created_at)
        .bind(driver.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Driver>> {
        let mut conn = self.pool.acquire().await?;
        fetch_driver(&mut conn, id).await
    }

    /// All drivers, by name.
    pub async fn list(&self) -> DbResult<Vec<Driver>> {
        let rows: Vec<DriverRecord> =
            sqlx::query_as(&format!("SELECT {} FROM drivers ORDER BY name, id", DRIVER_COLUMNS))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Driver::try_from).collect()
    }

    /// Updates a driver's details and billing settings.
    ///
    /// Existing invoices keep their snapshot; only new invoices see the
    /// change.
    pub async fn update(&self, driver: &Driver) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE drivers SET
                name = ?2,
                business_name = ?3,
                address = ?4,
                tax_id = ?5,
                bank_account_name = ?6,
                bank_bsb = ?7,
                bank_account_number = ?8,
                tax_status = ?9,
                tax_mode = ?10,
                break_hours_per_shift = ?11,
                tolls_enabled = ?12,
                fuel_levy_percent = ?13,
                updated_at = ?14
            WHERE id = ?1
            "#,
        )
        .bind(&driver.id)
        .bind(&driver.name)
        .bind(&driver.business_name)
        .bind(&driver.address)
        .bind(&driver.tax_id)
        .bind(&driver.bank.account_name)
        .bind(&driver.bank.bsb)
        .bind(&driver.bank.account_number)
        .bind(driver.billing.tax_status)
        .bind(driver.billing.tax_mode)
        .bind(driver.billing.break_hours_per_shift.map(|h| h.to_string()))
        .bind(driver.billing.tolls_enabled)
        .bind(driver.billing.fuel_levy_percent.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Driver", &driver.id));
        }

        Ok(())
    }

    /// Inserts a billable record.
    pub async fn insert_record(&self, record: &BillableRecord) -> DbResult<()> {
        debug!(
            id = %record.id,
            driver_id = %record.driver_id,
            work_date = %record.work_date,
            "Inserting billable record"
        );

        sqlx::query(
            r#"
            INSERT INTO billable_records (
                id, driver_id, work_date, vehicle_class, hours, rate_cents,
                eastlink_trips, citylink_trips, invoice_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&record.id)
        .bind(&record.driver_id)
        .bind(record.work_date)
        .bind(&record.vehicle_class)
        .bind(record.hours.to_string())
        .bind(record.rate.cents())
        .bind(record.toll_trips.eastlink)
        .bind(record.toll_trips.citylink)
        .bind(&record.invoice_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_record(&self, id: &str) -> DbResult<Option<BillableRecord>> {
        let row: Option<BillableRecordRow> = sqlx::query_as(&format!(
            "SELECT {} FROM billable_records WHERE id = ?1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(BillableRecord::try_from).transpose()
    }

    /// Records that would go on an invoice for this period right now.
    pub async fn unbilled_records(
        &self,
        driver_id: &str,
        period_ending: NaiveDate,
    ) -> DbResult<Vec<BillableRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_unbilled_records(&mut conn, driver_id, period_ending).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use rust_decimal_macros::dec;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    #[tokio::test]
    async fn test_driver_round_trip_keeps_decimals() {
        let db = db().await;
        let mut driver = Driver::new("Sam Citizen");
        driver.bank.bsb = Some("063-000".to_string());
        driver.billing.break_hours_per_shift = Some(dec!(0.5));
        driver.billing.fuel_levy_percent = dec!(12.5);
        driver.billing.tax_status = TaxStatus::NotRegistered;
        db.drivers().insert(&driver).await.unwrap();

        let loaded = db.drivers().get_by_id(&driver.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Sam Citizen");
        assert_eq!(loaded.bank.bsb.as_deref(), Some("063-000"));
        assert_eq!(loaded.billing, driver.billing);
    }

    #[tokio::test]
    async fn test_update_missing_driver_is_not_found() {
        let db = db().await;
        let err = db.drivers().update(&Driver::new("Ghost")).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unbilled_records_respect_period_and_billing() {
        let db = db().await;
        let driver = Driver::new("Sam");
        db.drivers().insert(&driver).await.unwrap();

        let early = BillableRecord::new(&driver.id, june(24), "Tray", dec!(8), Money::from_cents(8500));
        let mut late = BillableRecord::new(&driver.id, june(25), "Tray", dec!(9.25), Money::from_cents(8500));
        late.toll_trips.eastlink = 2;
        let after = BillableRecord::new(&driver.id, june(30), "Crane", dec!(6), Money::from_cents(11000));
        for r in [&early, &late, &after] {
            db.drivers().insert_record(r).await.unwrap();
        }

        let records = db.drivers().unbilled_records(&driver.id, june(29)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, early.id);
        assert_eq!(records[1].hours, dec!(9.25));
        assert_eq!(records[1].toll_trips.eastlink, 2);
    }

    #[tokio::test]
    async fn test_list_orders_by_name() {
        let db = db().await;
        db.drivers().insert(&Driver::new("Zed")).await.unwrap();
        db.drivers().insert(&Driver::new("Amy")).await.unwrap();

        let names: Vec<String> = db.drivers().list().await.unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["Amy", "Zed"]);
    }
}
