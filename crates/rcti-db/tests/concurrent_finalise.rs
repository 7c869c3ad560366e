//! Concurrent finalisation against a file-backed database with a real
//! connection pool. Two writers race; SQLite serialises them on the opening
//! status write and the busy timeout.

use chrono::NaiveDate;
use rcti_core::{
    BillableRecord, DeductionKind, Driver, InvoiceStatus, InvoiceUpdate, Money, StandingDeduction,
    StateConflict, TaxStatus,
};
use rcti_db::{Database, DbConfig, RctiError};
use rust_decimal_macros::dec;
use std::time::Duration;

fn june(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
}

async fn file_db(dir: &tempfile::TempDir) -> Database {
    let config = DbConfig::new(dir.path().join("rcti.db"))
        .max_connections(4)
        .busy_timeout(Duration::from_secs(10));
    Database::new(config).await.unwrap()
}

async fn driver_with_lease(db: &Database) -> (Driver, StandingDeduction) {
    let driver = db.invoicing().register_driver(Driver::new("Sam Citizen")).await.unwrap();
    let record = BillableRecord::new(&driver.id, june(28), "Tray", dec!(8.5), Money::from_cents(8_500));
    db.invoicing().add_billable_record(record).await.unwrap();

    let lease = StandingDeduction::new(
        &driver.id,
        DeductionKind::Deduction,
        "Vehicle lease",
        Money::from_cents(100_000),
        Money::from_cents(15_000),
        june(1),
    );
    let lease = db.ledger().create_deduction(lease).await.unwrap();
    (driver, lease)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_same_invoice_finalised_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_db(&dir).await;
    let (driver, lease) = driver_with_lease(&db).await;
    let invoice = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap().invoice;

    let first = db.invoicing();
    let second = db.invoicing();
    let (a, b) = tokio::join!(
        first.finalise_invoice(&invoice.id),
        second.finalise_invoice(&invoice.id)
    );

    let (ok, err) = match (a, b) {
        (Ok(ok), Err(err)) | (Err(err), Ok(ok)) => (ok, err),
        (a, b) => panic!("expected exactly one success, got {:?} and {:?}", a.is_ok(), b.is_ok()),
    };
    assert_eq!(ok.deductions.applied_count, 1);
    assert!(matches!(
        err,
        RctiError::StateConflict(StateConflict::NotDraft { operation: "finalise", .. })
    ));

    let stored = db.invoices().get_by_id(&invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Finalised);

    let lease = db.deductions().get_by_id(&lease.id).await.unwrap().unwrap();
    assert_eq!(lease.amount_remaining.cents(), 85_000);
    assert_eq!(lease.amount_paid.cents(), 15_000);
    let applications = db.deductions().applications_for_invoice(&invoice.id).await.unwrap();
    assert_eq!(applications.len(), 1);

    db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_invoices_each_charge_one_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_db(&dir).await;
    let (driver, lease) = driver_with_lease(&db).await;

    let week_one = db.invoicing().create_invoice(&driver.id, june(23)).await.unwrap().invoice;
    let week_two = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap().invoice;

    let service = db.invoicing();
    let (a, b) = tokio::join!(
        service.finalise_invoice(&week_one.id),
        service.finalise_invoice(&week_two.id)
    );
    assert_eq!(a.unwrap().deductions.applied_count, 1);
    assert_eq!(b.unwrap().deductions.applied_count, 1);

    let lease = db.deductions().get_by_id(&lease.id).await.unwrap().unwrap();
    assert_eq!(lease.amount_paid.cents(), 30_000);
    assert_eq!(lease.amount_remaining.cents(), 70_000);

    let applications = db.deductions().applications_for_deduction(&lease.id).await.unwrap();
    assert_eq!(applications.len(), 2);
    assert!(applications.iter().all(|a| a.applied_amount.cents() == 15_000));

    db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_creates_get_distinct_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_db(&dir).await;
    let (driver, _) = driver_with_lease(&db).await;

    let service = db.invoicing();
    let (a, b) = tokio::join!(
        service.create_invoice(&driver.id, june(30)),
        service.create_invoice(&driver.id, june(30))
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.invoice.invoice_number, b.invoice.invoice_number);
    // The single shift lands on exactly one of them.
    assert_eq!(a.lines.len() + b.lines.len(), 1);

    db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_notes_update_racing_tax_change_keeps_invoice_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_db(&dir).await;
    let (driver, _) = driver_with_lease(&db).await;
    let id = db.invoicing().create_invoice(&driver.id, june(30)).await.unwrap().invoice.id;

    let service = db.invoicing();
    for round in 0..10 {
        let target = if round % 2 == 0 {
            TaxStatus::NotRegistered
        } else {
            TaxStatus::Registered
        };
        let tax = InvoiceUpdate {
            tax_status: Some(target),
            ..Default::default()
        };
        let notes = InvoiceUpdate {
            notes: Some(format!("round {round}")),
            ..Default::default()
        };
        let (a, b) = tokio::join!(service.update_invoice(&id, tax), service.update_invoice(&id, notes));
        a.unwrap();
        b.unwrap();

        let detail = service.get_invoice(&id).await.unwrap();
        assert_eq!(detail.invoice.tax_status, target);
        assert_eq!(detail.invoice.notes, Some(format!("round {round}")));
        let registered = detail.invoice.tax_status == TaxStatus::Registered;
        assert!(detail.lines.iter().all(|l| l.amounts.tax.is_zero() != registered));
        assert_eq!(detail.invoice.totals.tax.is_zero(), !registered);
    }

    db.close().await;
}
