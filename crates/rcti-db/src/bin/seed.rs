//! # Seed Data Generator
//!
//! Populates a development database with drivers, a week of shifts and
//! standing deductions, then runs every driver's invoice through
//! create → finalise, paying the first one.
//!
//! ## Usage
//! ```bash
//! # Use rcti.toml (or defaults) for the database location
//! cargo run -p rcti-db --bin seed
//!
//! # Specify database path
//! cargo run -p rcti-db --bin seed -- --db ./data/rcti.db
//!
//! # Specify config file and period end
//! cargo run -p rcti-db --bin seed -- --config ./rcti.toml --period 2024-06-30
//! ```
//!
//! ## Generated Drivers
//! - GST-registered, tax-exclusive, 30 min breaks, tolls, 5% fuel levy
//! - GST-registered, tax-inclusive, no extras
//! - Not registered for GST, tolls only

use chrono::{Days, NaiveDate};
use rcti_core::{
    BillableRecord, DeductionKind, Driver, Money, StandingDeduction, TaxMode, TaxStatus, TollTrips,
};
use rcti_db::{Database, RctiConfig};
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// (name, business name, tax status, tax mode, break hours, tolls, levy %)
const DRIVERS: &[(&str, Option<&str>, TaxStatus, TaxMode, Option<i64>, bool, i64)] = &[
    (
        "Sam Citizen",
        Some("Citizen Haulage"),
        TaxStatus::Registered,
        TaxMode::Exclusive,
        Some(5),
        true,
        5,
    ),
    (
        "Priya Nair",
        None,
        TaxStatus::Registered,
        TaxMode::Inclusive,
        None,
        false,
        0,
    ),
    (
        "Tom O'Brien",
        None,
        TaxStatus::NotRegistered,
        TaxMode::Exclusive,
        None,
        true,
        0,
    ),
];

/// (vehicle class, hourly rate in cents)
const CLASSES: &[(&str, i64)] = &[("Tray", 8_500), ("Crane", 11_000), ("Van", 6_800)];

/// Shift lengths in tenths of an hour, one per weekday.
const SHIFT_TENTHS: &[i64] = &[85, 80, 95, 76, 90];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut period_ending = NaiveDate::from_ymd_opt(2024, 6, 30).ok_or("invalid default period")?;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--period" | "-p" => {
                if i + 1 < args.len() {
                    period_ending = NaiveDate::parse_from_str(&args[i + 1], "%Y-%m-%d")?;
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("RCTI Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>          Database file path (overrides config)");
                println!("  -c, --config <PATH>      Config file (default: platform config dir)");
                println!("  -p, --period <DATE>      Period ending, YYYY-MM-DD (default: 2024-06-30)");
                println!("  -h, --help               Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = RctiConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("RCTI Ledger Seed Data Generator");
    println!("===============================");
    println!("Database: {}", config.database.path.display());
    println!("Period ending: {}", period_ending);
    println!();

    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::new(config.db_config()).await?;
    let invoicing = db
        .invoicing()
        .with_max_number_attempts(config.invoicing.max_number_attempts);

    let existing = db.drivers().list().await?;
    if !existing.is_empty() {
        println!("Database already has {} drivers", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let week_start = period_ending
        .checked_sub_days(Days::new(6))
        .ok_or("period ending too early")?;

    let mut driver_ids = Vec::new();
    for (idx, (name, business, status, mode, break_tenths, tolls, levy)) in
        DRIVERS.iter().enumerate()
    {
        let mut driver = Driver::new(*name);
        driver.business_name = business.map(str::to_string);
        driver.bank.account_name = Some(name.to_string());
        driver.bank.bsb = Some(format!("06{}-000", idx));
        driver.bank.account_number = Some(format!("1000{:04}", idx + 1));
        driver.billing.tax_status = *status;
        driver.billing.tax_mode = *mode;
        driver.billing.break_hours_per_shift = break_tenths.map(|t| Decimal::new(t, 1));
        driver.billing.tolls_enabled = *tolls;
        driver.billing.fuel_levy_percent = Decimal::from(*levy);
        let driver = invoicing.register_driver(driver).await?;

        let (class, rate_cents) = CLASSES[idx % CLASSES.len()];
        for (day, tenths) in SHIFT_TENTHS.iter().enumerate() {
            let work_date = week_start
                .checked_add_days(Days::new(day as u64))
                .ok_or("date out of range")?;
            let mut record = BillableRecord::new(
                &driver.id,
                work_date,
                class,
                Decimal::new(*tenths, 1),
                Money::from_cents(rate_cents),
            );
            record.toll_trips = TollTrips {
                eastlink: (day % 2) as i64,
                citylink: (day % 3 == 0) as i64,
            };
            invoicing.add_billable_record(record).await?;
        }

        driver_ids.push(driver.id);
    }
    println!("✓ Created {} drivers with {} shifts each", driver_ids.len(), SHIFT_TENTHS.len());

    let lease = StandingDeduction::new(
        &driver_ids[0],
        DeductionKind::Deduction,
        "Vehicle lease",
        Money::from_cents(100_000),
        Money::from_cents(15_000),
        week_start,
    );
    db.ledger().create_deduction(lease).await?;
    let refund = StandingDeduction::new(
        &driver_ids[0],
        DeductionKind::Reimbursement,
        "Uniform refund",
        Money::from_cents(6_000),
        Money::from_cents(2_000),
        week_start,
    );
    db.ledger().create_deduction(refund).await?;
    println!("✓ Created standing deductions");
    println!();

    for (idx, driver_id) in driver_ids.iter().enumerate() {
        let detail = invoicing.create_invoice(driver_id, period_ending).await?;
        let outcome = invoicing.finalise_invoice(&detail.invoice.id).await?;

        println!(
            "  {}  {} lines  subtotal {}  tax {}  total {}  net deductions {}",
            outcome.invoice.invoice_number,
            detail.lines.len(),
            outcome.invoice.totals.subtotal,
            outcome.invoice.totals.tax,
            outcome.invoice.totals.total,
            outcome.deductions.net_adjustment(),
        );

        if idx == 0 {
            let paid = invoicing.pay_invoice(&outcome.invoice.id).await?;
            info!(invoice_number = %paid.invoice_number, "Marked first invoice paid");
            println!();
            println!("{}", serde_json::to_string_pretty(&invoicing.get_invoice(&paid.id).await?)?);
            println!();
        }
    }

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}
