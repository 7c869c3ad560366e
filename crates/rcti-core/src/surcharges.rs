//! # Surcharge Lines
//!
//! Toll and fuel-levy lines added on top of the period's ordinary work,
//! plus the pipeline that assembles a complete line set from billable
//! records.
//!
//! ## Line Assembly
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BillableRecord[]                                                       │
//! │       │ price_record (per record)                                       │
//! │       ▼                                                                 │
//! │  ordinary lines ──┬──► compute_break_lines   ──► break lines            │
//! │                   ├──► compute_fuel_levy_line ─► levy line              │
//! │  records ─────────┴──► compute_toll_lines    ──► toll lines             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ordinary + break + toll + levy  (in that order)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every surcharge is priced through the line calculator with one unit at
//! the surcharge amount, so its GST treatment matches the invoice.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::breaks::compute_break_lines;
use crate::calculator::compute_line_amounts;
use crate::money::Money;
use crate::types::{
    BillableRecord, BillingSettings, LineDraft, LineKind, Priced, TaxMode, TaxStatus, TollTrips,
};

/// Category label of the fuel levy line.
pub const FUEL_LEVY_CATEGORY: &str = "Fuel levy";

// =============================================================================
// Toll Networks
// =============================================================================

/// The toll networks drivers are reimbursed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TollNetwork {
    EastLink,
    CityLink,
}

impl TollNetwork {
    pub const ALL: [TollNetwork; 2] = [TollNetwork::EastLink, TollNetwork::CityLink];

    /// Flat charge per trip on this network.
    pub fn per_trip_rate(&self) -> Money {
        match self {
            TollNetwork::EastLink => Money::from_cents(850),
            TollNetwork::CityLink => Money::from_cents(1050),
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            TollNetwork::EastLink => "EastLink tolls",
            TollNetwork::CityLink => "CityLink tolls",
        }
    }

    /// Trips recorded against this network.
    pub fn trips(&self, trips: &TollTrips) -> i64 {
        match self {
            TollNetwork::EastLink => trips.eastlink,
            TollNetwork::CityLink => trips.citylink,
        }
    }
}

fn surcharge_line(
    kind: LineKind,
    category: &str,
    amount: Money,
    line_date: NaiveDate,
    tax_status: TaxStatus,
    tax_mode: TaxMode,
) -> LineDraft {
    LineDraft {
        source_record_id: None,
        line_date,
        kind,
        category: category.to_string(),
        units: Decimal::ONE,
        rate: amount,
        amounts: compute_line_amounts(Decimal::ONE, amount, tax_status, tax_mode),
    }
}

/// Emits at most one line per toll network for the period.
///
/// Trips are summed across all records; a network with no trips, or a
/// driver without tolls enabled, produces nothing.
pub fn compute_toll_lines(
    records: &[BillableRecord],
    tolls_enabled: bool,
    tax_status: TaxStatus,
    tax_mode: TaxMode,
    line_date: NaiveDate,
) -> Vec<LineDraft> {
    if !tolls_enabled {
        return Vec::new();
    }

    TollNetwork::ALL
        .iter()
        .filter_map(|network| {
            let trips: i64 = records.iter().map(|r| network.trips(&r.toll_trips)).sum();
            if trips <= 0 {
                return None;
            }
            let amount = network.per_trip_rate().multiply(Decimal::from(trips));
            Some(surcharge_line(
                LineKind::Toll,
                network.label(),
                amount,
                line_date,
                tax_status,
                tax_mode,
            ))
        })
        .collect()
}

/// Emits the fuel levy line: `levy_percent`% of the ordinary-line subtotal.
///
/// Break, toll, levy and manual lines are excluded from the base. A zero
/// percentage produces no line.
pub fn compute_fuel_levy_line<T: Priced>(
    lines: &[T],
    levy_percent: Decimal,
    tax_status: TaxStatus,
    tax_mode: TaxMode,
    line_date: NaiveDate,
) -> Option<LineDraft> {
    if levy_percent.is_zero() {
        return None;
    }

    let base: Money = lines
        .iter()
        .filter(|l| l.kind().is_ordinary())
        .map(|l| l.amounts().ex_tax)
        .sum();
    let levy = base.percentage(levy_percent);

    Some(surcharge_line(
        LineKind::FuelLevy,
        FUEL_LEVY_CATEGORY,
        levy,
        line_date,
        tax_status,
        tax_mode,
    ))
}

// =============================================================================
// Assembly
// =============================================================================

/// Prices one billable record as an ordinary line.
pub fn price_record(record: &BillableRecord, tax_status: TaxStatus, tax_mode: TaxMode) -> LineDraft {
    LineDraft {
        source_record_id: Some(record.id.clone()),
        line_date: record.work_date,
        kind: LineKind::Ordinary,
        category: record.vehicle_class.clone(),
        units: record.hours,
        rate: record.rate,
        amounts: compute_line_amounts(record.hours, record.rate, tax_status, tax_mode),
    }
}

/// Builds the full line set of an invoice from the period's records.
pub fn build_invoice_lines(
    billing: &BillingSettings,
    records: &[BillableRecord],
    period_ending: NaiveDate,
) -> Vec<LineDraft> {
    let status = billing.tax_status;
    let mode = billing.tax_mode;

    let mut lines: Vec<LineDraft> = records.iter().map(|r| price_record(r, status, mode)).collect();

    let breaks = compute_break_lines(&lines, billing.break_hours_per_shift, status, mode);
    let tolls = compute_toll_lines(records, billing.tolls_enabled, status, mode, period_ending);
    let levy = compute_fuel_levy_line(&lines, billing.fuel_levy_percent, status, mode, period_ending);

    lines.extend(breaks);
    lines.extend(tolls);
    lines.extend(levy);
    lines
}

// =============================================================================
// Unit Tests
// =============================================================================
