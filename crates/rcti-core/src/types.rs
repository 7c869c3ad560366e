//! # Domain Types
//!
//! Core domain types used throughout the RCTI ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Driver      │   │     Invoice     │   │   InvoiceLine   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │──►│  payee snapshot │◄──│  invoice_id     │       │
//! │  │  bank details   │   │  invoice_number │   │  units × rate   │       │
//! │  │  billing        │   │  status, totals │   │  ex / tax / inc │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ BillableRecord  │   │  TaxStatus      │   │ InvoiceStatus   │       │
//! │  │  hours, rate    │   │  Registered     │   │  Draft          │       │
//! │  │  vehicle class  │   │  NotRegistered  │   │  Finalised      │       │
//! │  │  toll trips     │   │  TaxMode        │   │  Paid           │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! An invoice copies the driver's name, business, address, tax id and bank
//! details when it is created. Editing the driver later never rewrites an
//! issued invoice.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so GST at 10% is 1000 bps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a fraction (`1000` bps → `0.1000`).
    #[inline]
    pub fn as_decimal(&self) -> Decimal {
        Decimal::new(i64::from(self.0), 4)
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Tax Settings
// =============================================================================

/// Whether the payee is registered for GST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TaxStatus {
    /// GST is charged on top of (or carved out of) every line.
    #[default]
    Registered,
    /// No GST on any line; ex-tax equals inc-tax.
    NotRegistered,
}

impl TaxStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TaxStatus::Registered => "registered",
            TaxStatus::NotRegistered => "not_registered",
        }
    }
}

impl fmt::Display for TaxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaxStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "registered" => Ok(TaxStatus::Registered),
            "not_registered" | "not-registered" => Ok(TaxStatus::NotRegistered),
            _ => Err(ValidationError::not_allowed(
                "tax status",
                &["registered", "not_registered"],
            )),
        }
    }
}

/// Whether an entered rate already includes GST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TaxMode {
    /// Rate is ex-GST; tax is added on top.
    #[default]
    Exclusive,
    /// Rate is inc-GST; tax is carved out.
    Inclusive,
}

impl TaxMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TaxMode::Exclusive => "exclusive",
            TaxMode::Inclusive => "inclusive",
        }
    }
}

impl fmt::Display for TaxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaxMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exclusive" => Ok(TaxMode::Exclusive),
            "inclusive" => Ok(TaxMode::Inclusive),
            _ => Err(ValidationError::not_allowed(
                "tax mode",
                &["exclusive", "inclusive"],
            )),
        }
    }
}

// =============================================================================
// Invoice Status
// =============================================================================

/// Lifecycle status of an invoice: draft → finalised → paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Lines and totals may still change.
    #[default]
    Draft,
    /// Issued; deductions have been applied.
    Finalised,
    /// Terminal.
    Paid,
}

impl InvoiceStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [InvoiceStatus; 3] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Finalised,
        InvoiceStatus::Paid,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Finalised => "finalised",
            InvoiceStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(InvoiceStatus::Draft),
            "finalised" | "finalized" => Ok(InvoiceStatus::Finalised),
            "paid" => Ok(InvoiceStatus::Paid),
            _ => Err(ValidationError::not_allowed(
                "status",
                &["draft", "finalised", "paid"],
            )),
        }
    }
}

// =============================================================================
// Line Kind
// =============================================================================

/// Where an invoice line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// Priced from a billable record.
    Ordinary,
    /// Unpaid-break deduction for one vehicle class.
    Break,
    /// Toll-network surcharge.
    Toll,
    /// Percentage fuel levy.
    FuelLevy,
    /// Entered by hand on a draft.
    Manual,
}

impl LineKind {
    /// Lines that count towards the fuel-levy base.
    pub const fn is_ordinary(&self) -> bool {
        matches!(self, LineKind::Ordinary)
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Bank account the payee is paid into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub account_name: Option<String>,
    pub bsb: Option<String>,
    pub account_number: Option<String>,
}

/// Per-driver settings that drive line generation and GST treatment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSettings {
    pub tax_status: TaxStatus,
    pub tax_mode: TaxMode,
    /// Unpaid break deducted per shift, in hours. `None` disables break lines.
    pub break_hours_per_shift: Option<Decimal>,
    /// Whether toll trips are charged back as surcharge lines.
    pub tolls_enabled: bool,
    /// Fuel levy in percent (`10` = 10%). Zero disables the levy line.
    pub fuel_levy_percent: Decimal,
}

impl Default for BillingSettings {
    fn default() -> Self {
        BillingSettings {
            tax_status: TaxStatus::Registered,
            tax_mode: TaxMode::Exclusive,
            break_hours_per_shift: None,
            tolls_enabled: false,
            fuel_levy_percent: Decimal::ZERO,
        }
    }
}

/// A contractor driver, the payee of an RCTI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub name: String,
    pub business_name: Option<String>,
    pub address: Option<String>,
    /// Australian Business Number or equivalent tax id.
    pub tax_id: Option<String>,
    pub bank: BankDetails,
    pub billing: BillingSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    /// Creates a driver with a fresh id and default billing settings.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Driver {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            business_name: None,
            address: None,
            tax_id: None,
            bank: BankDetails::default(),
            billing: BillingSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Freezes the payee details for a new invoice.
    pub fn snapshot(&self) -> PayeeSnapshot {
        PayeeSnapshot {
            name: self.name.clone(),
            business_name: self.business_name.clone(),
            address: self.address.clone(),
            tax_id: self.tax_id.clone(),
            bank: self.bank.clone(),
        }
    }
}

/// Driver details as they were when an invoice was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayeeSnapshot {
    pub name: String,
    pub business_name: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
    pub bank: BankDetails,
}

impl PayeeSnapshot {
    /// The name printed on the invoice: business name if present.
    pub fn display_name(&self) -> &str {
        self.business_name
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

// =============================================================================
// Billable Record
// =============================================================================

/// Toll trips taken during one shift, per network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TollTrips {
    pub eastlink: i64,
    pub citylink: i64,
}

/// One shift of work waiting to be invoiced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillableRecord {
    pub id: String,
    pub driver_id: String,
    pub work_date: NaiveDate,
    /// Vehicle class label, e.g. "Tray" or "Crane".
    pub vehicle_class: String,
    pub hours: Decimal,
    pub rate: Money,
    pub toll_trips: TollTrips,
    /// Set once the record has been billed on an invoice.
    pub invoice_id: Option<String>,
}

impl BillableRecord {
    /// Creates an unbilled record with a fresh id and no toll trips.
    pub fn new(
        driver_id: impl Into<String>,
        work_date: NaiveDate,
        vehicle_class: impl Into<String>,
        hours: Decimal,
        rate: Money,
    ) -> Self {
        BillableRecord {
            id: Uuid::new_v4().to_string(),
            driver_id: driver_id.into(),
            work_date,
            vehicle_class: vehicle_class.into(),
            hours,
            rate,
            toll_trips: TollTrips::default(),
            invoice_id: None,
        }
    }
}

// =============================================================================
// Line Amounts & Lines
// =============================================================================

/// The GST split of a single line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    pub ex_tax: Money,
    pub tax: Money,
    pub inc_tax: Money,
}

/// Anything that carries a priced line amount.
pub trait Priced {
    fn amounts(&self) -> LineAmounts;
    fn kind(&self) -> LineKind;
}

/// A priced line that has not been attached to an invoice yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDraft {
    pub source_record_id: Option<String>,
    pub line_date: NaiveDate,
    pub kind: LineKind,
    pub category: String,
    pub units: Decimal,
    pub rate: Money,
    pub amounts: LineAmounts,
}

impl Priced for LineDraft {
    fn amounts(&self) -> LineAmounts {
        self.amounts
    }

    fn kind(&self) -> LineKind {
        self.kind
    }
}

/// A line owned by an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: String,
    pub invoice_id: String,
    /// Billable record the line was priced from; `None` for synthetic lines.
    pub source_record_id: Option<String>,
    pub line_date: NaiveDate,
    pub kind: LineKind,
    pub category: String,
    pub units: Decimal,
    pub rate: Money,
    pub amounts: LineAmounts,
}

impl InvoiceLine {
    /// Attaches a draft line to an invoice under a fresh id.
    pub fn from_draft(invoice_id: impl Into<String>, draft: LineDraft) -> Self {
        InvoiceLine {
            id: Uuid::new_v4().to_string(),
            invoice_id: invoice_id.into(),
            source_record_id: draft.source_record_id,
            line_date: draft.line_date,
            kind: draft.kind,
            category: draft.category,
            units: draft.units,
            rate: draft.rate,
            amounts: draft.amounts,
        }
    }
}

impl Priced for InvoiceLine {
    fn amounts(&self) -> LineAmounts {
        self.amounts
    }

    fn kind(&self) -> LineKind {
        self.kind
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// Period totals of an invoice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

/// A recipient-created tax invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub driver_id: String,
    pub invoice_number: String,
    pub period_ending: NaiveDate,
    /// Payee details frozen at creation.
    pub payee: PayeeSnapshot,
    pub tax_status: TaxStatus,
    pub tax_mode: TaxMode,
    pub totals: InvoiceTotals,
    pub status: InvoiceStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// A new empty draft for `driver`, priced under the driver's current
    /// tax settings.
    pub fn draft(driver: &Driver, invoice_number: impl Into<String>, period_ending: NaiveDate) -> Self {
        let now = Utc::now();
        Invoice {
            id: Uuid::new_v4().to_string(),
            driver_id: driver.id.clone(),
            invoice_number: invoice_number.into(),
            period_ending,
            payee: driver.snapshot(),
            tax_status: driver.billing.tax_status,
            tax_mode: driver.billing.tax_mode,
            totals: InvoiceTotals::default(),
            status: InvoiceStatus::Draft,
            paid_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tax_rate_as_decimal() {
        let rate = TaxRate::from_bps(1000);
        assert_eq!(rate.bps(), 1000);
        assert_eq!(rate.as_decimal(), dec!(0.1));
    }

    #[test]
    fn test_tax_status_parsing() {
        assert_eq!("registered".parse::<TaxStatus>().unwrap(), TaxStatus::Registered);
        assert_eq!(
            "Not_Registered".parse::<TaxStatus>().unwrap(),
            TaxStatus::NotRegistered
        );
        let err = "exempt".parse::<TaxStatus>().unwrap_err();
        assert!(matches!(err, ValidationError::NotAllowed { .. }));
    }

    #[test]
    fn test_tax_mode_parsing() {
        assert_eq!("inclusive".parse::<TaxMode>().unwrap(), TaxMode::Inclusive);
        assert!("gross".parse::<TaxMode>().is_err());
    }

    #[test]
    fn test_invoice_status_round_trips_through_text() {
        for status in InvoiceStatus::ALL {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
        }
        assert_eq!(InvoiceStatus::default(), InvoiceStatus::Draft);
    }

    #[test]
    fn test_snapshot_is_detached_from_driver() {
        let mut driver = Driver::new("Sam Citizen");
        driver.business_name = Some("Citizen Haulage".to_string());
        let snapshot = driver.snapshot();

        driver.business_name = Some("Renamed Pty Ltd".to_string());
        assert_eq!(snapshot.display_name(), "Citizen Haulage");
    }

    #[test]
    fn test_display_name_falls_back_to_driver_name() {
        let driver = Driver::new("Sam Citizen");
        assert_eq!(driver.snapshot().display_name(), "Sam Citizen");
    }
}
