//! # rcti-db: Store Layer for the RCTI Ledger
//!
//! Persists drivers, billable records, invoices and standing deductions in
//! SQLite through sqlx, and hosts the two services that own a unit of work:
//! the invoice service and the deduction ledger.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RCTI Ledger Data Flow                            │
//! │                                                                         │
//! │  Caller (HTTP handler, CLI, seed binary)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     rcti-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌────────────────┐   ┌───────────────┐   │   │
//! │  │   │ InvoiceService│   │ DeductionLedger│   │  Repositories │   │   │
//! │  │   │ (invoicing.rs)│──►│  (ledger.rs)   │──►│ driver.rs     │   │   │
//! │  │   │ create/final- │   │ CAS per        │   │ invoice.rs    │   │   │
//! │  │   │ ise/pay/lines │   │ deduction      │   │ deduction.rs  │   │   │
//! │  │   └───────┬───────┘   └────────────────┘   └───────┬───────┘   │   │
//! │  │           │  rcti-core: pricing, numbering,        │           │   │
//! │  │           │  lifecycle rules, deduction maths      │           │   │
//! │  │           ▼                                         ▼           │   │
//! │  │   ┌───────────────┐   ┌────────────────┐   ┌───────────────┐   │   │
//! │  │   │   Database    │   │   RctiConfig   │   │  Migrations   │   │   │
//! │  │   │   (pool.rs)   │◄──│  (config.rs)   │   │  (embedded)   │   │   │
//! │  │   └───────────────┘   └────────────────┘   └───────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (WAL, foreign keys on)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - TOML + environment configuration
//! - [`pool`] - Connection pool creation and service accessors
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Store and service error types
//! - [`repository`] - Row mapping and conditional writes
//! - [`invoicing`] - Invoice lifecycle operations
//! - [`ledger`] - Standing deductions and their applications
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rcti_db::{Database, RctiConfig};
//!
//! let config = RctiConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let detail = db.invoicing().create_invoice(&driver_id, period_ending).await?;
//! let outcome = db.invoicing().finalise_invoice(&detail.invoice.id).await?;
//! println!("applied {} deductions", outcome.deductions.applied_count);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod invoicing;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::RctiConfig;
pub use error::{ConfigError, DbError, DbResult, RctiError, RctiResult};
pub use invoicing::{FinaliseOutcome, InvoiceDetail, InvoiceService, ManualLine};
pub use ledger::{ApplyOutcome, DeductionLedger};
pub use pool::{Database, DbConfig};

pub use repository::deduction::DeductionRepository;
pub use repository::driver::DriverRepository;
pub use repository::invoice::InvoiceRepository;
