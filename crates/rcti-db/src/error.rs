//! # Database Error Types
//!
//! Error types for the store layer.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       │     ValidationError / StateConflict (rcti-core)                │
//! │       │            │                                                    │
//! │       ▼            ▼                                                    │
//! │  RctiError ← What InvoiceService / DeductionLedger callers see         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A unit of work that fails with any of these rolls back completely.

use rcti_core::{CoreError, StateConflict, ValidationError};
use thiserror::Error;

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Two invoices generated the same invoice number
    /// - Any UNIQUE index violation
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Invoice for a driver that does not exist
    /// - Application for a deduction that does not exist
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A stored value could not be decoded into a domain type.
    ///
    /// ## When This Occurs
    /// - Decimal column holding text that does not parse
    /// - Date column in an unexpected format
    #[error("Invalid data in {column}: {reason}")]
    InvalidData { column: String, reason: String },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn invalid_data(column: impl Into<String>, reason: impl ToString) -> Self {
        DbError::InvalidData {
            column: column.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the violated UNIQUE constraint mentions `column`.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { field, .. } if field.contains(column))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::ColumnDecode   → DbError::InvalidData
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite constraint messages:
                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::ColumnDecode { index, source } => DbError::InvalidData {
                column: index,
                reason: source.to_string(),
            },

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Service Error
// =============================================================================

/// Errors returned by the invoice service and the deduction ledger.
#[derive(Debug, Error)]
pub enum RctiError {
    /// Input rejected before anything ran.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A lifecycle or ledger rule refused the mutation.
    #[error(transparent)]
    StateConflict(#[from] StateConflict),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Store failure; the unit of work was rolled back.
    #[error(transparent)]
    Persistence(#[from] DbError),
}

impl RctiError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        RctiError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<CoreError> for RctiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => RctiError::Validation(e),
            CoreError::StateConflict(e) => RctiError::StateConflict(e),
        }
    }
}

impl From<sqlx::Error> for RctiError {
    fn from(err: sqlx::Error) -> Self {
        RctiError::Persistence(err.into())
    }
}

pub type RctiResult<T> = Result<T, RctiError>;

// =============================================================================
// Config Error
// =============================================================================

/// Errors loading or validating [`crate::config::RctiConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_detection() {
        let err = DbError::duplicate("invoices.invoice_number", "RCTI-20240630-SMITH");
        assert!(err.is_unique_violation_on("invoice_number"));
        assert!(!err.is_unique_violation_on("id"));
        assert!(!DbError::PoolExhausted.is_unique_violation_on("invoice_number"));
    }

    #[test]
    fn test_core_errors_keep_their_category() {
        let err: RctiError = CoreError::from(StateConflict::PaidIsImmutable).into();
        assert!(matches!(err, RctiError::StateConflict(StateConflict::PaidIsImmutable)));

        let err: RctiError = ValidationError::EmptyUpdate.into();
        assert_eq!(err.to_string(), "update request contains no changes");
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
