//! Ledger Error Types

use thiserror::Error;

/// Errors raised by the relational ledger and its transaction manager
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violated (duplicate username)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// SQLSTATE 40001 / 40P01. The whole unit of work may be retried.
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    #[error("Failed to begin transaction: {0}")]
    Begin(String),

    /// Commit itself failed after the unit of work succeeded.
    /// Nothing was persisted.
    #[error("Failed to commit transaction: {0}")]
    Commit(String),

    /// Rollback against a transaction whose connection is already gone
    #[error("Transaction already closed")]
    TxClosed,

    #[error("Database error: {0}")]
    Database(String),
}

impl LedgerError {
    /// Classify a PostgreSQL SQLSTATE code
    pub fn from_sqlstate(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Some("40001") | Some("40P01") => LedgerError::SerializationFailure(message),
            Some("23505") => LedgerError::Conflict(message),
            _ => LedgerError::Database(message),
        }
    }

    pub fn is_serialization_failure(&self) -> bool {
        matches!(self, LedgerError::SerializationFailure(_))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => LedgerError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) => {
                LedgerError::from_sqlstate(db.code().as_deref(), db.message())
            }
            _ => LedgerError::Database(e.to_string()),
        }
    }
}
