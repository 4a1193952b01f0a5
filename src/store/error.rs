//! Store Error Types
//!
//! Every service operation fails with one of these. `code()` and
//! `http_status()` feed the gateway's error responses.

use thiserror::Error;

use crate::cache::CacheError;
use crate::ledger::{LedgerError, TxError};
use crate::user_auth::AuthError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Account or merch item absent
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Raised by the fast-path cache check or the ledger check alike
    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization conflict that outlived the retry budget.
    /// The whole operation may be retried.
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    /// The ledger committed but the cache could not be brought in line
    #[error("Ledger committed, cache sync failed: {0}")]
    CacheSyncFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::Conflict(_) => "CONFLICT",
            StoreError::InvalidCredentials => "INVALID_CREDENTIALS",
            StoreError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            StoreError::InvalidArgument(_) => "INVALID_ARGUMENT",
            StoreError::TransactionAborted(_) => "TRANSACTION_ABORTED",
            StoreError::CacheSyncFailed(_) => "CACHE_SYNC_FAILED",
            StoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            StoreError::InvalidArgument(_) => 400,
            StoreError::InvalidCredentials => 401,
            StoreError::NotFound(_) => 404,
            StoreError::Conflict(_) | StoreError::TransactionAborted(_) => 409,
            StoreError::InsufficientFunds => 422,
            StoreError::CacheSyncFailed(_) | StoreError::Internal(_) => 500,
        }
    }

    /// Whether re-running the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::TransactionAborted(_))
    }
}

impl From<LedgerError> for StoreError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(what) => StoreError::NotFound(what),
            LedgerError::Conflict(what) => StoreError::Conflict(what),
            LedgerError::SerializationFailure(msg) => StoreError::TransactionAborted(msg),
            other => StoreError::Internal(other.to_string()),
        }
    }
}

impl From<CacheError> for StoreError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::InsufficientFunds(_) => StoreError::InsufficientFunds,
            CacheError::UnknownMerch(name) => StoreError::NotFound(format!("merch '{}'", name)),
            other => StoreError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for StoreError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidToken => StoreError::InvalidCredentials,
            other => StoreError::Internal(other.to_string()),
        }
    }
}

impl TxError for StoreError {
    fn is_serialization_failure(&self) -> bool {
        matches!(self, StoreError::TransactionAborted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreError::InsufficientFunds.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(
            StoreError::InvalidArgument("x".into()).code(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(StoreError::InvalidCredentials.code(), "INVALID_CREDENTIALS");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(StoreError::InvalidArgument("x".into()).http_status(), 400);
        assert_eq!(StoreError::InvalidCredentials.http_status(), 401);
        assert_eq!(StoreError::NotFound("x".into()).http_status(), 404);
        assert_eq!(StoreError::TransactionAborted("x".into()).http_status(), 409);
        assert_eq!(StoreError::InsufficientFunds.http_status(), 422);
        assert_eq!(StoreError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn test_ledger_classification() {
        assert_eq!(
            StoreError::from(LedgerError::SerializationFailure("40001".into())),
            StoreError::TransactionAborted("40001".into())
        );
        assert!(StoreError::from(LedgerError::SerializationFailure("x".into())).is_retryable());
        assert_eq!(
            StoreError::from(LedgerError::Conflict("dup".into())),
            StoreError::Conflict("dup".into())
        );
        assert!(matches!(
            StoreError::from(LedgerError::Commit("reset".into())),
            StoreError::Internal(_)
        ));
        assert!(matches!(
            StoreError::from(LedgerError::TxClosed),
            StoreError::Internal(_)
        ));
    }

    #[test]
    fn test_cache_classification() {
        assert_eq!(
            StoreError::from(CacheError::InsufficientFunds(3)),
            StoreError::InsufficientFunds
        );
        assert_eq!(
            StoreError::from(CacheError::UnknownMerch("yacht".into())),
            StoreError::NotFound("merch 'yacht'".into())
        );
    }
}
