//! Balance Ledger
//!
//! The relational store is the only writer of balance truth. This module
//! defines the transaction options, the execution context that lets
//! repository calls join an active transaction, and the three capability
//! traits (accounts, purchases, transfers) every backend implements.
//!
//! # Execution context
//!
//! Every repository call takes an [`ExecCtx`]. It carries an optional
//! reference to the active transaction; the backend runs the statement on
//! that transaction when present, and on the base pool otherwise:
//!
//! ```text
//! TxManager::with_tx ──▶ ExecCtx::in_tx(&mut tx) ──▶ repo.get_account_by_id(ctx, ..)
//!                                                    repo.update_balance(ctx, ..)
//! plain call          ──▶ ExecCtx::pool()        ──▶ repo.get_account_by_username(ctx, ..)
//! ```

pub mod error;
pub mod memory;
pub mod postgres;
pub mod tx_manager;

use std::fmt;

use async_trait::async_trait;

use crate::core_types::{AccountId, Coins, EntityId};
use crate::models::{Account, NewAccount, NewPurchase, NewTransfer, Purchase, Transfer};

pub use error::LedgerError;
pub use memory::MemoryLedger;
pub use postgres::PgLedger;
pub use tx_manager::{TxError, TxManager};

// ============================================================================
// Transaction options
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AccessMode::ReadWrite => "READ WRITE",
            AccessMode::ReadOnly => "READ ONLY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub access: AccessMode,
}

impl TxOptions {
    /// Options for every balance mutation
    pub fn read_write_serializable() -> Self {
        Self {
            isolation: IsolationLevel::Serializable,
            access: AccessMode::ReadWrite,
        }
    }

    /// Options for read-only snapshots (account info)
    pub fn read_only_committed() -> Self {
        Self {
            isolation: IsolationLevel::ReadCommitted,
            access: AccessMode::ReadOnly,
        }
    }

    /// First statement issued inside a freshly begun PostgreSQL transaction
    pub fn set_transaction_sql(&self) -> String {
        format!(
            "SET TRANSACTION ISOLATION LEVEL {} {}",
            self.isolation.as_sql(),
            self.access.as_sql()
        )
    }
}

impl fmt::Display for TxOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.isolation.as_sql(), self.access.as_sql())
    }
}

// ============================================================================
// Execution context
// ============================================================================

/// Explicit execution context threaded through every repository call.
pub struct ExecCtx<'c, T> {
    tx: Option<&'c mut T>,
}

impl<'c, T> ExecCtx<'c, T> {
    /// No active transaction: statements run on the base pool
    pub fn pool() -> Self {
        Self { tx: None }
    }

    /// Statements join the given transaction
    pub fn in_tx(tx: &'c mut T) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn is_transactional(&self) -> bool {
        self.tx.is_some()
    }

    /// The active transaction, if any
    pub fn tx(&mut self) -> Option<&mut T> {
        self.tx.as_deref_mut()
    }
}

// ============================================================================
// Backend + capability traits
// ============================================================================

/// Transaction lifecycle of a ledger backend
#[async_trait]
pub trait TxBackend: Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self, opts: TxOptions) -> Result<Self::Tx, LedgerError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), LedgerError>;

    /// Returns `LedgerError::TxClosed` when the transaction is already gone
    async fn rollback(&self, tx: Self::Tx) -> Result<(), LedgerError>;
}

/// Account rows. No balance invariant is enforced here.
#[async_trait]
pub trait AccountRepository: TxBackend {
    /// Fails with `Conflict` if the username is taken
    async fn create_account(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        account: &NewAccount,
    ) -> Result<AccountId, LedgerError>;

    async fn get_account_by_id(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        account_id: AccountId,
    ) -> Result<Account, LedgerError>;

    async fn get_account_by_username(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        username: &str,
    ) -> Result<Account, LedgerError>;

    /// Fails with `NotFound` when no row was affected
    async fn update_balance(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        account_id: AccountId,
        new_balance: Coins,
    ) -> Result<(), LedgerError>;

    /// Page of `(id, balance)` with `id > after`, ordered by id
    async fn list_balances(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        after: AccountId,
        limit: i64,
    ) -> Result<Vec<(AccountId, Coins)>, LedgerError>;
}

/// Append-only purchase records
#[async_trait]
pub trait PurchaseRepository: TxBackend {
    async fn create_purchase(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        purchase: &NewPurchase,
    ) -> Result<EntityId, LedgerError>;

    async fn get_purchases_by_account(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        account_id: AccountId,
    ) -> Result<Vec<Purchase>, LedgerError>;
}

/// Append-only coin transfer records
#[async_trait]
pub trait TransferRepository: TxBackend {
    async fn create_transfer(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        transfer: &NewTransfer,
    ) -> Result<EntityId, LedgerError>;

    /// Transfers where the account is sender OR receiver
    async fn get_transfers_by_account(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        account_id: AccountId,
    ) -> Result<Vec<Transfer>, LedgerError>;
}

/// A backend providing all three capabilities
pub trait Ledger: AccountRepository + PurchaseRepository + TransferRepository {}

impl<T> Ledger for T where T: AccountRepository + PurchaseRepository + TransferRepository {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_transaction_sql() {
        assert_eq!(
            TxOptions::read_write_serializable().set_transaction_sql(),
            "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE READ WRITE"
        );
        assert_eq!(
            TxOptions::read_only_committed().set_transaction_sql(),
            "SET TRANSACTION ISOLATION LEVEL READ COMMITTED READ ONLY"
        );
    }

    #[test]
    fn test_exec_ctx_resolution() {
        let mut tx = 7u32;
        let mut ctx = ExecCtx::in_tx(&mut tx);
        assert!(ctx.is_transactional());
        if let Some(t) = ctx.tx() {
            *t += 1;
        }
        assert_eq!(tx, 8);

        let mut pool_ctx: ExecCtx<'_, u32> = ExecCtx::pool();
        assert!(!pool_ctx.is_transactional());
        assert!(pool_ctx.tx().is_none());
    }
}
