//! In-memory ledger backend
//!
//! Used by `--in-memory` local runs and by the test suite. Semantics match
//! the PostgreSQL backend where the service can observe them:
//!
//! - unique usernames (`Conflict`), `NotFound` on missing rows
//! - a transaction works on a private snapshot; nothing is visible to
//!   others until commit, and rollback discards the snapshot
//! - commit-time validation: a writing transaction whose snapshot is older
//!   than the last committed write fails with `SerializationFailure`,
//!   so committed history is always equivalent to a serial order
//! - read-only transactions reject writes

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    AccessMode, AccountRepository, ExecCtx, LedgerError, PurchaseRepository, TransferRepository,
    TxBackend, TxOptions,
};
use crate::core_types::{AccountId, Coins, EntityId};
use crate::models::{Account, NewAccount, NewPurchase, NewTransfer, Purchase, Transfer};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    /// Bumped on every committed write
    version: u64,
    next_account_id: AccountId,
    next_purchase_id: EntityId,
    next_transfer_id: EntityId,
    accounts: BTreeMap<AccountId, Account>,
    purchases: Vec<Purchase>,
    transfers: Vec<Transfer>,
}

impl LedgerState {
    fn account(&self, account_id: AccountId) -> Result<&Account, LedgerError> {
        self.accounts
            .get(&account_id)
            .ok_or_else(|| LedgerError::NotFound(format!("account {}", account_id)))
    }
}

/// Open transaction on a [`MemoryLedger`]
#[derive(Debug)]
pub struct MemoryTx {
    snapshot: LedgerState,
    base_version: u64,
    access: AccessMode,
    dirty: bool,
}

/// In-memory ledger
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` against the transaction snapshot, or directly against the
    /// committed state (autocommit) when the context has no transaction.
    fn run<R>(
        &self,
        ctx: &mut ExecCtx<'_, MemoryTx>,
        writes: bool,
        op: impl FnOnce(&mut LedgerState) -> Result<R, LedgerError>,
    ) -> Result<R, LedgerError> {
        match ctx.tx() {
            Some(tx) => {
                if writes && tx.access == AccessMode::ReadOnly {
                    return Err(LedgerError::Database(
                        "cannot execute write in a read-only transaction".to_string(),
                    ));
                }
                let out = op(&mut tx.snapshot)?;
                tx.dirty |= writes;
                Ok(out)
            }
            None => {
                let mut state = self
                    .state
                    .lock()
                    .map_err(|_| LedgerError::Database("ledger state poisoned".to_string()))?;
                let out = op(&mut state)?;
                if writes {
                    state.version += 1;
                }
                Ok(out)
            }
        }
    }
}

#[async_trait]
impl TxBackend for MemoryLedger {
    type Tx = MemoryTx;

    async fn begin(&self, opts: TxOptions) -> Result<Self::Tx, LedgerError> {
        let state = self
            .state
            .lock()
            .map_err(|_| LedgerError::Begin("ledger state poisoned".to_string()))?;
        Ok(MemoryTx {
            snapshot: state.clone(),
            base_version: state.version,
            access: opts.access,
            dirty: false,
        })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), LedgerError> {
        if !tx.dirty {
            return Ok(());
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| LedgerError::Commit("ledger state poisoned".to_string()))?;
        if state.version != tx.base_version {
            return Err(LedgerError::SerializationFailure(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }
        let mut snapshot = tx.snapshot;
        snapshot.version = state.version + 1;
        *state = snapshot;
        Ok(())
    }

    async fn rollback(&self, _tx: Self::Tx) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for MemoryLedger {
    async fn create_account(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        account: &NewAccount,
    ) -> Result<AccountId, LedgerError> {
        self.run(ctx, true, |state| {
            if state
                .accounts
                .values()
                .any(|a| a.username == account.username)
            {
                return Err(LedgerError::Conflict(format!(
                    "username '{}' already exists",
                    account.username
                )));
            }
            if account.initial_balance < 0 {
                return Err(LedgerError::Database(
                    "balance violates check constraint".to_string(),
                ));
            }
            state.next_account_id += 1;
            let id = state.next_account_id;
            state.accounts.insert(
                id,
                Account {
                    id,
                    username: account.username.clone(),
                    password_hash: account.password_hash.clone(),
                    balance: account.initial_balance,
                    created_at: Utc::now(),
                },
            );
            Ok(id)
        })
    }

    async fn get_account_by_id(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        account_id: AccountId,
    ) -> Result<Account, LedgerError> {
        self.run(ctx, false, |state| state.account(account_id).cloned())
    }

    async fn get_account_by_username(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        username: &str,
    ) -> Result<Account, LedgerError> {
        self.run(ctx, false, |state| {
            state
                .accounts
                .values()
                .find(|a| a.username == username)
                .cloned()
                .ok_or_else(|| LedgerError::NotFound(format!("account '{}'", username)))
        })
    }

    async fn update_balance(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        account_id: AccountId,
        new_balance: Coins,
    ) -> Result<(), LedgerError> {
        self.run(ctx, true, |state| {
            if new_balance < 0 {
                return Err(LedgerError::Database(
                    "balance violates check constraint".to_string(),
                ));
            }
            let account = state
                .accounts
                .get_mut(&account_id)
                .ok_or_else(|| LedgerError::NotFound(format!("account {}", account_id)))?;
            account.balance = new_balance;
            Ok(())
        })
    }

    async fn list_balances(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        after: AccountId,
        limit: i64,
    ) -> Result<Vec<(AccountId, Coins)>, LedgerError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        self.run(ctx, false, |state| {
            Ok(state
                .accounts
                .range(after.saturating_add(1)..)
                .take(limit)
                .map(|(id, a)| (*id, a.balance))
                .collect())
        })
    }
}

#[async_trait]
impl PurchaseRepository for MemoryLedger {
    async fn create_purchase(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        purchase: &NewPurchase,
    ) -> Result<EntityId, LedgerError> {
        self.run(ctx, true, |state| {
            // Foreign key
            state.account(purchase.account_id)?;
            state.next_purchase_id += 1;
            let id = state.next_purchase_id;
            state.purchases.push(Purchase {
                id,
                account_id: purchase.account_id,
                merch_name: purchase.merch_name.clone(),
                price: purchase.price,
                created_at: Utc::now(),
            });
            Ok(id)
        })
    }

    async fn get_purchases_by_account(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        account_id: AccountId,
    ) -> Result<Vec<Purchase>, LedgerError> {
        self.run(ctx, false, |state| {
            Ok(state
                .purchases
                .iter()
                .filter(|p| p.account_id == account_id)
                .cloned()
                .collect())
        })
    }
}

#[async_trait]
impl TransferRepository for MemoryLedger {
    async fn create_transfer(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        transfer: &NewTransfer,
    ) -> Result<EntityId, LedgerError> {
        self.run(ctx, true, |state| {
            state.account(transfer.sender_id)?;
            state.account(transfer.receiver_id)?;
            if transfer.amount <= 0 || transfer.sender_id == transfer.receiver_id {
                return Err(LedgerError::Database(
                    "transfer violates check constraint".to_string(),
                ));
            }
            state.next_transfer_id += 1;
            let id = state.next_transfer_id;
            state.transfers.push(Transfer {
                id,
                sender_id: transfer.sender_id,
                receiver_id: transfer.receiver_id,
                amount: transfer.amount,
                created_at: Utc::now(),
            });
            Ok(id)
        })
    }

    async fn get_transfers_by_account(
        &self,
        ctx: &mut ExecCtx<'_, Self::Tx>,
        account_id: AccountId,
    ) -> Result<Vec<Transfer>, LedgerError> {
        self.run(ctx, false, |state| {
            Ok(state
                .transfers
                .iter()
                .filter(|t| t.involves(account_id))
                .cloned()
                .collect())
        })
    }
}
