//! Ledger entities
//!
//! Row shapes for accounts, purchases and transfers, plus the
//! insert-side structs the repositories accept.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core_types::{AccountId, Coins, EntityId};

// ============================================================================
// Account
// ============================================================================

/// Account row. `balance` here is ledger truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    /// Opaque PHC string produced by the password hasher
    pub password_hash: String,
    pub balance: Coins,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: String,
    pub initial_balance: Coins,
}

// ============================================================================
// Purchase
// ============================================================================

/// Purchase row. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Purchase {
    pub id: EntityId,
    pub account_id: AccountId,
    pub merch_name: String,
    /// Catalog price copied at transaction time
    pub price: Coins,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub account_id: AccountId,
    pub merch_name: String,
    pub price: Coins,
}

// ============================================================================
// Transfer
// ============================================================================

/// Coin transfer row. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub id: EntityId,
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: Coins,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: Coins,
}

impl Transfer {
    /// True if `account_id` took part in this transfer on either side
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.sender_id == account_id || self.receiver_id == account_id
    }
}

// ============================================================================
// Account info snapshot
// ============================================================================

/// Ledger snapshot returned by `get_info`: balance plus full history,
/// all read inside one read-only transaction.
#[derive(Debug, Clone, Serialize)]
pub struct AccountInfo {
    pub account_id: AccountId,
    pub username: String,
    pub balance: Coins,
    pub purchases: Vec<Purchase>,
    pub transfers: Vec<Transfer>,
}
