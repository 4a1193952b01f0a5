//! Balance Cache
//!
//! Low-latency, non-authoritative copy of account balances plus the merch
//! price catalog. Every balance mutation is a single atomic server-side
//! script, so concurrent writers never observe a torn update.
//!
//! The cache never holds truth. The service only consults it as a fast
//! pre-check and brings it in line with the ledger after each commit.
//!
//! # Key layout
//!
//! | Key                 | Type   | Value                  |
//! |---------------------|--------|------------------------|
//! | `balance:{id}`      | string | integer balance        |
//! | `merch_catalog`     | hash   | merch name -> price    |

pub mod memory;
pub mod redis_cache;

use async_trait::async_trait;
use thiserror::Error;

use crate::core_types::{AccountId, Coins};

pub use memory::InMemoryBalanceCache;
pub use redis_cache::RedisBalanceCache;

/// Hash holding the merch price catalog
pub const CATALOG_KEY: &str = "merch_catalog";

/// Cache key of an account balance
pub fn balance_key(account_id: AccountId) -> String {
    format!("balance:{}", account_id)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The key is absent. Callers fall back to the ledger.
    #[error("Cache miss for {0}")]
    Miss(String),

    #[error("Insufficient funds in cache for account {0}")]
    InsufficientFunds(AccountId),

    #[error("Unknown merch item: {0}")]
    UnknownMerch(String),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss(_))
    }
}

/// Atomic balance operations and catalog lookups
#[async_trait]
pub trait BalanceCache: Send + Sync {
    /// Unconditional write (registration, warm-up, reconciliation)
    async fn set_balance(&self, account_id: AccountId, balance: Coins) -> Result<(), CacheError>;

    async fn get_balance(&self, account_id: AccountId) -> Result<Coins, CacheError>;

    /// Atomically subtract `amount` and return the new value.
    ///
    /// Fails with `Miss` if the key is absent and with `InsufficientFunds`
    /// if the cached balance is below `amount`; in both cases nothing is
    /// written.
    async fn deduct_balance(&self, account_id: AccountId, amount: Coins)
    -> Result<Coins, CacheError>;

    /// Atomically move `amount` from `from` to `to` and return the new
    /// sender value.
    ///
    /// The receiver is only credited when its key exists, so a cold
    /// receiver is never materialized with a partial value. A cold sender
    /// yields `Miss`, but a warm receiver is still credited.
    async fn transfer_balance(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Coins,
    ) -> Result<Coins, CacheError>;

    /// Drop a balance entry so the next read warms it from the ledger
    async fn invalidate_balance(&self, account_id: AccountId) -> Result<(), CacheError>;

    /// Replace the whole price catalog
    async fn load_catalog(&self, items: &[(String, Coins)]) -> Result<(), CacheError>;

    /// Fails with `UnknownMerch` for names not in the catalog
    async fn get_price(&self, merch_name: &str) -> Result<Coins, CacheError>;

    /// Liveness check. Process-local caches are always up.
    async fn health_check(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Reply sentinel: cached balance is lower than the requested amount
pub(crate) const SCRIPT_INSUFFICIENT: i64 = -1;
/// Reply sentinel: balance key does not exist
pub(crate) const SCRIPT_MISSING: i64 = -2;

/// Map a balance script reply to the new balance or its error
pub(crate) fn decode_script_reply(account_id: AccountId, reply: i64) -> Result<Coins, CacheError> {
    match reply {
        SCRIPT_INSUFFICIENT => Err(CacheError::InsufficientFunds(account_id)),
        SCRIPT_MISSING => Err(CacheError::Miss(balance_key(account_id))),
        v if v < 0 => Err(CacheError::Unavailable(format!(
            "unexpected script reply {}",
            v
        ))),
        v => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_key_format() {
        assert_eq!(balance_key(42), "balance:42");
    }

    #[test]
    fn test_decode_script_reply() {
        assert_eq!(decode_script_reply(1, 0), Ok(0));
        assert_eq!(decode_script_reply(1, 920), Ok(920));
        assert_eq!(
            decode_script_reply(7, SCRIPT_INSUFFICIENT),
            Err(CacheError::InsufficientFunds(7))
        );
        assert_eq!(
            decode_script_reply(7, SCRIPT_MISSING),
            Err(CacheError::Miss("balance:7".to_string()))
        );
        assert!(matches!(
            decode_script_reply(7, -9),
            Err(CacheError::Unavailable(_))
        ));
    }
}
