//! Process-local balance cache for `--in-memory` runs and tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{BalanceCache, CacheError, balance_key};
use crate::core_types::{AccountId, Coins};

/// Balances sit behind one lock so a transfer touches both keys atomically,
/// mirroring a single Redis script.
#[derive(Debug, Default)]
pub struct InMemoryBalanceCache {
    balances: Mutex<HashMap<AccountId, Coins>>,
    catalog: DashMap<String, Coins>,
}

impl InMemoryBalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_balances<R>(
        &self,
        op: impl FnOnce(&mut HashMap<AccountId, Coins>) -> Result<R, CacheError>,
    ) -> Result<R, CacheError> {
        let mut balances = self
            .balances
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".to_string()))?;
        op(&mut balances)
    }
}

#[async_trait]
impl BalanceCache for InMemoryBalanceCache {
    async fn set_balance(&self, account_id: AccountId, balance: Coins) -> Result<(), CacheError> {
        self.with_balances(|b| {
            b.insert(account_id, balance);
            Ok(())
        })
    }

    async fn get_balance(&self, account_id: AccountId) -> Result<Coins, CacheError> {
        self.with_balances(|b| {
            b.get(&account_id)
                .copied()
                .ok_or_else(|| CacheError::Miss(balance_key(account_id)))
        })
    }

    async fn deduct_balance(
        &self,
        account_id: AccountId,
        amount: Coins,
    ) -> Result<Coins, CacheError> {
        self.with_balances(|b| {
            let current = b
                .get_mut(&account_id)
                .ok_or_else(|| CacheError::Miss(balance_key(account_id)))?;
            if *current < amount {
                return Err(CacheError::InsufficientFunds(account_id));
            }
            *current -= amount;
            Ok(*current)
        })
    }

    async fn transfer_balance(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Coins,
    ) -> Result<Coins, CacheError> {
        self.with_balances(|b| {
            let current = b.get(&from).copied();
            if current.is_some_and(|c| c < amount) {
                return Err(CacheError::InsufficientFunds(from));
            }
            if let Some(receiver) = b.get_mut(&to) {
                *receiver += amount;
            }
            let sender = b
                .get_mut(&from)
                .ok_or_else(|| CacheError::Miss(balance_key(from)))?;
            *sender -= amount;
            Ok(*sender)
        })
    }

    async fn invalidate_balance(&self, account_id: AccountId) -> Result<(), CacheError> {
        self.with_balances(|b| {
            b.remove(&account_id);
            Ok(())
        })
    }

    async fn load_catalog(&self, items: &[(String, Coins)]) -> Result<(), CacheError> {
        self.catalog.clear();
        for (name, price) in items {
            self.catalog.insert(name.clone(), *price);
        }
        Ok(())
    }

    async fn get_price(&self, merch_name: &str) -> Result<Coins, CacheError> {
        self.catalog
            .get(merch_name)
            .map(|p| *p)
            .ok_or_else(|| CacheError::UnknownMerch(merch_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deduct_never_goes_negative() {
        let cache = InMemoryBalanceCache::new();
        cache.set_balance(1, 50).await.unwrap();

        assert_eq!(cache.deduct_balance(1, 50).await, Ok(0));
        assert_eq!(
            cache.deduct_balance(1, 1).await,
            Err(CacheError::InsufficientFunds(1))
        );
        assert_eq!(cache.get_balance(1).await, Ok(0));
    }

    #[tokio::test]
    async fn test_deduct_on_missing_key_does_not_materialize() {
        let cache = InMemoryBalanceCache::new();
        assert!(cache.deduct_balance(3, 10).await.unwrap_err().is_miss());
        assert!(cache.get_balance(3).await.unwrap_err().is_miss());
    }

    #[tokio::test]
    async fn test_transfer_moves_coins() {
        let cache = InMemoryBalanceCache::new();
        cache.set_balance(1, 100).await.unwrap();
        cache.set_balance(2, 5).await.unwrap();

        assert_eq!(cache.transfer_balance(1, 2, 40).await, Ok(60));
        assert_eq!(cache.get_balance(2).await, Ok(45));
    }

    #[tokio::test]
    async fn test_transfer_insufficient_leaves_both_untouched() {
        let cache = InMemoryBalanceCache::new();
        cache.set_balance(1, 10).await.unwrap();
        cache.set_balance(2, 10).await.unwrap();

        assert_eq!(
            cache.transfer_balance(1, 2, 11).await,
            Err(CacheError::InsufficientFunds(1))
        );
        assert_eq!(cache.get_balance(1).await, Ok(10));
        assert_eq!(cache.get_balance(2).await, Ok(10));
    }

    #[tokio::test]
    async fn test_transfer_to_cold_receiver() {
        let cache = InMemoryBalanceCache::new();
        cache.set_balance(1, 10).await.unwrap();

        assert_eq!(cache.transfer_balance(1, 2, 4).await, Ok(6));
        assert!(cache.get_balance(2).await.unwrap_err().is_miss());
    }

    #[tokio::test]
    async fn test_cold_sender_still_credits_receiver() {
        let cache = InMemoryBalanceCache::new();
        cache.set_balance(2, 10).await.unwrap();

        assert!(cache.transfer_balance(1, 2, 4).await.unwrap_err().is_miss());
        assert_eq!(cache.get_balance(2).await, Ok(14));
        assert!(cache.get_balance(1).await.unwrap_err().is_miss());
    }

    #[tokio::test]
    async fn test_catalog_replaced_wholesale() {
        let cache = InMemoryBalanceCache::new();
        cache
            .load_catalog(&[("cup".to_string(), 20), ("pen".to_string(), 10)])
            .await
            .unwrap();
        cache
            .load_catalog(&[("book".to_string(), 50)])
            .await
            .unwrap();

        assert_eq!(cache.get_price("book").await, Ok(50));
        assert_eq!(
            cache.get_price("cup").await,
            Err(CacheError::UnknownMerch("cup".to_string()))
        );
    }
}
