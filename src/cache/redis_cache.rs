//! Redis-backed balance cache
//!
//! Balance mutations run as Lua scripts so the check and the write happen
//! in one server-side step.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};

use super::{BalanceCache, CATALOG_KEY, CacheError, balance_key, decode_script_reply};
use crate::core_types::{AccountId, Coins};

/// KEYS[1] balance, ARGV[1] amount
const DEDUCT_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return -2
end
if tonumber(current) < tonumber(ARGV[1]) then
    return -1
end
return redis.call('DECRBY', KEYS[1], ARGV[1])
"#;

/// KEYS[1] sender, KEYS[2] receiver, ARGV[1] amount
///
/// A cold sender still lets a warm receiver be credited.
const TRANSFER_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current and tonumber(current) < tonumber(ARGV[1]) then
    return -1
end
if redis.call('EXISTS', KEYS[2]) == 1 then
    redis.call('INCRBY', KEYS[2], ARGV[1])
end
if not current then
    return -2
end
return redis.call('DECRBY', KEYS[1], ARGV[1])
"#;

impl From<RedisError> for CacheError {
    fn from(e: RedisError) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

/// Balance cache over a multiplexed, auto-reconnecting Redis connection
#[derive(Clone)]
pub struct RedisBalanceCache {
    conn: ConnectionManager,
    deduct: Script,
    transfer: Script,
}

impl RedisBalanceCache {
    /// Connect, retrying up to `connect_attempts` times two seconds apart
    pub async fn connect(url: &str, connect_attempts: u32) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let attempts = connect_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match ConnectionManager::new(client.clone()).await {
                Ok(conn) => {
                    tracing::info!("Redis connection established");
                    return Ok(Self::from_connection(conn));
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Redis connection attempt failed"
                    );
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            deduct: Script::new(DEDUCT_SCRIPT),
            transfer: Script::new(TRANSFER_SCRIPT),
        }
    }
}

#[async_trait]
impl BalanceCache for RedisBalanceCache {
    async fn set_balance(&self, account_id: AccountId, balance: Coins) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(balance_key(account_id), balance).await?;
        Ok(())
    }

    async fn get_balance(&self, account_id: AccountId) -> Result<Coins, CacheError> {
        let key = balance_key(account_id);
        let mut conn = self.conn.clone();
        let value: Option<Coins> = conn.get(&key).await?;
        value.ok_or(CacheError::Miss(key))
    }

    async fn deduct_balance(
        &self,
        account_id: AccountId,
        amount: Coins,
    ) -> Result<Coins, CacheError> {
        let mut conn = self.conn.clone();
        let reply: i64 = self
            .deduct
            .key(balance_key(account_id))
            .arg(amount)
            .invoke_async(&mut conn)
            .await?;
        decode_script_reply(account_id, reply)
    }

    async fn transfer_balance(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Coins,
    ) -> Result<Coins, CacheError> {
        let mut conn = self.conn.clone();
        let reply: i64 = self
            .transfer
            .key(balance_key(from))
            .key(balance_key(to))
            .arg(amount)
            .invoke_async(&mut conn)
            .await?;
        decode_script_reply(from, reply)
    }

    async fn invalidate_balance(&self, account_id: AccountId) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(balance_key(account_id)).await?;
        Ok(())
    }

    async fn load_catalog(&self, items: &[(String, Coins)]) -> Result<(), CacheError> {
        let mut pipe = redis::pipe();
        pipe.atomic().del(CATALOG_KEY).ignore();
        if !items.is_empty() {
            pipe.hset_multiple(CATALOG_KEY, items).ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        tracing::info!(items = items.len(), "Merch catalog loaded into cache");
        Ok(())
    }

    async fn get_price(&self, merch_name: &str) -> Result<Coins, CacheError> {
        let mut conn = self.conn.clone();
        let price: Option<Coins> = conn.hget(CATALOG_KEY, merch_name).await?;
        price.ok_or_else(|| CacheError::UnknownMerch(merch_name.to_string()))
    }

    /// PING round-trip
    async fn health_check(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
