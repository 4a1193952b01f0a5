//! Merch Store Service
//!
//! Ties the ledger and the balance cache together. Every mutation follows
//! the same shape:
//!
//! ```text
//! FastCheck ──▶ TxBegin ──▶ Revalidate ──▶ Write(s) ──▶ TxCommit ──▶ CacheSync
//! (advisory)    └──────────── authoritative ─────────────┘          (advisory)
//! ```
//!
//! A failure before `TxCommit` leaves the ledger untouched and the cache
//! unwritten. After `TxCommit` the operation has happened: a failed or
//! interrupted `CacheSync` is reported through [`CacheSync::Stale`] and the
//! affected keys are dropped so the next read re-warms them from the ledger.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::error::StoreError;
use crate::cache::{BalanceCache, CacheError};
use crate::catalog::Catalog;
use crate::core_types::{AccountId, Coins, EntityId};
use crate::ledger::{ExecCtx, Ledger, LedgerError, TxManager, TxOptions};
use crate::models::{Account, AccountInfo, NewAccount, NewPurchase, NewTransfer};
use crate::user_auth::{PasswordHasher, TokenService};

// ============================================================================
// Outcomes
// ============================================================================

/// Post-commit cache state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheSync {
    /// Cache updated with the committed outcome
    Applied,
    /// No cache entry to adjust; the next read warms it from the ledger
    Cold,
    /// Cache write failed or was interrupted. The ledger is ahead.
    Stale(String),
}

/// A mutation the ledger has committed, plus what happened to the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed<T> {
    pub value: T,
    pub cache: CacheSync,
}

impl<T> Committed<T> {
    pub fn is_synced(&self) -> bool {
        !matches!(self.cache, CacheSync::Stale(_))
    }

    /// Treat a stale cache as an error (`CacheSyncFailed`).
    /// The ledger change stands either way.
    pub fn into_synced(self) -> Result<T, StoreError> {
        match self.cache {
            CacheSync::Stale(reason) => Err(StoreError::CacheSyncFailed(reason)),
            CacheSync::Applied | CacheSync::Cold => Ok(self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub account_id: AccountId,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub purchase_id: EntityId,
    pub merch_name: String,
    pub price: Coins,
    /// Ledger balance after the purchase
    pub balance: Coins,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transfer_id: EntityId,
    pub amount: Coins,
    /// Sender's ledger balance after the transfer
    pub balance: Coins,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Balance granted to a newly registered account
    pub initial_balance: Coins,
    /// Upper bound on any single cache round trip made by the service
    pub cache_sync_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            initial_balance: 1000,
            cache_sync_timeout: Duration::from_millis(500),
        }
    }
}

// ============================================================================
// Transport-facing surface
// ============================================================================

/// What the transport adapter calls. Object-safe so the gateway does not
/// depend on the ledger backend type.
#[async_trait]
pub trait MerchStore: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Session, StoreError>;

    async fn purchase(
        &self,
        account_id: AccountId,
        merch_name: &str,
    ) -> Result<Committed<PurchaseReceipt>, StoreError>;

    async fn transfer(
        &self,
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: Coins,
    ) -> Result<Committed<TransferReceipt>, StoreError>;

    async fn get_info(&self, account_id: AccountId) -> Result<AccountInfo, StoreError>;

    /// Resolve a session token to its account
    fn verify_token(&self, token: &str) -> Result<AccountId, StoreError>;
}

// ============================================================================
// Service
// ============================================================================

pub struct MerchStoreService<L: Ledger> {
    tx: TxManager<L>,
    cache: Arc<dyn BalanceCache>,
    catalog: Arc<Catalog>,
    tokens: Arc<dyn TokenService>,
    hasher: Arc<dyn PasswordHasher>,
    settings: StoreSettings,
}

impl<L: Ledger> MerchStoreService<L> {
    pub fn new(
        tx: TxManager<L>,
        cache: Arc<dyn BalanceCache>,
        catalog: Arc<Catalog>,
        tokens: Arc<dyn TokenService>,
        hasher: Arc<dyn PasswordHasher>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            tx,
            cache,
            catalog,
            tokens,
            hasher,
            settings,
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        self.tx.backend()
    }

    pub fn cache(&self) -> &Arc<dyn BalanceCache> {
        &self.cache
    }

    pub fn tokens(&self) -> &Arc<dyn TokenService> {
        &self.tokens
    }

    // ------------------------------------------------------------------------
    // Authenticate
    // ------------------------------------------------------------------------

    /// Log in, registering the account on first sight of the username
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Session, StoreError> {
        if username.trim().is_empty() {
            return Err(StoreError::InvalidArgument("username is required".to_string()));
        }
        if password.is_empty() {
            return Err(StoreError::InvalidArgument("password is required".to_string()));
        }

        let existing = self
            .ledger()
            .get_account_by_username(&mut ExecCtx::pool(), username)
            .await;

        let account_id = match existing {
            Ok(account) => self.login(account, password).await?,
            Err(LedgerError::NotFound(_)) => self.register(username, password).await?,
            Err(e) => return Err(e.into()),
        };

        let token = self.tokens.issue(account_id)?;
        Ok(Session { account_id, token })
    }

    async fn login(&self, account: Account, password: &str) -> Result<AccountId, StoreError> {
        if !self.hasher.verify(&account.password_hash, password) {
            debug!(account_id = account.id, "Password mismatch");
            return Err(StoreError::InvalidCredentials);
        }
        self.warm_if_cold(account.id, account.balance).await;
        Ok(account.id)
    }

    async fn register(&self, username: &str, password: &str) -> Result<AccountId, StoreError> {
        let new_account = NewAccount {
            username: username.to_string(),
            password_hash: self.hasher.hash(password)?,
            initial_balance: self.settings.initial_balance,
        };

        let account_id = match self
            .ledger()
            .create_account(&mut ExecCtx::pool(), &new_account)
            .await
        {
            Ok(id) => id,
            Err(LedgerError::Conflict(_)) => {
                // Lost a concurrent first-login race; converge on the winner
                debug!(username, "Username registered concurrently");
                let account = self
                    .ledger()
                    .get_account_by_username(&mut ExecCtx::pool(), username)
                    .await?;
                return self.login(account, password).await;
            }
            Err(e) => return Err(e.into()),
        };

        self.bounded(self.cache.set_balance(account_id, self.settings.initial_balance))
            .await
            .map_err(|e| {
                error!(account_id, error = %e, "Registered account but could not cache its balance");
                StoreError::CacheSyncFailed(e.to_string())
            })?;

        info!(account_id, username, "Account registered");
        Ok(account_id)
    }

    // ------------------------------------------------------------------------
    // Purchase
    // ------------------------------------------------------------------------

    pub async fn purchase(
        &self,
        account_id: AccountId,
        merch_name: &str,
    ) -> Result<Committed<PurchaseReceipt>, StoreError> {
        let price = self.price_of(merch_name).await?;
        self.fast_check(account_id, price).await?;

        let ledger = self.ledger().clone();
        let name = merch_name.to_string();
        let (purchase_id, balance) = self
            .tx
            .with_tx::<_, StoreError, _>(TxOptions::read_write_serializable(), move |mut ctx| {
                let ledger = ledger.clone();
                let name = name.clone();
                Box::pin(async move {
                    let account = ledger.get_account_by_id(&mut ctx, account_id).await?;
                    if account.balance < price {
                        return Err(StoreError::InsufficientFunds);
                    }
                    let balance = account.balance - price;
                    ledger.update_balance(&mut ctx, account_id, balance).await?;
                    let purchase_id = ledger
                        .create_purchase(
                            &mut ctx,
                            &NewPurchase {
                                account_id,
                                merch_name: name,
                                price,
                            },
                        )
                        .await?;
                    Ok((purchase_id, balance))
                })
            })
            .await?;

        info!(account_id, merch_name, price, purchase_id, "Purchase committed");

        let cache = self
            .sync_cache(
                "purchase",
                &[account_id],
                self.cache.deduct_balance(account_id, price),
            )
            .await;

        Ok(Committed {
            value: PurchaseReceipt {
                purchase_id,
                merch_name: merch_name.to_string(),
                price,
                balance,
            },
            cache,
        })
    }

    // ------------------------------------------------------------------------
    // Transfer
    // ------------------------------------------------------------------------

    pub async fn transfer(
        &self,
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: Coins,
    ) -> Result<Committed<TransferReceipt>, StoreError> {
        if amount <= 0 {
            return Err(StoreError::InvalidArgument(
                "amount must be positive".to_string(),
            ));
        }
        if sender_id == receiver_id {
            return Err(StoreError::InvalidArgument(
                "cannot transfer coins to yourself".to_string(),
            ));
        }

        self.fast_check(sender_id, amount).await?;

        let ledger = self.ledger().clone();
        let (transfer_id, balance) = self
            .tx
            .with_tx::<_, StoreError, _>(TxOptions::read_write_serializable(), move |mut ctx| {
                let ledger = ledger.clone();
                Box::pin(async move {
                    let sender = ledger.get_account_by_id(&mut ctx, sender_id).await?;
                    let receiver = ledger.get_account_by_id(&mut ctx, receiver_id).await?;
                    if sender.balance < amount {
                        return Err(StoreError::InsufficientFunds);
                    }
                    let sender_balance = sender.balance - amount;
                    let receiver_balance = receiver.balance.checked_add(amount).ok_or_else(|| {
                        StoreError::InvalidArgument("receiver balance would overflow".to_string())
                    })?;

                    ledger
                        .update_balance(&mut ctx, sender_id, sender_balance)
                        .await?;
                    ledger
                        .update_balance(&mut ctx, receiver_id, receiver_balance)
                        .await?;
                    let transfer_id = ledger
                        .create_transfer(
                            &mut ctx,
                            &NewTransfer {
                                sender_id,
                                receiver_id,
                                amount,
                            },
                        )
                        .await?;
                    Ok((transfer_id, sender_balance))
                })
            })
            .await?;

        info!(sender_id, receiver_id, amount, transfer_id, "Transfer committed");

        let cache = self
            .sync_cache(
                "transfer",
                &[sender_id, receiver_id],
                self.cache.transfer_balance(sender_id, receiver_id, amount),
            )
            .await;

        Ok(Committed {
            value: TransferReceipt {
                transfer_id,
                amount,
                balance,
            },
            cache,
        })
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Balance and full history from one read-only ledger snapshot
    pub async fn get_info(&self, account_id: AccountId) -> Result<AccountInfo, StoreError> {
        let ledger = self.ledger().clone();
        self.tx
            .with_tx::<_, StoreError, _>(TxOptions::read_only_committed(), move |mut ctx| {
                let ledger = ledger.clone();
                Box::pin(async move {
                    let account = ledger.get_account_by_id(&mut ctx, account_id).await?;
                    let purchases = ledger
                        .get_purchases_by_account(&mut ctx, account_id)
                        .await?;
                    let transfers = ledger
                        .get_transfers_by_account(&mut ctx, account_id)
                        .await?;
                    Ok(AccountInfo {
                        account_id: account.id,
                        username: account.username,
                        balance: account.balance,
                        purchases,
                        transfers,
                    })
                })
            })
            .await
    }

    /// Authoritative balance, read outside any explicit transaction
    pub async fn ledger_balance(&self, account_id: AccountId) -> Result<Coins, StoreError> {
        let account = self
            .ledger()
            .get_account_by_id(&mut ExecCtx::pool(), account_id)
            .await?;
        Ok(account.balance)
    }

    // ------------------------------------------------------------------------
    // Cache helpers
    // ------------------------------------------------------------------------

    /// Cache round trip bounded by `cache_sync_timeout`
    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.settings.cache_sync_timeout, op)
            .await
            .unwrap_or_else(|_| Err(CacheError::Unavailable("timed out".to_string())))
    }

    /// Price from the cached catalog, falling back to the startup copy when
    /// the cache is unreachable or has lost the item
    async fn price_of(&self, merch_name: &str) -> Result<Coins, StoreError> {
        let cached = self.bounded(self.cache.get_price(merch_name)).await;
        let price = match cached {
            Ok(price) => return Ok(price),
            Err(CacheError::UnknownMerch(_)) => {
                let price = self.catalog.price(merch_name);
                if price.is_some() {
                    // Hash flushed or evicted since startup
                    warn!(merch_name, "Cached catalog is missing a known item, reloading");
                    self.restore_catalog().await;
                }
                price
            }
            Err(e) => {
                warn!(merch_name, error = %e, "Catalog cache unavailable, using startup catalog");
                self.catalog.price(merch_name)
            }
        };
        price.ok_or_else(|| StoreError::NotFound(format!("merch '{}'", merch_name)))
    }

    async fn restore_catalog(&self) {
        if let Err(e) = self
            .bounded(self.cache.load_catalog(self.catalog.items()))
            .await
        {
            warn!(error = %e, "Catalog reload failed");
        }
    }

    /// Advisory balance check against the cache.
    ///
    /// A cold entry is warmed from the ledger and the ledger value used. An
    /// unreachable cache skips the check; the ledger transaction decides.
    async fn fast_check(&self, account_id: AccountId, amount: Coins) -> Result<(), StoreError> {
        let balance = match self.bounded(self.cache.get_balance(account_id)).await {
            Ok(balance) => balance,
            Err(e) if e.is_miss() => {
                let balance = self.ledger_balance(account_id).await?;
                self.warm(account_id, balance).await;
                balance
            }
            Err(e) => {
                warn!(account_id, error = %e, "Fast-path balance check skipped");
                return Ok(());
            }
        };

        if balance < amount {
            debug!(account_id, balance, amount, "Rejected by fast-path check");
            return Err(StoreError::InsufficientFunds);
        }
        Ok(())
    }

    async fn warm_if_cold(&self, account_id: AccountId, balance: Coins) {
        match self.bounded(self.cache.get_balance(account_id)).await {
            Ok(_) => {}
            Err(e) if e.is_miss() => self.warm(account_id, balance).await,
            Err(e) => warn!(account_id, error = %e, "Cache lookup failed"),
        }
    }

    /// Best-effort write-back of a ledger balance; failures are only logged
    async fn warm(&self, account_id: AccountId, balance: Coins) {
        match self.bounded(self.cache.set_balance(account_id, balance)).await {
            Ok(()) => debug!(account_id, balance, "Cache warmed from ledger"),
            Err(e) => warn!(account_id, error = %e, "Cache warm failed"),
        }
    }

    /// Apply a committed outcome to the cache
    async fn sync_cache(
        &self,
        op: &'static str,
        accounts: &[AccountId],
        update: impl Future<Output = Result<Coins, CacheError>>,
    ) -> CacheSync {
        let reason = match tokio::time::timeout(self.settings.cache_sync_timeout, update).await {
            Ok(Ok(_)) => return CacheSync::Applied,
            Ok(Err(e)) if e.is_miss() => {
                debug!(op, ?accounts, "Cache entry cold, nothing to sync");
                return CacheSync::Cold;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "cache sync interrupted: timed out".to_string(),
        };

        error!(op, ?accounts, reason = %reason, "Ledger committed, cache stale");
        for &account_id in accounts {
            if let Err(e) = self
                .bounded(self.cache.invalidate_balance(account_id))
                .await
            {
                warn!(account_id, error = %e, "Stale cache entry could not be dropped");
            }
        }
        CacheSync::Stale(reason)
    }
}

#[async_trait]
impl<L: Ledger> MerchStore for MerchStoreService<L> {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Session, StoreError> {
        MerchStoreService::authenticate(self, username, password).await
    }

    async fn purchase(
        &self,
        account_id: AccountId,
        merch_name: &str,
    ) -> Result<Committed<PurchaseReceipt>, StoreError> {
        MerchStoreService::purchase(self, account_id, merch_name).await
    }

    async fn transfer(
        &self,
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: Coins,
    ) -> Result<Committed<TransferReceipt>, StoreError> {
        MerchStoreService::transfer(self, sender_id, receiver_id, amount).await
    }

    async fn get_info(&self, account_id: AccountId) -> Result<AccountInfo, StoreError> {
        MerchStoreService::get_info(self, account_id).await
    }

    fn verify_token(&self, token: &str) -> Result<AccountId, StoreError> {
        Ok(self.tokens.verify(token)?)
    }
}
