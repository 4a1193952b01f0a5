//! Merch Store - coin ledger with a cache-backed fast path
//!
//! PostgreSQL holds the balance truth; Redis mirrors balances and the merch
//! catalog so that hot reads and pre-checks avoid the database. Every
//! mutation commits to the ledger first and only then touches the cache.
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (AccountId, Coins, ...)
//! - [`models`] - Ledger records (accounts, purchases, transfers)
//! - [`ledger`] - Transaction manager and repositories (PostgreSQL / in-memory)
//! - [`cache`] - Balance cache (Redis Lua scripts / in-memory)
//! - [`catalog`] - Merch price table
//! - [`user_auth`] - Password hashing and session tokens
//! - [`store`] - Authenticate / purchase / transfer / info orchestration
//! - [`gateway`] - HTTP API (axum)
//! - [`db`] - PostgreSQL pool and schema

// Core types - must be first!
pub mod core_types;
pub mod models;

// Persistence
pub mod cache;
pub mod db;
pub mod ledger;

// Business logic
pub mod catalog;
pub mod store;
pub mod user_auth;

// Runtime
pub mod config;
pub mod gateway;
pub mod logging;

// Convenient re-exports at crate root
pub use cache::{BalanceCache, CacheError, InMemoryBalanceCache, RedisBalanceCache};
pub use catalog::Catalog;
pub use core_types::{AccountId, Coins, EntityId};
pub use ledger::{Ledger, LedgerError, MemoryLedger, PgLedger, TxManager};
pub use models::{Account, AccountInfo, Purchase, Transfer};
pub use store::{MerchStore, MerchStoreService, StoreError};
