//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

/// Account ID - primary key of the `users` table.
///
/// # Constraints:
/// - **Immutable**: Once assigned by the ledger, NEVER changes
/// - **Positive**: generated by a `BIGSERIAL`, so never 0
///
/// Also the suffix of the cache key (`balance:{id}`).
pub type AccountId = i64;

/// Coin amount in indivisible units.
///
/// Signed so that SQL `BIGINT` maps directly; a stored balance is never
/// negative (enforced by the ledger, checked again by a table constraint).
pub type Coins = i64;

/// Row ID of an append-only ledger record (purchase or transfer).
pub type EntityId = i64;
