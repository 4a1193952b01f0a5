//! Session tokens and password hashing
//!
//! The store service only sees the two traits below; the gateway verifies
//! bearer tokens through the same [`TokenService`].

pub mod password;
pub mod token;

use thiserror::Error;

use crate::core_types::AccountId;

pub use password::Argon2Hasher;
pub use token::{Claims, JwtTokenService};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token issue failed: {0}")]
    Issue(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),
}

/// Issues and verifies session tokens bound to an account
pub trait TokenService: Send + Sync {
    fn issue(&self, account_id: AccountId) -> Result<String, AuthError>;

    fn verify(&self, token: &str) -> Result<AccountId, AuthError>;
}

/// One-way password digests
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError>;

    /// `false` for a wrong password or an unparseable digest
    fn verify(&self, digest: &str, plaintext: &str) -> bool;
}
