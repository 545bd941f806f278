//! # Record Store
//!
//! The off-chain catalogue of staking tokens and whitelisted vaults.
//!
//! ```text
//! lp_tokens    address (unique) → TokenEntry
//! contracts    address (unique) → AuthorizationEntry   (token_address → lp_tokens)
//! ```
//!
//! Two backends implement [`RecordStore`]:
//!
//! - [`PostgrestStore`]: the hosted Supabase tables, over PostgREST.
//! - [`SledRecordStore`]: an embedded sled database with the same two
//!   tables, for dry runs and tests.
//!
//! [`DryRunStore`] wraps either one for `--dry-run`, keeping writes in memory.
//!
//! Stores enforce the unique key and nothing else. Inserting an address
//! that already exists is an error, not an upsert; callers look first.
//! There is no transaction spanning both tables, so every call stands on
//! its own.

pub mod dry_run;
pub mod postgrest;
pub mod sled;

use async_trait::async_trait;

use crate::address::Address;
use crate::record::{AuthorizationEntry, TokenEntry};

pub use self::dry_run::DryRunStore;
pub use self::postgrest::{PostgrestConfig, PostgrestStore};
pub use self::sled::SledRecordStore;

/// Which table an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Tokens,
    Contracts,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Tokens => crate::config::LP_TOKENS_TABLE,
            Table::Contracts => crate::config::CONTRACTS_TABLE,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised by a record store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or answered with a failure.
    #[error("{table}: transport error: {reason}")]
    Transport { table: Table, reason: String },

    /// The backend answered, but with something we could not decode.
    #[error("{table}: malformed row: {reason}")]
    Malformed { table: Table, reason: String },

    /// Insert hit the unique key on `address`.
    #[error("{table}: duplicate key {address}")]
    Duplicate { table: Table, address: Address },

    /// Insert rejected for any other reason (foreign key, check constraint).
    #[error("{table}: insert rejected: {reason}")]
    Rejected { table: Table, reason: String },

    #[error("sled error: {0}")]
    Sled(#[from] ::sled::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Point lookups and insert-if-absent writes over the two catalogue tables.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Looks up a catalogued staking token.
    async fn find_token(&self, address: &Address) -> StoreResult<Option<TokenEntry>>;

    /// Looks up a whitelisted vault.
    async fn find_authorization(&self, address: &Address)
        -> StoreResult<Option<AuthorizationEntry>>;

    /// Inserts a token row. Fails with [`StoreError::Duplicate`] if present.
    async fn insert_token(&self, entry: &TokenEntry) -> StoreResult<()>;

    /// Inserts a contract row. The referenced token must already exist.
    async fn insert_authorization(&self, entry: &AuthorizationEntry) -> StoreResult<()>;

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}
