//! # Embedded Record Store
//!
//! sled-backed implementation of [`RecordStore`]. One tree per hosted table:
//!
//! | Tree        | Key                          | Value                        |
//! |-------------|------------------------------|------------------------------|
//! | `lp_tokens` | checksummed address (UTF-8)  | `bincode(TokenEntry)`        |
//! | `contracts` | checksummed address (UTF-8)  | `bincode(AuthorizationEntry)`|
//!
//! Inserts go through `compare_and_swap(key, None, value)`, which is the
//! embedded equivalent of the hosted unique constraint: a second insert for
//! the same address fails instead of overwriting. The foreign key from
//! `contracts.token_address` is checked as well.

use ::sled::{CompareAndSwapError, Db, Tree};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use super::{RecordStore, StoreError, StoreResult, Table};
use crate::address::Address;
use crate::config::{CONTRACTS_TABLE, LP_TOKENS_TABLE};
use crate::record::{AuthorizationEntry, TokenEntry};

/// Local record store.
///
/// sled trees are safe to share across threads, so clones of this handle
/// all see the same data.
#[derive(Debug, Clone)]
pub struct SledRecordStore {
    db: Db,
    tokens: Tree,
    contracts: Tree,
}

impl SledRecordStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = ::sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory store, removed on drop. For tests and dry runs.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = ::sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let tokens = db.open_tree(LP_TOKENS_TABLE)?;
        let contracts = db.open_tree(CONTRACTS_TABLE)?;
        Ok(Self {
            db,
            tokens,
            contracts,
        })
    }

    /// Number of catalogued tokens.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Number of whitelisted contracts.
    pub fn authorization_count(&self) -> usize {
        self.contracts.len()
    }

    /// Force pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn tree(&self, table: Table) -> &Tree {
        match table {
            Table::Tokens => &self.tokens,
            Table::Contracts => &self.contracts,
        }
    }

    fn get<T: DeserializeOwned>(&self, table: Table, address: &Address) -> StoreResult<Option<T>> {
        match self.tree(table).get(address.to_checksum().as_bytes())? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes).map_err(|e| StoreError::Malformed {
                    table,
                    reason: e.to_string(),
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn insert_new<T: Serialize>(&self, table: Table, address: &Address, value: &T) -> StoreResult<()> {
        let bytes = bincode::serialize(value).map_err(|e| StoreError::Rejected {
            table,
            reason: e.to_string(),
        })?;
        let key = address.to_checksum();
        match self
            .tree(table)
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => {
                self.db.flush()?;
                Ok(())
            }
            Err(CompareAndSwapError { .. }) => Err(StoreError::Duplicate {
                table,
                address: *address,
            }),
        }
    }
}

#[async_trait]
impl RecordStore for SledRecordStore {
    async fn find_token(&self, address: &Address) -> StoreResult<Option<TokenEntry>> {
        self.get(Table::Tokens, address)
    }

    async fn find_authorization(
        &self,
        address: &Address,
    ) -> StoreResult<Option<AuthorizationEntry>> {
        self.get(Table::Contracts, address)
    }

    async fn insert_token(&self, entry: &TokenEntry) -> StoreResult<()> {
        self.insert_new(Table::Tokens, &entry.address, entry)
    }

    async fn insert_authorization(&self, entry: &AuthorizationEntry) -> StoreResult<()> {
        if let Some(token) = &entry.token_address {
            if !self.tokens.contains_key(token.to_checksum().as_bytes())? {
                return Err(StoreError::Rejected {
                    table: Table::Contracts,
                    reason: format!("token_address {token} not present in {LP_TOKENS_TABLE}"),
                });
            }
        }
        self.insert_new(Table::Contracts, &entry.address, entry)
    }

    fn backend(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new(alloy::primitives::Address::repeat_byte(byte))
    }

    fn token(byte: u8) -> TokenEntry {
        TokenEntry {
            address: addr(byte),
            protocol: "BEX".into(),
            name: format!("LP {byte}"),
            authorized: true,
        }
    }

    fn contract(vault: u8, token: u8) -> AuthorizationEntry {
        AuthorizationEntry {
            address: addr(vault),
            is_allowed: true,
            protocol: "BGT Station".into(),
            name: Some(format!("Vault {vault}")),
            token_address: Some(addr(token)),
        }
    }

    #[tokio::test]
    async fn empty_store_finds_nothing() {
        let store = SledRecordStore::open_temporary().unwrap();
        assert!(store.find_token(&addr(1)).await.unwrap().is_none());
        assert!(store.find_authorization(&addr(1)).await.unwrap().is_none());
        assert_eq!(store.token_count(), 0);
        assert_eq!(store.authorization_count(), 0);
    }

    #[tokio::test]
    async fn token_insert_then_find() {
        let store = SledRecordStore::open_temporary().unwrap();
        store.insert_token(&token(1)).await.unwrap();

        let found = store.find_token(&addr(1)).await.unwrap().unwrap();
        assert_eq!(found, token(1));
        assert_eq!(store.token_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_token_is_rejected_not_overwritten() {
        let store = SledRecordStore::open_temporary().unwrap();
        store.insert_token(&token(1)).await.unwrap();

        let mut renamed = token(1);
        renamed.name = "overwrite attempt".into();
        let err = store.insert_token(&renamed).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Duplicate {
                table: Table::Tokens,
                ..
            }
        ));

        let kept = store.find_token(&addr(1)).await.unwrap().unwrap();
        assert_eq!(kept.name, "LP 1");
    }

    #[tokio::test]
    async fn authorization_requires_existing_token() {
        let store = SledRecordStore::open_temporary().unwrap();
        let err = store.insert_authorization(&contract(9, 1)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Rejected {
                table: Table::Contracts,
                ..
            }
        ));
        assert_eq!(store.authorization_count(), 0);

        store.insert_token(&token(1)).await.unwrap();
        store.insert_authorization(&contract(9, 1)).await.unwrap();
        let found = store.find_authorization(&addr(9)).await.unwrap().unwrap();
        assert_eq!(found.token_address, Some(addr(1)));
    }

    #[tokio::test]
    async fn duplicate_authorization_is_rejected() {
        let store = SledRecordStore::open_temporary().unwrap();
        store.insert_token(&token(1)).await.unwrap();
        store.insert_authorization(&contract(9, 1)).await.unwrap();

        let err = store.insert_authorization(&contract(9, 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        assert_eq!(store.authorization_count(), 1);
    }

    #[tokio::test]
    async fn lookups_ignore_input_casing() {
        let store = SledRecordStore::open_temporary().unwrap();
        let checksummed = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
        let lower: Address = checksummed.to_lowercase().parse().unwrap();

        store
            .insert_token(&TokenEntry {
                address: lower,
                protocol: "BEX".into(),
                name: "HONEY-WBERA".into(),
                authorized: true,
            })
            .await
            .unwrap();

        let mixed: Address = checksummed.parse().unwrap();
        assert!(store.find_token(&mixed).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reopen_keeps_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = SledRecordStore::open(dir.path()).unwrap();
            store.insert_token(&token(3)).await.unwrap();
            store.flush().unwrap();
        }
        let store = SledRecordStore::open(dir.path()).unwrap();
        assert!(store.find_token(&addr(3)).await.unwrap().is_some());
    }
}
