//! Store overlay for `--dry-run`: lookups go to the real store, inserts
//! are logged and staged in memory so the rest of the run sees them, and
//! nothing reaches the backend.
//!
//! Staged rows follow the same rules as a real insert. A second insert for
//! an address fails with [`StoreError::Duplicate`], and a contract row must
//! point at a token that exists in the backend or the overlay.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::{RecordStore, StoreError, StoreResult, Table};
use crate::address::Address;
use crate::config::LP_TOKENS_TABLE;
use crate::record::{AuthorizationEntry, TokenEntry};

pub struct DryRunStore {
    inner: Arc<dyn RecordStore>,
    tokens: Mutex<HashMap<Address, TokenEntry>>,
    contracts: Mutex<HashMap<Address, AuthorizationEntry>>,
}

impl DryRunStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            tokens: Mutex::new(HashMap::new()),
            contracts: Mutex::new(HashMap::new()),
        }
    }

    /// Token rows that would have been written.
    pub fn staged_tokens(&self) -> usize {
        self.tokens.lock().len()
    }

    /// Contract rows that would have been written.
    pub fn staged_authorizations(&self) -> usize {
        self.contracts.lock().len()
    }
}

#[async_trait]
impl RecordStore for DryRunStore {
    async fn find_token(&self, address: &Address) -> StoreResult<Option<TokenEntry>> {
        let staged = self.tokens.lock().get(address).cloned();
        if staged.is_some() {
            return Ok(staged);
        }
        self.inner.find_token(address).await
    }

    async fn find_authorization(
        &self,
        address: &Address,
    ) -> StoreResult<Option<AuthorizationEntry>> {
        let staged = self.contracts.lock().get(address).cloned();
        if staged.is_some() {
            return Ok(staged);
        }
        self.inner.find_authorization(address).await
    }

    async fn insert_token(&self, entry: &TokenEntry) -> StoreResult<()> {
        if self.find_token(&entry.address).await?.is_some() {
            return Err(StoreError::Duplicate {
                table: Table::Tokens,
                address: entry.address,
            });
        }
        tracing::info!(
            token = %entry.address,
            protocol = %entry.protocol,
            name = %entry.name,
            "dry run: would insert lp_tokens row"
        );
        self.tokens.lock().insert(entry.address, entry.clone());
        Ok(())
    }

    async fn insert_authorization(&self, entry: &AuthorizationEntry) -> StoreResult<()> {
        if let Some(token) = &entry.token_address {
            if self.find_token(token).await?.is_none() {
                return Err(StoreError::Rejected {
                    table: Table::Contracts,
                    reason: format!("token_address {token} not present in {LP_TOKENS_TABLE}"),
                });
            }
        }
        if self.find_authorization(&entry.address).await?.is_some() {
            return Err(StoreError::Duplicate {
                table: Table::Contracts,
                address: entry.address,
            });
        }
        tracing::info!(
            vault = %entry.address,
            protocol = %entry.protocol,
            "dry run: would insert contracts row"
        );
        self.contracts.lock().insert(entry.address, entry.clone());
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SledRecordStore;

    fn addr(byte: u8) -> Address {
        Address::new(alloy::primitives::Address::repeat_byte(byte))
    }

    fn token(byte: u8) -> TokenEntry {
        TokenEntry {
            address: addr(byte),
            protocol: "BEX".into(),
            name: "HONEY-WBERA".into(),
            authorized: true,
        }
    }

    fn contract(vault: u8, token: u8) -> AuthorizationEntry {
        AuthorizationEntry {
            address: addr(vault),
            is_allowed: true,
            protocol: "BGT Station".into(),
            name: Some("HONEY-WBERA".into()),
            token_address: Some(addr(token)),
        }
    }

    #[tokio::test]
    async fn writes_are_staged_not_sent() {
        let backend = Arc::new(SledRecordStore::open_temporary().unwrap());
        let store = DryRunStore::new(backend.clone());

        store.insert_token(&token(2)).await.unwrap();
        store.insert_authorization(&contract(1, 2)).await.unwrap();

        assert!(store.find_token(&addr(2)).await.unwrap().is_some());
        assert!(store.find_authorization(&addr(1)).await.unwrap().is_some());
        assert_eq!(store.staged_tokens(), 1);
        assert_eq!(store.staged_authorizations(), 1);
        assert_eq!(backend.token_count(), 0);
        assert_eq!(backend.authorization_count(), 0);
    }

    #[tokio::test]
    async fn backend_rows_are_visible_and_not_duplicated() {
        let backend = Arc::new(SledRecordStore::open_temporary().unwrap());
        backend.insert_token(&token(2)).await.unwrap();
        let store = DryRunStore::new(backend.clone());

        assert!(matches!(
            store.insert_token(&token(2)).await,
            Err(StoreError::Duplicate { .. })
        ));
        // The token lives only in the backend; the contract may still refer to it.
        store.insert_authorization(&contract(1, 2)).await.unwrap();
        assert_eq!(backend.authorization_count(), 0);
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let backend = Arc::new(SledRecordStore::open_temporary().unwrap());
        let store = DryRunStore::new(backend);
        assert!(matches!(
            store.insert_authorization(&contract(1, 9)).await,
            Err(StoreError::Rejected { .. })
        ));
    }
}
