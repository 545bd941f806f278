//! Shared fixtures for the reconciliation tests: a scripted ledger, a store
//! that records every call and can be told to fail, and canned providers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy::primitives::{Address as EvmAddress, TxHash, B256};
use async_trait::async_trait;
use parking_lot::Mutex;

use gauge_whitelist::ledger::{AuthorizationLedger, Confirmation, LedgerError, TxHandle};
use gauge_whitelist::provider::{FetchError, ProviderAdapter, ProviderKind};
use gauge_whitelist::record::{AuthorizationEntry, TokenEntry, VaultListing, VaultRecord};
use gauge_whitelist::store::{RecordStore, SledRecordStore, StoreError, StoreResult, Table};
use gauge_whitelist::{Address, PendingJournal, Reconciler, ReconcilerContext};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

pub fn addr(byte: u8) -> Address {
    Address::new(EvmAddress::repeat_byte(byte))
}

/// A record as the Infrared adapter would produce it.
pub fn record(vault: u8, token: u8) -> VaultRecord {
    listing(&addr(vault).to_checksum(), &addr(token).to_checksum())
}

pub fn listing(vault: &str, token: &str) -> VaultRecord {
    VaultListing {
        vault: vault.to_string(),
        token: token.to_string(),
        preferred_name: Some("HONEY-WBERA".into()),
        token_protocol: Some("Kodiak".into()),
        vault_name_prefix: Some("Infrared"),
        ..Default::default()
    }
    .into_record("Infrared")
    .expect("valid listing")
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LedgerScript {
    reject: HashSet<Address>,
    revert: HashSet<Address>,
    timeout: HashSet<Address>,
    revert_tx: HashSet<TxHash>,
    dispatched: HashMap<TxHash, Address>,
    authorize_calls: Vec<(Address, String)>,
    confirm_calls: Vec<TxHash>,
    next: u8,
}

/// In-memory registry. Every target confirms unless scripted otherwise.
#[derive(Default)]
pub struct MockLedger {
    script: Mutex<LedgerScript>,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `authorize` fails before dispatch.
    pub fn reject(&self, target: Address) {
        self.script.lock().reject.insert(target);
    }

    /// Receipt comes back with a failed status.
    pub fn revert(&self, target: Address) {
        self.script.lock().revert.insert(target);
    }

    /// Receipt never arrives.
    pub fn time_out(&self, target: Address) {
        self.script.lock().timeout.insert(target);
    }

    pub fn heal(&self, target: Address) {
        let mut script = self.script.lock();
        script.reject.remove(&target);
        script.revert.remove(&target);
        script.timeout.remove(&target);
    }

    /// A transaction from an earlier process that reverted.
    pub fn revert_hash(&self, tx_hash: TxHash) {
        self.script.lock().revert_tx.insert(tx_hash);
    }

    pub fn authorize_calls(&self) -> Vec<(Address, String)> {
        self.script.lock().authorize_calls.clone()
    }

    pub fn confirm_calls(&self) -> Vec<TxHash> {
        self.script.lock().confirm_calls.clone()
    }
}

#[async_trait]
impl AuthorizationLedger for MockLedger {
    async fn authorize(
        &self,
        target: &Address,
        protocol_label: &str,
    ) -> Result<TxHandle, LedgerError> {
        let mut script = self.script.lock();
        script
            .authorize_calls
            .push((*target, protocol_label.to_string()));

        if script.reject.contains(target) {
            return Err(LedgerError::Submission {
                target: *target,
                reason: "nonce too low".into(),
            });
        }

        script.next = script.next.wrapping_add(1);
        let tx_hash = B256::with_last_byte(script.next);
        script.dispatched.insert(tx_hash, *target);
        Ok(TxHandle { tx_hash })
    }

    async fn is_known(&self, handle: &TxHandle) -> Result<bool, LedgerError> {
        let script = self.script.lock();
        Ok(script.dispatched.contains_key(&handle.tx_hash)
            || script.revert_tx.contains(&handle.tx_hash))
    }

    async fn await_confirmation(&self, handle: &TxHandle) -> Result<Confirmation, LedgerError> {
        let mut script = self.script.lock();
        let tx_hash = handle.tx_hash;
        script.confirm_calls.push(tx_hash);

        if script.revert_tx.contains(&tx_hash) {
            return Err(LedgerError::Reverted { tx_hash });
        }
        if let Some(target) = script.dispatched.get(&tx_hash).copied() {
            if script.revert.contains(&target) {
                return Err(LedgerError::Reverted { tx_hash });
            }
            if script.timeout.contains(&target) {
                return Err(LedgerError::ConfirmationTimeout {
                    tx_hash,
                    timeout: std::time::Duration::from_secs(1),
                });
            }
        }
        Ok(Confirmation {
            tx_hash,
            block_number: Some(42),
        })
    }

    fn backend(&self) -> &'static str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FindToken(Address),
    FindAuthorization(Address),
    InsertToken(Address),
    InsertAuthorization(Address),
}

impl Op {
    pub fn is_write(&self) -> bool {
        matches!(self, Op::InsertToken(_) | Op::InsertAuthorization(_))
    }
}

/// Sled store that logs every call and fails the ones it is told to.
pub struct RecordingStore {
    inner: SledRecordStore,
    ops: Mutex<Vec<Op>>,
    faults: Mutex<HashSet<Op>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SledRecordStore::open_temporary().expect("temp store"),
            ops: Mutex::new(Vec::new()),
            faults: Mutex::new(HashSet::new()),
        })
    }

    pub fn inner(&self) -> &SledRecordStore {
        &self.inner
    }

    pub fn fail(&self, op: Op) {
        self.faults.lock().insert(op);
    }

    pub fn heal(&self, op: Op) {
        self.faults.lock().remove(&op);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().clone()
    }

    pub fn writes(&self) -> Vec<Op> {
        self.ops().into_iter().filter(Op::is_write).collect()
    }

    pub fn reset_ops(&self) {
        self.ops.lock().clear();
    }

    fn enter(&self, op: Op, table: Table) -> StoreResult<()> {
        self.ops.lock().push(op);
        if self.faults.lock().contains(&op) {
            return Err(StoreError::Transport {
                table,
                reason: "injected fault".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn find_token(&self, address: &Address) -> StoreResult<Option<TokenEntry>> {
        self.enter(Op::FindToken(*address), Table::Tokens)?;
        self.inner.find_token(address).await
    }

    async fn find_authorization(
        &self,
        address: &Address,
    ) -> StoreResult<Option<AuthorizationEntry>> {
        self.enter(Op::FindAuthorization(*address), Table::Contracts)?;
        self.inner.find_authorization(address).await
    }

    async fn insert_token(&self, entry: &TokenEntry) -> StoreResult<()> {
        self.enter(Op::InsertToken(entry.address), Table::Tokens)?;
        self.inner.insert_token(entry).await
    }

    async fn insert_authorization(&self, entry: &AuthorizationEntry) -> StoreResult<()> {
        self.enter(Op::InsertAuthorization(entry.address), Table::Contracts)?;
        self.inner.insert_authorization(entry).await
    }

    fn backend(&self) -> &'static str {
        "recording"
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Returns the same records on every fetch.
pub struct StaticProvider {
    kind: ProviderKind,
    records: Vec<VaultRecord>,
}

impl StaticProvider {
    pub fn boxed(kind: ProviderKind, records: Vec<VaultRecord>) -> Box<dyn ProviderAdapter> {
        Box::new(Self { kind, records })
    }
}

#[async_trait]
impl ProviderAdapter for StaticProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn fetch(&self) -> Result<Vec<VaultRecord>, FetchError> {
        Ok(self.records.clone())
    }
}

/// Upstream is down.
pub struct FailingProvider(pub ProviderKind);

#[async_trait]
impl ProviderAdapter for FailingProvider {
    fn kind(&self) -> ProviderKind {
        self.0
    }

    async fn fetch(&self) -> Result<Vec<VaultRecord>, FetchError> {
        Err(FetchError::Status {
            provider: self.0,
            status: 503,
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<RecordingStore>,
    pub ledger: Arc<MockLedger>,
    pub journal: PendingJournal,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: RecordingStore::new(),
            ledger: MockLedger::new(),
            journal: PendingJournal::open_temporary().expect("temp journal"),
        }
    }

    /// A fresh reconciler over the same store, ledger and journal, as a
    /// second process run would see them.
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(ReconcilerContext {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
            journal: self.journal.clone(),
        })
    }
}
