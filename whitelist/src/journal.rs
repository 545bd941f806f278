//! # Pending Journal
//!
//! Local record of registry writes that have been started but not yet
//! reflected in the record store. It closes the gap between "HoneyQueen
//! accepted the vault" and "the `contracts` row exists": if the process dies
//! or the insert fails in between, the next run finds the marker and
//! re-checks the recorded transaction instead of sending a new one.
//!
//! Lifecycle of one marker:
//!
//! ```text
//! (none) ──record_intent──► Intent ──record_submitted──► Submitted{tx}
//!    ▲                                                      │
//!    └──────────── clear (row persisted, or reverted) ──────┘
//! ```
//!
//! An `Intent` with no transaction means we crashed while dispatching and
//! cannot tell whether anything reached the chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::Path;

use crate::address::Address;
use crate::config::PENDING_TREE;
use crate::ledger::TxHandle;

/// Errors raised by the pending journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type JournalResult<T> = Result<T, JournalError>;

/// How far a pending authorization got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingStage {
    /// About to dispatch; no transaction hash known.
    Intent,
    /// Dispatched; waiting on this transaction.
    Submitted(TxHandle),
}

/// One in-flight registry write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub vault: Address,
    pub protocol_label: String,
    pub stage: PendingStage,
    pub recorded_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn handle(&self) -> Option<TxHandle> {
        match self.stage {
            PendingStage::Intent => None,
            PendingStage::Submitted(handle) => Some(handle),
        }
    }
}

/// sled-backed journal of in-flight registry writes, keyed by vault.
#[derive(Debug, Clone)]
pub struct PendingJournal {
    db: Db,
    pending: Tree,
}

impl PendingJournal {
    pub fn open<P: AsRef<Path>>(path: P) -> JournalResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory journal, removed on drop.
    pub fn open_temporary() -> JournalResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> JournalResult<Self> {
        let pending = db.open_tree(PENDING_TREE)?;
        Ok(Self { db, pending })
    }

    /// The marker for `vault`, if one is outstanding.
    pub fn get(&self, vault: &Address) -> JournalResult<Option<PendingAuthorization>> {
        match self.pending.get(vault.to_checksum().as_bytes())? {
            Some(bytes) => {
                let entry = bincode::deserialize(&bytes)
                    .map_err(|e| JournalError::Serialization(e.to_string()))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Marks `vault` as about to be dispatched. Durable before returning.
    pub fn record_intent(&self, vault: &Address, protocol_label: &str) -> JournalResult<()> {
        self.put(PendingAuthorization {
            vault: *vault,
            protocol_label: protocol_label.to_string(),
            stage: PendingStage::Intent,
            recorded_at: Utc::now(),
        })
    }

    /// Attaches the dispatched transaction to the marker for `vault`.
    pub fn record_submitted(
        &self,
        vault: &Address,
        protocol_label: &str,
        handle: TxHandle,
    ) -> JournalResult<()> {
        self.put(PendingAuthorization {
            vault: *vault,
            protocol_label: protocol_label.to_string(),
            stage: PendingStage::Submitted(handle),
            recorded_at: Utc::now(),
        })
    }

    /// Removes the marker for `vault`. Clearing an absent marker is a no-op.
    pub fn clear(&self, vault: &Address) -> JournalResult<()> {
        if self.pending.remove(vault.to_checksum().as_bytes())?.is_some() {
            self.db.flush()?;
        }
        Ok(())
    }

    /// All outstanding markers, in key order.
    pub fn list(&self) -> JournalResult<Vec<PendingAuthorization>> {
        let mut entries = Vec::new();
        for item in self.pending.iter() {
            let (_key, value) = item?;
            let entry = bincode::deserialize(&value)
                .map_err(|e| JournalError::Serialization(e.to_string()))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn put(&self, entry: PendingAuthorization) -> JournalResult<()> {
        let bytes =
            bincode::serialize(&entry).map_err(|e| JournalError::Serialization(e.to_string()))?;
        self.pending
            .insert(entry.vault.to_checksum().as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }
}
