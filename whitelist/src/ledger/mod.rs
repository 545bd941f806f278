//! # Authorization Ledger
//!
//! The on-chain registry (HoneyQueen) that records which protocol a target
//! contract belongs to. Whitelisting a vault is one call:
//!
//! ```text
//! setProtocolOfTarget(address target, string protocol)
//! ```
//!
//! followed by waiting for the receipt. The two halves are separate trait
//! methods so the reconciler can journal the transaction hash between them.
//!
//! Implementations:
//!
//! - [`HoneyQueenLedger`]: signs and submits through an alloy provider.
//! - [`DryRunLedger`]: logs the call it would make and confirms instantly.

pub mod dry_run;
pub mod evm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use alloy::primitives::TxHash;

use crate::address::Address;

pub use dry_run::DryRunLedger;
pub use evm::{HoneyQueenLedger, LedgerConfig};

/// A dispatched registry transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle {
    pub tx_hash: TxHash,
}

impl std::fmt::Display for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tx_hash)
    }
}

/// Proof that a registry write landed and succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: TxHash,
    /// `None` when the ledger does not report inclusion height (dry runs).
    pub block_number: Option<u64>,
}

/// Errors raised by the authorization ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Client construction failed (bad key, unreachable RPC).
    #[error("ledger setup failed: {0}")]
    Setup(String),

    /// The transaction could not be dispatched.
    #[error("submission for {target} failed: {reason}")]
    Submission { target: Address, reason: String },

    /// The transaction was included but the registry rejected it.
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: TxHash },

    /// Inclusion did not happen within the configured wait.
    #[error("transaction {tx_hash} not confirmed within {timeout:?}")]
    ConfirmationTimeout { tx_hash: TxHash, timeout: Duration },

    /// The wait itself failed (transport error while polling).
    #[error("confirmation of {tx_hash} failed: {reason}")]
    Unconfirmed { tx_hash: TxHash, reason: String },
}

impl LedgerError {
    /// True when the ledger definitively rejected the change, as opposed to
    /// the outcome being unknown.
    pub fn is_reverted(&self) -> bool {
        matches!(self, LedgerError::Reverted { .. })
    }
}

/// The registry write used to whitelist a vault.
#[async_trait]
pub trait AuthorizationLedger: Send + Sync {
    /// Dispatches `setProtocolOfTarget(target, protocol_label)`.
    async fn authorize(&self, target: &Address, protocol_label: &str)
        -> Result<TxHandle, LedgerError>;

    /// Whether the ledger has seen the transaction at all, pending or mined.
    /// A hash that was dropped or replaced, or never sent, is unknown.
    async fn is_known(&self, handle: &TxHandle) -> Result<bool, LedgerError>;

    /// Blocks until the transaction is included, then checks its status.
    async fn await_confirmation(&self, handle: &TxHandle) -> Result<Confirmation, LedgerError>;

    /// Ledger name for logs.
    fn backend(&self) -> &'static str;
}
