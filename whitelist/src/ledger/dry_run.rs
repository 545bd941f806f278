//! Ledger stand-in for `--dry-run`: logs the registry call and confirms it
//! without touching the chain. Transaction hashes are derived from the call
//! arguments so repeated dry runs log the same hashes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::primitives::keccak256;

use super::{AuthorizationLedger, Confirmation, LedgerError, TxHandle};
use crate::address::Address;

#[derive(Debug, Default)]
pub struct DryRunLedger {
    calls: AtomicUsize,
}

impl DryRunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registry writes that would have been sent.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AuthorizationLedger for DryRunLedger {
    async fn authorize(
        &self,
        target: &Address,
        protocol_label: &str,
    ) -> Result<TxHandle, LedgerError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let mut preimage = target.as_evm().to_vec();
        preimage.extend_from_slice(protocol_label.as_bytes());
        let handle = TxHandle {
            tx_hash: keccak256(&preimage),
        };

        tracing::info!(
            target = %target,
            protocol = protocol_label,
            tx = %handle,
            "dry run: would call setProtocolOfTarget"
        );
        Ok(handle)
    }

    /// Nothing is ever sent, so no hash is known to the chain.
    async fn is_known(&self, _handle: &TxHandle) -> Result<bool, LedgerError> {
        Ok(false)
    }

    async fn await_confirmation(&self, handle: &TxHandle) -> Result<Confirmation, LedgerError> {
        Ok(Confirmation {
            tx_hash: handle.tx_hash,
            block_number: None,
        })
    }

    fn backend(&self) -> &'static str {
        "dry-run"
    }
}
