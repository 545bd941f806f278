//! # HoneyQueen Registry Client
//!
//! Signs `setProtocolOfTarget` with the operator key and waits for the
//! receipt through an alloy provider. The provider carries alloy's
//! recommended fillers, so nonce, gas and chain id are filled per call and
//! nonces stay serialized for the single signer.
//!
//! Reverts can surface at two points: during `send()` (gas estimation
//! replays the call and fails) or in the receipt status. The first is a
//! submission error, the second a revert; in neither case was anything
//! recorded on-chain.

use async_trait::async_trait;
use std::time::Duration;

use alloy::network::{EthereumWallet, ReceiptResponse};
use alloy::providers::{
    DynProvider, PendingTransactionBuilder, PendingTransactionError, Provider, ProviderBuilder,
    WatchTxError,
};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;

use super::{AuthorizationLedger, Confirmation, LedgerError, TxHandle};
use crate::address::Address;
use crate::config::DEFAULT_REQUIRED_CONFIRMATIONS;

sol! {
    #[sol(rpc)]
    interface IHoneyQueen {
        function setProtocolOfTarget(address target, string calldata protocol) external;
    }
}

/// Connection settings for the registry client.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// HoneyQueen contract address.
    pub registry: Address,
    /// `None` waits as long as the provider keeps the watch alive.
    pub confirmation_timeout: Option<Duration>,
    pub required_confirmations: u64,
}

impl LedgerConfig {
    pub fn new(rpc_url: impl Into<String>, registry: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            registry,
            confirmation_timeout: None,
            required_confirmations: DEFAULT_REQUIRED_CONFIRMATIONS,
        }
    }
}

/// Registry client that signs with a single operator key.
pub struct HoneyQueenLedger {
    provider: DynProvider,
    registry: Address,
    confirmation_timeout: Option<Duration>,
    required_confirmations: u64,
}

impl HoneyQueenLedger {
    /// Builds a signing provider for `config.rpc_url`.
    ///
    /// `private_key` is a hex-encoded secp256k1 key, with or without `0x`.
    pub async fn connect(config: LedgerConfig, private_key: &str) -> Result<Self, LedgerError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| LedgerError::Setup(format!("invalid signing key: {e}")))?;
        let signer_address = Address::new(signer.address());

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(&config.rpc_url)
            .await
            .map_err(|e| LedgerError::Setup(format!("rpc {}: {e}", config.rpc_url)))?
            .erased();

        tracing::info!(
            registry = %config.registry,
            signer = %signer_address,
            rpc = %config.rpc_url,
            timeout = ?config.confirmation_timeout,
            "registry client ready"
        );

        Ok(Self {
            provider,
            registry: config.registry,
            confirmation_timeout: config.confirmation_timeout,
            required_confirmations: config.required_confirmations.max(1),
        })
    }

    /// The underlying provider, shared with on-chain discovery.
    pub fn provider(&self) -> DynProvider {
        self.provider.clone()
    }
}

#[async_trait]
impl AuthorizationLedger for HoneyQueenLedger {
    async fn authorize(
        &self,
        target: &Address,
        protocol_label: &str,
    ) -> Result<TxHandle, LedgerError> {
        let registry = IHoneyQueen::new(self.registry.as_evm(), self.provider.clone());
        let pending = registry
            .setProtocolOfTarget(target.as_evm(), protocol_label.to_string())
            .send()
            .await
            .map_err(|e| LedgerError::Submission {
                target: *target,
                reason: e.to_string(),
            })?;

        let handle = TxHandle {
            tx_hash: *pending.tx_hash(),
        };
        tracing::debug!(target = %target, tx = %handle, "registry write dispatched");
        Ok(handle)
    }

    async fn is_known(&self, handle: &TxHandle) -> Result<bool, LedgerError> {
        let tx = self
            .provider
            .get_transaction_by_hash(handle.tx_hash)
            .await
            .map_err(|e| LedgerError::Unconfirmed {
                tx_hash: handle.tx_hash,
                reason: format!("lookup: {e}"),
            })?;
        Ok(tx.is_some())
    }

    async fn await_confirmation(&self, handle: &TxHandle) -> Result<Confirmation, LedgerError> {
        let tx_hash = handle.tx_hash;
        let pending = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_required_confirmations(self.required_confirmations)
            .with_timeout(self.confirmation_timeout);

        let receipt = match pending.get_receipt().await {
            Ok(receipt) => receipt,
            Err(PendingTransactionError::TxWatcher(WatchTxError::Timeout)) => {
                return Err(LedgerError::ConfirmationTimeout {
                    tx_hash,
                    timeout: self.confirmation_timeout.unwrap_or_default(),
                });
            }
            Err(e) => {
                return Err(LedgerError::Unconfirmed {
                    tx_hash,
                    reason: e.to_string(),
                });
            }
        };

        if !receipt.status() {
            return Err(LedgerError::Reverted { tx_hash });
        }

        Ok(Confirmation {
            tx_hash: receipt.transaction_hash(),
            block_number: receipt.block_number(),
        })
    }

    fn backend(&self) -> &'static str {
        "honeyqueen"
    }
}
