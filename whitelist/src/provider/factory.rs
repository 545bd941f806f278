//! Reward-vault discovery straight from the factory's `VaultCreated` logs.
//!
//! Scans from the configured start block to the current head in fixed
//! windows, then reads each staking token's ERC-20 `name()` with bounded
//! concurrency. A token whose `name()` reverts or is missing falls back to
//! the vault address, like any other unnamed listing.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use alloy::primitives::Address as EvmAddress;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use alloy::sol;
use alloy::sol_types::SolEvent;

use super::{into_records, FetchError, ProviderAdapter, ProviderKind};
use crate::address::Address;
use crate::config::{
    DEFAULT_FACTORY_ADDRESS, DEFAULT_FACTORY_START_BLOCK, FACTORY_LOG_WINDOW,
    FACTORY_NAME_LOOKUP_CONCURRENCY,
};
use crate::record::{VaultListing, VaultRecord};

sol! {
    event VaultCreated(address indexed stakingToken, address indexed vault);

    #[sol(rpc)]
    interface IERC20Metadata {
        function name() external view returns (string);
    }
}

#[derive(Debug, Clone)]
pub struct FactoryConfig {
    pub factory: Address,
    pub start_block: u64,
    /// Blocks per `eth_getLogs` request.
    pub window: u64,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            factory: Address::new(DEFAULT_FACTORY_ADDRESS),
            start_block: DEFAULT_FACTORY_START_BLOCK,
            window: FACTORY_LOG_WINDOW,
        }
    }
}

pub struct FactoryLogsProvider {
    provider: DynProvider,
    config: FactoryConfig,
}

impl FactoryLogsProvider {
    pub fn new(provider: DynProvider, config: FactoryConfig) -> Self {
        Self { provider, config }
    }

    /// Read-only connection, for runs that have no signing provider to share.
    pub async fn connect(rpc_url: &str, config: FactoryConfig) -> Result<Self, FetchError> {
        let provider = ProviderBuilder::new()
            .connect(rpc_url)
            .await
            .map_err(|e| FetchError::Transport {
                provider: ProviderKind::FactoryLogs,
                reason: format!("rpc {rpc_url}: {e}"),
            })?
            .erased();
        Ok(Self::new(provider, config))
    }

    fn chain_error(&self, reason: impl ToString) -> FetchError {
        FetchError::Transport {
            provider: self.kind(),
            reason: reason.to_string(),
        }
    }

    async fn scan(&self) -> Result<Vec<(EvmAddress, EvmAddress)>, FetchError> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| self.chain_error(format!("block number: {e}")))?;

        let mut created = Vec::new();
        for (from, to) in block_windows(self.config.start_block, head, self.config.window) {
            let filter = Filter::new()
                .address(self.config.factory.as_evm())
                .event_signature(VaultCreated::SIGNATURE_HASH)
                .from_block(from)
                .to_block(to);

            let logs = self
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| self.chain_error(format!("logs {from}..={to}: {e}")))?;

            for log in logs {
                let decoded = log
                    .log_decode::<VaultCreated>()
                    .map_err(|e| FetchError::Malformed {
                        provider: self.kind(),
                        reason: format!("VaultCreated in block {from}..={to}: {e}"),
                    })?;
                let event = decoded.inner.data;
                created.push((event.vault, event.stakingToken));
            }
            tracing::trace!(from, to, total = created.len(), "scanned factory window");
        }
        Ok(created)
    }

    async fn token_name(&self, token: EvmAddress) -> Option<String> {
        let erc20 = IERC20Metadata::new(token, self.provider.clone());
        match erc20.name().call().await {
            Ok(name) => Some(name),
            Err(e) => {
                tracing::warn!(token = %token, error = %e, "name() lookup failed");
                None
            }
        }
    }
}

/// Inclusive `[from, to]` windows covering `start..=head`.
pub(crate) fn block_windows(start: u64, head: u64, window: u64) -> Vec<(u64, u64)> {
    let window = window.max(1);
    let mut windows = Vec::new();
    let mut from = start;
    while from <= head {
        let to = from.saturating_add(window - 1).min(head);
        windows.push((from, to));
        if to == u64::MAX {
            break;
        }
        from = to + 1;
    }
    windows
}

#[async_trait]
impl ProviderAdapter for FactoryLogsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::FactoryLogs
    }

    async fn fetch(&self) -> Result<Vec<VaultRecord>, FetchError> {
        let created = self.scan().await?;

        let listings: Vec<VaultListing> = stream::iter(created)
            .map(|(vault, token)| async move {
                let name = self.token_name(token).await;
                VaultListing {
                    vault: vault.to_checksum(None),
                    token: token.to_checksum(None),
                    preferred_name: name,
                    ..Default::default()
                }
            })
            .buffered(FACTORY_NAME_LOOKUP_CONCURRENCY)
            .collect()
            .await;

        into_records(self.kind(), listings)
    }
}
