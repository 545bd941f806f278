//! Infrared API adapter.
//!
//! The API returns a bare JSON array. `pool` is optional: when present it
//! names the underlying DEX and pool, otherwise the stake token's own name
//! is used.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{get_json, into_records, FetchError, ProviderAdapter, ProviderKind};
use crate::config::{INFRARED_LABEL, INFRARED_VAULTS_URL};
use crate::record::{VaultListing, VaultRecord};

#[derive(Debug, Deserialize)]
pub(crate) struct InfraredVault {
    pub address: String,
    pub stake_token: StakeToken,
    #[serde(default)]
    pub pool: Option<Pool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StakeToken {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Pool {
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<InfraredVault> for VaultListing {
    fn from(vault: InfraredVault) -> Self {
        let (pool_protocol, pool_name) = match vault.pool {
            Some(pool) => (pool.protocol, pool.name),
            None => (None, None),
        };
        VaultListing {
            vault: vault.address,
            token: vault.stake_token.address,
            preferred_name: pool_name,
            fallback_name: vault.stake_token.name,
            token_protocol: pool_protocol,
            vault_name_prefix: Some(INFRARED_LABEL),
        }
    }
}

pub struct InfraredProvider {
    http: Client,
    url: String,
}

impl InfraredProvider {
    pub fn new(http: Client) -> Self {
        Self::with_url(http, INFRARED_VAULTS_URL)
    }

    pub fn with_url(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

pub(crate) fn records_from_list(vaults: Vec<InfraredVault>) -> Result<Vec<VaultRecord>, FetchError> {
    let listings = vaults.into_iter().map(VaultListing::from).collect();
    into_records(ProviderKind::Infrared, listings)
}

#[async_trait]
impl ProviderAdapter for InfraredProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Infrared
    }

    async fn fetch(&self) -> Result<Vec<VaultRecord>, FetchError> {
        let vaults: Vec<InfraredVault> = get_json(&self.http, self.kind(), &self.url).await?;
        records_from_list(vaults)
    }
}
