//! # Provider Adapters
//!
//! Sources of candidate vaults. Each adapter pulls one upstream catalogue,
//! decodes its JSON (or on-chain logs) and hands back canonical
//! [`VaultRecord`]s in upstream order.
//!
//! ```text
//! bgt.rs        BGT Station indexer   (GET, single large page)   label "BGT Station"
//! infrared.rs   Infrared API          (GET, page of 100)          label "Infrared"
//! factory.rs    VaultCreated logs from the reward-vault factory   label "BGT Station"
//! ```
//!
//! Adapters only describe what the upstream said, as a [`VaultListing`];
//! address canonicalisation and name fallbacks happen once, in
//! [`VaultListing::into_record`].
//!
//! A fetch is all-or-nothing. Any transport or decode failure, including a
//! single unparsable address, fails the whole batch with [`FetchError`].

pub mod bgt;
pub mod factory;
pub mod infrared;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::record::{ListingError, VaultListing, VaultRecord};

pub use bgt::BgtStationProvider;
pub use factory::{FactoryConfig, FactoryLogsProvider};
pub use infrared::InfraredProvider;

/// Which upstream a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    BgtStation,
    Infrared,
    FactoryLogs,
}

impl ProviderKind {
    /// Label passed to the registry for vaults from this provider.
    pub fn label(self) -> &'static str {
        match self {
            ProviderKind::BgtStation | ProviderKind::FactoryLogs => crate::config::BGT_STATION_LABEL,
            ProviderKind::Infrared => crate::config::INFRARED_LABEL,
        }
    }

    /// Short name used on the command line and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::BgtStation => "bgt",
            ProviderKind::Infrared => "infrared",
            ProviderKind::FactoryLogs => "factory",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bgt" | "bgt-station" => Ok(ProviderKind::BgtStation),
            "infrared" => Ok(ProviderKind::Infrared),
            "factory" | "factory-logs" => Ok(ProviderKind::FactoryLogs),
            other => Err(format!(
                "unknown provider {other:?} (expected bgt, infrared or factory)"
            )),
        }
    }
}

/// Errors that abort a provider's whole batch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{provider}: request failed: {reason}")]
    Transport {
        provider: ProviderKind,
        reason: String,
    },

    #[error("{provider}: upstream returned HTTP {status}")]
    Status {
        provider: ProviderKind,
        status: u16,
    },

    #[error("{provider}: malformed response: {reason}")]
    Malformed {
        provider: ProviderKind,
        reason: String,
    },

    #[error("{provider}: entry {index}: {source}")]
    Listing {
        provider: ProviderKind,
        index: usize,
        #[source]
        source: ListingError,
    },
}

/// A finite source of candidate vaults.
///
/// `fetch` starts from scratch every call; there is no cursor to resume.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn fetch(&self) -> Result<Vec<VaultRecord>, FetchError>;
}

/// Canonicalises listings in upstream order, failing on the first bad one.
pub fn into_records(
    provider: ProviderKind,
    listings: Vec<VaultListing>,
) -> Result<Vec<VaultRecord>, FetchError> {
    listings
        .into_iter()
        .enumerate()
        .map(|(index, listing)| {
            listing
                .into_record(provider.label())
                .map_err(|source| FetchError::Listing {
                    provider,
                    index,
                    source,
                })
        })
        .collect()
}

/// HTTP client shared by the catalogue adapters.
pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("gauge-whitelist/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// GETs `url` and decodes the body as `T`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    http: &Client,
    provider: ProviderKind,
    url: &str,
) -> Result<T, FetchError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Transport {
            provider,
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            provider,
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(|e| FetchError::Transport {
        provider,
        reason: e.to_string(),
    })?;
    decode(provider, &body)
}

/// Decodes a catalogue body. Split out so schemas can be tested offline.
pub(crate) fn decode<T: DeserializeOwned>(provider: ProviderKind, body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::Malformed {
        provider,
        reason: e.to_string(),
    })
}
