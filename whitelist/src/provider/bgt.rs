//! BGT Station indexer adapter.
//!
//! The indexer returns `{ "vaults": [ … ] }`. Only three fields per vault
//! matter here: the vault address, the staking token, and the metadata
//! block carrying the product and display name.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{get_json, into_records, FetchError, ProviderAdapter, ProviderKind};
use crate::config::BGT_STATION_VAULTS_URL;
use crate::record::{VaultListing, VaultRecord};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VaultsPage {
    pub vaults: Vec<BgtVault>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BgtVault {
    pub vault_address: String,
    pub staking_token_address: String,
    #[serde(default)]
    pub metadata: Option<VaultMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VaultMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
}

impl From<BgtVault> for VaultListing {
    fn from(vault: BgtVault) -> Self {
        let metadata = vault.metadata.unwrap_or_default();
        VaultListing {
            vault: vault.vault_address,
            token: vault.staking_token_address,
            preferred_name: metadata.name,
            fallback_name: metadata.product.clone(),
            token_protocol: metadata.product,
            vault_name_prefix: None,
        }
    }
}

pub struct BgtStationProvider {
    http: Client,
    url: String,
}

impl BgtStationProvider {
    pub fn new(http: Client) -> Self {
        Self::with_url(http, BGT_STATION_VAULTS_URL)
    }

    pub fn with_url(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

pub(crate) fn records_from_page(page: VaultsPage) -> Result<Vec<VaultRecord>, FetchError> {
    let listings = page.vaults.into_iter().map(VaultListing::from).collect();
    into_records(ProviderKind::BgtStation, listings)
}

#[async_trait]
impl ProviderAdapter for BgtStationProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::BgtStation
    }

    async fn fetch(&self) -> Result<Vec<VaultRecord>, FetchError> {
        let page: VaultsPage = get_json(&self.http, self.kind(), &self.url).await?;
        records_from_page(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::decode;
    use serde_json::json;

    fn body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "vaults": [
                {
                    "id": "1",
                    "vaultAddress": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
                    "stakingTokenAddress": "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359",
                    "amountStaked": "1000",
                    "metadata": {
                        "name": "HONEY-WBERA",
                        "product": "BEX",
                        "logoURI": "https://example.invalid/logo.png",
                        "url": "https://example.invalid"
                    }
                },
                {
                    "vaultAddress": "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
                    "stakingTokenAddress": "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
                    "metadata": { "product": "Kodiak" }
                }
            ],
            "pagination": { "total": 2 }
        }))
        .unwrap()
    }

    #[test]
    fn maps_indexer_page() {
        let page: VaultsPage = decode(ProviderKind::BgtStation, &body()).unwrap();
        let records = records_from_page(page).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(
            first.vault_address.to_checksum(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
        assert_eq!(first.display_name, "HONEY-WBERA");
        assert_eq!(first.token_name, "HONEY-WBERA");
        assert_eq!(first.token_protocol, "BEX");
        assert_eq!(first.protocol_label, "BGT Station");
    }

    #[test]
    fn missing_name_falls_back_to_product() {
        let page: VaultsPage = decode(ProviderKind::BgtStation, &body()).unwrap();
        let records = records_from_page(page).unwrap();
        assert_eq!(records[1].display_name, "Kodiak");
        assert_eq!(records[1].token_protocol, "Kodiak");
    }

    #[test]
    fn missing_vaults_key_is_malformed() {
        let err = decode::<VaultsPage>(ProviderKind::BgtStation, br#"{"data": []}"#).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }

    // -----------------------------------------------------------------------
    // Over HTTP, against a local indexer stand-in
    // -----------------------------------------------------------------------

    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    /// Serves `body` with `status` at `/vaults` and returns an adapter
    /// pointed at it.
    async fn indexer(status: StatusCode, body: Vec<u8>) -> BgtStationProvider {
        let app = Router::new().route(
            "/vaults",
            get(move || {
                let body = body.clone();
                async move { (status, body) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/vaults", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let http = crate::provider::http_client(std::time::Duration::from_secs(5)).unwrap();
        BgtStationProvider::with_url(http, url)
    }

    #[tokio::test]
    async fn fetches_whole_catalogue() {
        let provider = indexer(StatusCode::OK, body()).await;
        let records = provider.fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].protocol_label, "BGT Station");
    }

    #[tokio::test]
    async fn error_status_fails_the_batch() {
        let provider = indexer(StatusCode::SERVICE_UNAVAILABLE, b"maintenance".to_vec()).await;
        match provider.fetch().await {
            Err(FetchError::Status {
                provider: ProviderKind::BgtStation,
                status,
            }) => assert_eq!(status, 503),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn html_body_is_malformed() {
        let provider = indexer(StatusCode::OK, b"<html>gateway</html>".to_vec()).await;
        assert!(matches!(
            provider.fetch().await,
            Err(FetchError::Malformed { .. })
        ));
    }
}
