//! # Hosted Record Store
//!
//! [`RecordStore`] over the Supabase PostgREST interface. Reads are
//! equality-filtered selects (`?address=eq.<checksummed>`), writes are
//! single-row inserts with `Prefer: return=minimal`. The unique constraint
//! on `address` and the `contracts.token_address` foreign key are enforced
//! by Postgres; PostgREST reports them as `409 Conflict`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{RecordStore, StoreError, StoreResult, Table};
use crate::address::Address;
use crate::config::{DEFAULT_HTTP_TIMEOUT, POSTGREST_PATH};
use crate::record::{AuthorizationEntry, TokenEntry};

/// Postgres error code for a unique violation, echoed by PostgREST.
const UNIQUE_VIOLATION: &str = "23505";

/// Connection settings for the hosted store.
#[derive(Clone)]
pub struct PostgrestConfig {
    /// Project URL, e.g. `https://<project>.supabase.co`.
    pub base_url: String,
    /// Service key. Sent as both `apikey` and bearer token.
    pub api_key: String,
    pub timeout: Duration,
}

impl PostgrestConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for PostgrestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Wire Rows
// ---------------------------------------------------------------------------

/// `lp_tokens` row as PostgREST sends and receives it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LpTokenRow {
    address: String,
    authorized: bool,
    protocol: String,
    name: String,
}

/// `contracts` row. `id` is generated server-side and never sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContractRow {
    address: String,
    is_allowed: bool,
    protocol: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    token_address: Option<String>,
}

impl From<&TokenEntry> for LpTokenRow {
    fn from(entry: &TokenEntry) -> Self {
        Self {
            address: entry.address.to_checksum(),
            authorized: entry.authorized,
            protocol: entry.protocol.clone(),
            name: entry.name.clone(),
        }
    }
}

impl LpTokenRow {
    fn into_entry(self) -> StoreResult<TokenEntry> {
        Ok(TokenEntry {
            address: parse_column(Table::Tokens, &self.address)?,
            protocol: self.protocol,
            name: self.name,
            authorized: self.authorized,
        })
    }
}

impl From<&AuthorizationEntry> for ContractRow {
    fn from(entry: &AuthorizationEntry) -> Self {
        Self {
            address: entry.address.to_checksum(),
            is_allowed: entry.is_allowed,
            protocol: entry.protocol.clone(),
            name: entry.name.clone(),
            token_address: entry.token_address.map(|a| a.to_checksum()),
        }
    }
}

impl ContractRow {
    fn into_entry(self) -> StoreResult<AuthorizationEntry> {
        let token_address = match self.token_address.as_deref() {
            Some(raw) => Some(parse_column(Table::Contracts, raw)?),
            None => None,
        };
        Ok(AuthorizationEntry {
            address: parse_column(Table::Contracts, &self.address)?,
            is_allowed: self.is_allowed,
            protocol: self.protocol,
            name: self.name,
            token_address,
        })
    }
}

fn parse_column(table: Table, raw: &str) -> StoreResult<Address> {
    Address::parse(raw).map_err(|e| StoreError::Malformed {
        table,
        reason: e.to_string(),
    })
}

/// PostgREST error body. Only `code` matters to us.
#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Record store backed by the hosted Supabase project.
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    http: Client,
    config: PostgrestConfig,
}

impl PostgrestStore {
    pub fn new(config: PostgrestConfig) -> StoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Transport {
                table: Table::Tokens,
                reason: e.to_string(),
            })?;
        Ok(Self { http, config })
    }

    fn table_url(&self, table: Table) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            POSTGREST_PATH,
            table.name()
        )
    }

    async fn select_one<R: for<'de> Deserialize<'de>>(
        &self,
        table: Table,
        address: &Address,
    ) -> StoreResult<Option<R>> {
        let response = self
            .http
            .get(self.table_url(table))
            .query(&[
                ("select", "*".to_string()),
                ("address", format!("eq.{}", address.to_checksum())),
            ])
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| StoreError::Transport {
                table,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Transport {
                table,
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let mut rows: Vec<R> = response.json().await.map_err(|e| StoreError::Malformed {
            table,
            reason: e.to_string(),
        })?;
        // address is unique, so at most one row comes back.
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn insert_row<R: Serialize>(&self, table: Table, address: &Address, row: &R) -> StoreResult<()> {
        let response = self
            .http
            .post(self.table_url(table))
            .header("apikey", &self.config.api_key)
            .header("Prefer", "return=minimal")
            .bearer_auth(&self.config.api_key)
            .json(row)
            .send()
            .await
            .map_err(|e| StoreError::Transport {
                table,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_insert_failure(table, address, status, &body))
    }
}

/// Maps a failed insert response to the store error taxonomy.
fn classify_insert_failure(table: Table, address: &Address, status: StatusCode, body: &str) -> StoreError {
    let parsed: Option<PostgrestErrorBody> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|b| b.code.as_deref());

    if code == Some(UNIQUE_VIOLATION) {
        return StoreError::Duplicate {
            table,
            address: *address,
        };
    }
    if status == StatusCode::CONFLICT || status == StatusCode::BAD_REQUEST {
        let reason = parsed
            .and_then(|b| b.message)
            .unwrap_or_else(|| body.to_string());
        return StoreError::Rejected { table, reason };
    }
    StoreError::Transport {
        table,
        reason: format!("HTTP {status}: {body}"),
    }
}

#[async_trait]
impl RecordStore for PostgrestStore {
    async fn find_token(&self, address: &Address) -> StoreResult<Option<TokenEntry>> {
        self.select_one::<LpTokenRow>(Table::Tokens, address)
            .await?
            .map(LpTokenRow::into_entry)
            .transpose()
    }

    async fn find_authorization(
        &self,
        address: &Address,
    ) -> StoreResult<Option<AuthorizationEntry>> {
        self.select_one::<ContractRow>(Table::Contracts, address)
            .await?
            .map(ContractRow::into_entry)
            .transpose()
    }

    async fn insert_token(&self, entry: &TokenEntry) -> StoreResult<()> {
        self.insert_row(Table::Tokens, &entry.address, &LpTokenRow::from(entry))
            .await
    }

    async fn insert_authorization(&self, entry: &AuthorizationEntry) -> StoreResult<()> {
        self.insert_row(Table::Contracts, &entry.address, &ContractRow::from(entry))
            .await
    }

    fn backend(&self) -> &'static str {
        "postgrest"
    }
}
