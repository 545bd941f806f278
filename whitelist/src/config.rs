//! # Whitelist Configuration & Constants
//!
//! Every upstream URL, protocol label and storage name the reconciler uses
//! lives here. Runtime values (RPC endpoint, credentials, registry address)
//! come from the runner's CLI; these are the ones that only change when an
//! upstream changes shape.

use std::time::Duration;

use alloy::primitives::{address, Address as EvmAddress};

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Public RPC for the Berachain bArtio testnet, where HoneyQueen is deployed.
pub const DEFAULT_RPC_URL: &str = "https://bartio.rpc.berachain.com";

/// Confirmations required before a registry write counts as final.
/// bArtio has single-slot finality, so one is enough there.
pub const DEFAULT_REQUIRED_CONFIRMATIONS: u64 = 1;

/// Reward-vault factory on bArtio. Emits `VaultCreated` for every vault.
pub const DEFAULT_FACTORY_ADDRESS: EvmAddress = address!("0x2B6e40f65D82A0cB98795bC7587a71bfa49fBB2B");

/// First block worth scanning for `VaultCreated`. Nothing earlier exists.
pub const DEFAULT_FACTORY_START_BLOCK: u64 = 5_762;

/// Block window per `eth_getLogs` call. Public RPCs reject wider ranges.
pub const FACTORY_LOG_WINDOW: u64 = 5_000;

/// Concurrent ERC-20 `name()` reads while resolving factory vaults.
pub const FACTORY_NAME_LOOKUP_CONCURRENCY: usize = 8;

// ---------------------------------------------------------------------------
// Provider Catalogues
// ---------------------------------------------------------------------------

/// BGT Station indexer listing. The page size is large enough to pull the
/// whole catalogue in one request.
pub const BGT_STATION_VAULTS_URL: &str =
    "https://bartio-pol-indexer.berachain-devnet.com/berachain/v1alpha1/beacon/vaults?pageSize=9999";

/// Infrared vault listing. The API caps pages at 100 entries.
pub const INFRARED_VAULTS_URL: &str = "https://api.staging.infrared.finance/v2/vaults?page=1&limit=100";

/// Timeout for catalogue and record-store HTTP requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Protocol Labels
// ---------------------------------------------------------------------------

/// Label stamped on vaults discovered through BGT Station (indexer or factory).
pub const BGT_STATION_LABEL: &str = "BGT Station";

/// Label stamped on vaults discovered through Infrared.
pub const INFRARED_LABEL: &str = "Infrared";

// ---------------------------------------------------------------------------
// Record Store
// ---------------------------------------------------------------------------

/// Hosted table holding authorized vault contracts.
pub const CONTRACTS_TABLE: &str = "contracts";

/// Hosted table holding catalogued staking (LP) tokens.
pub const LP_TOKENS_TABLE: &str = "lp_tokens";

/// PostgREST mount point under the store base URL.
pub const POSTGREST_PATH: &str = "rest/v1";

/// sled tree used by the pending journal.
pub const PENDING_TREE: &str = "pending";

/// Subdirectory of the data dir holding the local record store.
pub const LOCAL_STORE_DIR: &str = "store";

/// Subdirectory of the data dir holding the pending journal.
pub const JOURNAL_DIR: &str = "journal";
