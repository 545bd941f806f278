//! # CLI Interface
//!
//! Command-line arguments for `whitelist-gauges`, using `clap` derive with
//! environment fallbacks so the same `.env` file the hosted job uses works
//! locally. Invoked bare, the binary performs one reconciliation run.
//! `pending` lists registry writes still waiting to be recorded.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use gauge_whitelist::config::{
    DEFAULT_FACTORY_ADDRESS, DEFAULT_FACTORY_START_BLOCK, DEFAULT_REQUIRED_CONFIRMATIONS,
    DEFAULT_RPC_URL,
};
use gauge_whitelist::{Address, ProviderKind};

/// Whitelists newly discovered reward vaults in the HoneyQueen registry.
///
/// Pulls vault listings from the configured providers, catalogues new
/// staking tokens, authorizes new vaults on-chain and records them once the
/// transaction is confirmed.
#[derive(Parser, Debug)]
#[command(
    name = "whitelist-gauges",
    about = "Whitelists discovered reward vaults in HoneyQueen",
    version,
    args_conflicts_with_subcommands = true
)]
pub struct WhitelistCli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List journalled registry writes that have not been recorded yet.
    Pending(PendingArgs),
}

/// Where catalogue rows are read from and written to.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Hosted Supabase tables over PostgREST.
    Postgrest,
    /// Local sled database under the data directory.
    Sled,
}

/// Arguments for a reconciliation run.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON-RPC endpoint of the chain hosting the registry.
    #[arg(long, env = "WHITELIST_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// HoneyQueen registry contract. Required unless `--dry-run`.
    #[arg(long, env = "WHITELIST_REGISTRY_ADDRESS")]
    pub registry_address: Option<Address>,

    /// Hex-encoded operator key that signs registry writes. Required unless
    /// `--dry-run`.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Record store backend. Defaults to `postgrest`, or `sled` with `--dry-run`.
    #[arg(long, value_enum, env = "WHITELIST_STORE")]
    pub store: Option<StoreBackend>,

    /// Supabase project URL, for the `postgrest` store.
    #[arg(long, env = "SUPABASE_URL")]
    pub store_url: Option<String>,

    /// Supabase API key, for the `postgrest` store.
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    pub store_key: Option<String>,

    /// Directory for the pending journal and the local store.
    #[arg(long, env = "WHITELIST_DATA_DIR", default_value = ".whitelist")]
    pub data_dir: PathBuf,

    /// Providers to pull from, in order: bgt, infrared, factory.
    #[arg(
        long = "provider",
        value_delimiter = ',',
        default_values_t = [ProviderKind::BgtStation, ProviderKind::Infrared]
    )]
    pub providers: Vec<ProviderKind>,

    /// Reward-vault factory scanned by the `factory` provider.
    #[arg(long, default_value_t = Address::new(DEFAULT_FACTORY_ADDRESS))]
    pub factory_address: Address,

    /// First block scanned by the `factory` provider.
    #[arg(long, default_value_t = DEFAULT_FACTORY_START_BLOCK)]
    pub factory_start_block: u64,

    /// Give up waiting for a receipt after this many seconds. Unset waits
    /// until the RPC stops watching.
    #[arg(long, env = "WHITELIST_CONFIRMATION_TIMEOUT_SECS")]
    pub confirmation_timeout_secs: Option<u64>,

    /// Blocks to wait on top of inclusion before a write counts as confirmed.
    #[arg(long, default_value_t = DEFAULT_REQUIRED_CONFIRMATIONS)]
    pub required_confirmations: u64,

    /// Timeout for catalogue and store HTTP requests.
    #[arg(long, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Log output: `pretty` or `json`.
    #[arg(long, env = "WHITELIST_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Write Prometheus text metrics for the run to this file.
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    /// Log registry writes instead of sending them.
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    /// The store to use once `--dry-run` is taken into account.
    pub fn effective_store(&self) -> StoreBackend {
        match self.store {
            Some(store) => store,
            None if self.dry_run => StoreBackend::Sled,
            None => StoreBackend::Postgrest,
        }
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout_secs.map(Duration::from_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Requested providers in order, each at most once.
    pub fn provider_kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = Vec::with_capacity(self.providers.len());
        for kind in &self.providers {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }
}

/// Arguments for the `pending` subcommand.
#[derive(Args, Debug)]
pub struct PendingArgs {
    /// Directory holding the pending journal.
    #[arg(long, env = "WHITELIST_DATA_DIR", default_value = ".whitelist")]
    pub data_dir: PathBuf,
}
