// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Gauge Whitelist Runner
//!
//! Entry point for the `whitelist-gauges` binary. Loads `.env`, parses CLI
//! arguments, wires the record store, registry client, pending journal and
//! providers into a [`Reconciler`], runs it once and exits.
//!
//! `--dry-run` keeps every write in memory: registry calls are logged, store
//! inserts are staged over the configured backend, and the journal is
//! temporary.
//!
//! Exit status is non-zero when a provider batch could not be fetched or
//! the run could not be set up. Individual vault failures are logged and
//! counted, and do not fail the process.

mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use gauge_whitelist::config::{JOURNAL_DIR, LOCAL_STORE_DIR};
use gauge_whitelist::journal::{PendingJournal, PendingStage};
use gauge_whitelist::ledger::{AuthorizationLedger, DryRunLedger, HoneyQueenLedger, LedgerConfig};
use gauge_whitelist::provider::{
    self, BgtStationProvider, FactoryConfig, FactoryLogsProvider, InfraredProvider,
    ProviderAdapter, ProviderKind,
};
use gauge_whitelist::store::{
    DryRunStore, PostgrestConfig, PostgrestStore, RecordStore, SledRecordStore,
};
use gauge_whitelist::{Reconciler, ReconcilerContext};

use cli::{Commands, PendingArgs, RunArgs, StoreBackend, WhitelistCli};
use logging::LogFormat;
use metrics::RunMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    // Same .env the hosted job reads; absent is fine.
    dotenvy::dotenv().ok();

    let cli = WhitelistCli::parse();

    match cli.command {
        Some(Commands::Pending(args)) => list_pending(args),
        None => run(cli.run).await,
    }
}

/// One reconciliation run over every requested provider.
async fn run(args: RunArgs) -> Result<()> {
    logging::init_logging(
        logging::DEFAULT_DIRECTIVES,
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        providers = ?args.provider_kinds(),
        store = ?args.effective_store(),
        dry_run = args.dry_run,
        data_dir = %args.data_dir.display(),
        "starting whitelist-gauges"
    );

    std::fs::create_dir_all(&args.data_dir).with_context(|| {
        format!("failed to create data directory: {}", args.data_dir.display())
    })?;

    // --- Pending journal ---
    let journal = open_journal(&args)?;
    if !journal.is_empty() {
        tracing::warn!(
            pending = journal.len(),
            "journal holds unrecorded registry writes, they will be re-verified"
        );
    }

    // --- Record store ---
    let store = open_store(&args)?;

    // --- Registry client ---
    let (ledger, evm_ledger) = connect_ledger(&args).await?;

    // --- Providers ---
    let providers = build_providers(&args, evm_ledger.as_deref()).await?;

    // --- Run ---
    let reconciler = Reconciler::new(ReconcilerContext {
        store,
        ledger,
        journal,
    });
    let report = reconciler.run(&providers).await;

    for batch in &report.providers {
        match &batch.batch_error {
            Some(e) => tracing::error!(provider = %batch.provider, error = %e, "provider failed"),
            None => tracing::info!(
                provider = %batch.provider,
                fetched = batch.fetched,
                persisted = batch.persisted(),
                skipped = batch.skipped(),
                failed = batch.failed(),
                tokens = batch.tokens_inserted(),
                transactions = batch.ledger_transactions,
                "provider summary"
            ),
        }
    }

    // --- Metrics ---
    if let Some(path) = &args.metrics_file {
        let metrics = RunMetrics::new().context("failed to create metrics registry")?;
        metrics.observe(&report);
        metrics.write_textfile(path)?;
        tracing::info!(path = %path.display(), "metrics written");
    }

    let elapsed = report.elapsed_secs();
    report.into_result()?;
    tracing::info!(elapsed_secs = elapsed, "whitelist-gauges finished");
    Ok(())
}

/// The on-disk journal, or a throwaway one under `--dry-run` so dry-run
/// hashes never reach a real run.
fn open_journal(args: &RunArgs) -> Result<PendingJournal> {
    if args.dry_run {
        return PendingJournal::open_temporary().context("failed to open in-memory journal");
    }
    let path = args.data_dir.join(JOURNAL_DIR);
    PendingJournal::open(&path)
        .with_context(|| format!("failed to open pending journal at {}", path.display()))
}

/// The configured store. Under `--dry-run` its writes are staged in memory.
fn open_store(args: &RunArgs) -> Result<Arc<dyn RecordStore>> {
    let store = open_backend(args)?;
    if args.dry_run {
        tracing::info!(backend = store.backend(), "dry run: store writes will be logged, not sent");
        return Ok(Arc::new(DryRunStore::new(store)));
    }
    Ok(store)
}

fn open_backend(args: &RunArgs) -> Result<Arc<dyn RecordStore>> {
    match args.effective_store() {
        StoreBackend::Postgrest => {
            let url = args
                .store_url
                .as_deref()
                .context("--store-url (SUPABASE_URL) is required for the postgrest store")?;
            let key = args
                .store_key
                .as_deref()
                .context("--store-key (SUPABASE_KEY) is required for the postgrest store")?;

            let mut config = PostgrestConfig::new(url, key);
            config.timeout = args.http_timeout();
            let store = PostgrestStore::new(config).context("failed to build store client")?;
            tracing::info!(url, "using hosted record store");
            Ok(Arc::new(store))
        }
        StoreBackend::Sled => {
            let path = args.data_dir.join(LOCAL_STORE_DIR);
            let store = SledRecordStore::open(&path).with_context(|| {
                format!("failed to open local store at {}", path.display())
            })?;
            tracing::info!(path = %path.display(), "using local record store");
            Ok(Arc::new(store))
        }
    }
}

/// The ledger to reconcile against, plus the signing client when there is
/// one so on-chain discovery can share its connection.
async fn connect_ledger(
    args: &RunArgs,
) -> Result<(Arc<dyn AuthorizationLedger>, Option<Arc<HoneyQueenLedger>>)> {
    if args.dry_run {
        tracing::warn!("dry run: registry writes will be logged, not sent");
        let ledger: Arc<dyn AuthorizationLedger> = Arc::new(DryRunLedger::new());
        return Ok((ledger, None));
    }

    let registry = args
        .registry_address
        .context("--registry-address (WHITELIST_REGISTRY_ADDRESS) is required")?;
    let private_key = args
        .private_key
        .as_deref()
        .context("--private-key (PRIVATE_KEY) is required")?;

    let mut config = LedgerConfig::new(&args.rpc_url, registry);
    config.confirmation_timeout = args.confirmation_timeout();
    config.required_confirmations = args.required_confirmations;

    let ledger = Arc::new(
        HoneyQueenLedger::connect(config, private_key)
            .await
            .context("failed to connect registry client")?,
    );
    let shared: Arc<dyn AuthorizationLedger> = ledger.clone();
    Ok((shared, Some(ledger)))
}

async fn build_providers(
    args: &RunArgs,
    evm_ledger: Option<&HoneyQueenLedger>,
) -> Result<Vec<Box<dyn ProviderAdapter>>> {
    let http = provider::http_client(args.http_timeout()).context("failed to build HTTP client")?;

    let mut providers: Vec<Box<dyn ProviderAdapter>> = Vec::new();
    for kind in args.provider_kinds() {
        match kind {
            ProviderKind::BgtStation => {
                providers.push(Box::new(BgtStationProvider::new(http.clone())));
            }
            ProviderKind::Infrared => {
                providers.push(Box::new(InfraredProvider::new(http.clone())));
            }
            ProviderKind::FactoryLogs => {
                let config = FactoryConfig {
                    factory: args.factory_address,
                    start_block: args.factory_start_block,
                    ..FactoryConfig::default()
                };
                let factory = match evm_ledger {
                    Some(ledger) => FactoryLogsProvider::new(ledger.provider(), config),
                    None => FactoryLogsProvider::connect(&args.rpc_url, config)
                        .await
                        .context("failed to connect factory log reader")?,
                };
                providers.push(Box::new(factory));
            }
        }
    }
    Ok(providers)
}

/// Prints outstanding journal markers, oldest first.
fn list_pending(args: PendingArgs) -> Result<()> {
    let path = args.data_dir.join(JOURNAL_DIR);
    if !path.exists() {
        println!("No pending journal at {}.", path.display());
        return Ok(());
    }
    print_pending(&path)
}

fn print_pending(path: &Path) -> Result<()> {
    let journal = PendingJournal::open(path)
        .with_context(|| format!("failed to open pending journal at {}", path.display()))?;
    let mut entries = journal.list().context("failed to read pending journal")?;
    entries.sort_by_key(|e| e.recorded_at);

    if entries.is_empty() {
        println!("No pending registry writes.");
        return Ok(());
    }

    for entry in entries {
        let stage = match entry.stage {
            PendingStage::Intent => "intent (no transaction)".to_string(),
            PendingStage::Submitted(handle) => format!("submitted {handle}"),
        };
        println!(
            "{}  {:<12}  {}  {}",
            entry.recorded_at.to_rfc3339(),
            entry.protocol_label,
            entry.vault,
            stage
        );
    }
    Ok(())
}
