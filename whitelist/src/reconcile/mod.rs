//! # Reconciler
//!
//! Drives every discovered vault through the whitelist state machine:
//!
//! ```text
//!   Fetched ──find_token──► present? ──yes──────────────────┐
//!                              │ no                          │
//!                              ▼                             ▼
//!                        TokenDecided ──insert_token──► TokenPersisted
//!                                                            │
//!                                              find_authorization
//!                                                            │
//!                              present? ──yes──► Skipped     │ no
//!                                                            ▼
//!                                                       VaultDecided
//!                                                            │
//!                                       authorize + await_confirmation
//!                                                            ▼
//!                                                        Authorized
//!                                                            │
//!                                                 insert_authorization
//!                                                            ▼
//!                                                        Persisted
//! ```
//!
//! Any error along the way ends that record as `Failed` and the run moves
//! on to the next one. Nothing written earlier for the record is undone: a
//! token catalogued before a revert stays catalogued.
//!
//! ## Pending journal
//!
//! The registry write and the `contracts` insert cannot be made atomic, so
//! the reconciler journals each write around dispatch (see
//! [`crate::journal`]). A vault that reaches `VaultDecided` with a
//! `Submitted` marker is re-verified against its recorded transaction and
//! persisted without sending a new one. If that transaction reverted, or
//! the ledger no longer knows the hash, a fresh one is sent. Markers are cleared once the row exists or the
//! registry rejects the write.
//!
//! ## Ordering
//!
//! Providers run one after another, records one after another, in the order
//! the upstream returned them. There is no concurrency inside a run, which
//! keeps nonce assignment for the single signer trivially serial.

mod outcome;

pub use outcome::{ProviderReport, RecordError, RecordOutcome, RecordState, RunError, RunReport};

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use alloy::primitives::TxHash;

use crate::address::Address;
use crate::journal::{PendingJournal, PendingStage};
use crate::ledger::AuthorizationLedger;
use crate::provider::ProviderAdapter;
use crate::record::VaultRecord;
use crate::store::RecordStore;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Collaborators a run needs, handed in explicitly by the caller.
#[derive(Clone)]
pub struct ReconcilerContext {
    pub store: Arc<dyn RecordStore>,
    pub ledger: Arc<dyn AuthorizationLedger>,
    pub journal: PendingJournal,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    ctx: ReconcilerContext,
}

/// How far a record got, and what it changed on the way.
struct Progress {
    state: RecordState,
    token_inserted: bool,
    dispatched: usize,
}

enum Finished {
    Skipped,
    Persisted { tx_hash: TxHash, resumed: bool },
}

impl Reconciler {
    pub fn new(ctx: ReconcilerContext) -> Self {
        Self { ctx }
    }

    /// Runs every provider in order and reports what happened.
    ///
    /// A provider whose fetch fails is recorded in the report and the next
    /// provider still runs.
    pub async fn run(&self, providers: &[Box<dyn ProviderAdapter>]) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("run", run_id = %run_id);

        async {
            info!(
                providers = providers.len(),
                store = self.ctx.store.backend(),
                ledger = self.ctx.ledger.backend(),
                pending = self.ctx.journal.len(),
                "reconciliation started"
            );

            let mut reports = Vec::with_capacity(providers.len());
            for provider in providers {
                reports.push(self.run_provider(provider.as_ref()).await);
            }

            let report = RunReport {
                run_id,
                started_at,
                finished_at: Utc::now(),
                providers: reports,
            };
            info!(
                persisted = report.persisted(),
                skipped = report.skipped(),
                failed = report.failed(),
                transactions = report.ledger_transactions(),
                failed_providers = report.failed_providers().len(),
                "reconciliation finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Fetches one provider's batch and processes each record in order.
    pub async fn run_provider(&self, provider: &dyn ProviderAdapter) -> ProviderReport {
        let kind = provider.kind();
        let span = info_span!("provider", provider = %kind);

        async {
            let mut report = ProviderReport::new(kind);

            let records = match provider.fetch().await {
                Ok(records) => records,
                Err(e) => {
                    error!(error = %e, "fetch failed, skipping batch");
                    report.batch_error = Some(e);
                    return report;
                }
            };
            report.fetched = records.len();
            info!(count = records.len(), "fetched vaults");

            for record in &records {
                let (outcome, dispatched) = self.process(record).await;
                report.ledger_transactions += dispatched;
                report.outcomes.push(outcome);
            }

            info!(
                persisted = report.persisted(),
                skipped = report.skipped(),
                failed = report.failed(),
                tokens = report.tokens_inserted(),
                "batch done"
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Takes one record to a terminal state. Never fails: errors become
    /// [`RecordOutcome::Failed`].
    pub async fn process_record(&self, record: &VaultRecord) -> RecordOutcome {
        self.process(record).await.0
    }

    async fn process(&self, record: &VaultRecord) -> (RecordOutcome, usize) {
        let span = info_span!("record", vault = %record.vault_address, token = %record.token_address);

        async {
            let mut progress = Progress {
                state: RecordState::Fetched,
                token_inserted: false,
                dispatched: 0,
            };
            let vault = record.vault_address;

            let outcome = match self.advance(record, &mut progress).await {
                Ok(Finished::Persisted { tx_hash, resumed }) => {
                    info!(tx = %tx_hash, resumed, name = %record.display_name, "vault whitelisted");
                    RecordOutcome::Persisted {
                        vault,
                        token_inserted: progress.token_inserted,
                        tx_hash,
                        resumed,
                    }
                }
                Ok(Finished::Skipped) => {
                    info!("vault already whitelisted");
                    RecordOutcome::Skipped {
                        vault,
                        token_inserted: progress.token_inserted,
                    }
                }
                Err(error) => {
                    warn!(state = %progress.state, error = %error, "could not whitelist vault");
                    RecordOutcome::Failed {
                        vault,
                        at: progress.state,
                        token_inserted: progress.token_inserted,
                        error,
                    }
                }
            };
            (outcome, progress.dispatched)
        }
        .instrument(span)
        .await
    }

    async fn advance(
        &self,
        record: &VaultRecord,
        progress: &mut Progress,
    ) -> Result<Finished, RecordError> {
        let store = &self.ctx.store;

        let token = store
            .find_token(&record.token_address)
            .await
            .map_err(RecordError::StoreQuery)?;
        if token.is_none() {
            progress.state = RecordState::TokenDecided;
            store
                .insert_token(&record.token_entry())
                .await
                .map_err(RecordError::StoreWrite)?;
            progress.token_inserted = true;
            debug!(protocol = %record.token_protocol, name = %record.token_name, "token catalogued");
        }
        progress.state = RecordState::TokenPersisted;

        let existing = store
            .find_authorization(&record.vault_address)
            .await
            .map_err(RecordError::StoreQuery)?;
        if existing.is_some() {
            self.forget_pending(&record.vault_address);
            return Ok(Finished::Skipped);
        }
        progress.state = RecordState::VaultDecided;

        let (tx_hash, resumed) = self.authorize(record, progress).await?;
        progress.state = RecordState::Authorized;

        store
            .insert_authorization(&record.authorization_entry())
            .await
            .map_err(RecordError::StoreWrite)?;
        progress.state = RecordState::Persisted;
        self.forget_pending(&record.vault_address);

        Ok(Finished::Persisted { tx_hash, resumed })
    }

    /// Gets the vault confirmed on the registry, reusing a journalled
    /// transaction when there is one. Returns the confirmed hash and whether
    /// it came from the journal.
    async fn authorize(
        &self,
        record: &VaultRecord,
        progress: &mut Progress,
    ) -> Result<(TxHash, bool), RecordError> {
        let vault = &record.vault_address;
        let label = record.protocol_label.as_str();
        let ledger = &self.ctx.ledger;
        let journal = &self.ctx.journal;

        if let Some(pending) = journal.get(vault)? {
            match pending.stage {
                PendingStage::Submitted(handle) => {
                    info!(tx = %handle, since = %pending.recorded_at, "re-verifying journalled transaction");
                    if !ledger.is_known(&handle).await? {
                        // Dropped or replaced: waiting on it would never end.
                        warn!(tx = %handle, "journalled transaction unknown to the ledger, resubmitting");
                    } else {
                        match ledger.await_confirmation(&handle).await {
                            Ok(confirmation) => return Ok((confirmation.tx_hash, true)),
                            Err(e) if e.is_reverted() => {
                                warn!(tx = %handle, "journalled transaction reverted, resubmitting");
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
                PendingStage::Intent => {
                    warn!(
                        since = %pending.recorded_at,
                        "previous dispatch was interrupted before a hash was known, resubmitting"
                    );
                }
            }
        }

        journal.record_intent(vault, label)?;
        let handle = ledger.authorize(vault, label).await?;
        progress.dispatched += 1;
        debug!(tx = %handle, protocol = label, "registry write dispatched");

        if let Err(e) = journal.record_submitted(vault, label, handle) {
            warn!(tx = %handle, error = %e, "could not journal dispatched transaction");
        }

        match ledger.await_confirmation(&handle).await {
            Ok(confirmation) => Ok((confirmation.tx_hash, false)),
            Err(e) => {
                if e.is_reverted() {
                    self.forget_pending(vault);
                }
                Err(e.into())
            }
        }
    }

    fn forget_pending(&self, vault: &Address) {
        if let Err(e) = self.ctx.journal.clear(vault) {
            warn!(error = %e, "could not clear pending marker");
        }
    }
}
