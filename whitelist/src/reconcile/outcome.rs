//! What a reconciliation run produced: one [`RecordOutcome`] per vault,
//! rolled up into a [`ProviderReport`] per provider and a [`RunReport`] per
//! run.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use alloy::primitives::TxHash;

use crate::address::Address;
use crate::journal::JournalError;
use crate::ledger::LedgerError;
use crate::provider::{FetchError, ProviderKind};
use crate::store::StoreError;

// ---------------------------------------------------------------------------
// Per-Record
// ---------------------------------------------------------------------------

/// Progress markers of the per-record state machine.
///
/// ```text
/// Fetched → TokenDecided → TokenPersisted → VaultDecided → Authorized → Persisted
/// ```
///
/// A failed record reports the last state it reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Discovered, nothing looked up yet.
    Fetched,
    /// Token lookup done; the token was absent.
    TokenDecided,
    /// Token catalogued, either just now or earlier.
    TokenPersisted,
    /// Vault lookup done; the vault was absent.
    VaultDecided,
    /// Registry write confirmed.
    Authorized,
    /// Contract row written.
    Persisted,
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordState::Fetched => "fetched",
            RecordState::TokenDecided => "token-decided",
            RecordState::TokenPersisted => "token-persisted",
            RecordState::VaultDecided => "vault-decided",
            RecordState::Authorized => "authorized",
            RecordState::Persisted => "persisted",
        };
        f.write_str(s)
    }
}

/// Why a single record was abandoned. Never escapes the record boundary.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("store query failed: {0}")]
    StoreQuery(#[source] StoreError),

    #[error("store write failed: {0}")]
    StoreWrite(#[source] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("pending journal: {0}")]
    Journal(#[from] JournalError),
}

impl RecordError {
    /// Stable short name, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::StoreQuery(_) => "store_query",
            RecordError::StoreWrite(_) => "store_write",
            RecordError::Ledger(LedgerError::Submission { .. }) => "submission",
            RecordError::Ledger(LedgerError::Reverted { .. }) => "reverted",
            RecordError::Ledger(LedgerError::ConfirmationTimeout { .. }) => "confirmation_timeout",
            RecordError::Ledger(_) => "ledger",
            RecordError::Journal(_) => "journal",
        }
    }
}

/// Terminal state of one record.
#[derive(Debug)]
pub enum RecordOutcome {
    /// Authorized on-chain and recorded in the store.
    Persisted {
        vault: Address,
        token_inserted: bool,
        tx_hash: TxHash,
        /// Confirmed from a journalled transaction instead of a new one.
        resumed: bool,
    },
    /// Already authorized; nothing sent.
    Skipped { vault: Address, token_inserted: bool },
    /// Abandoned at `at`. Writes made before `at` stay in place.
    Failed {
        vault: Address,
        at: RecordState,
        token_inserted: bool,
        error: RecordError,
    },
}

impl RecordOutcome {
    pub fn vault(&self) -> Address {
        match self {
            RecordOutcome::Persisted { vault, .. }
            | RecordOutcome::Skipped { vault, .. }
            | RecordOutcome::Failed { vault, .. } => *vault,
        }
    }

    pub fn token_inserted(&self) -> bool {
        match self {
            RecordOutcome::Persisted { token_inserted, .. }
            | RecordOutcome::Skipped { token_inserted, .. }
            | RecordOutcome::Failed { token_inserted, .. } => *token_inserted,
        }
    }

    /// Short outcome name, used as a metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            RecordOutcome::Persisted { .. } => "persisted",
            RecordOutcome::Skipped { .. } => "skipped",
            RecordOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RecordOutcome::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// Per-Provider
// ---------------------------------------------------------------------------

/// Everything one provider's batch did.
#[derive(Debug)]
pub struct ProviderReport {
    pub provider: ProviderKind,
    /// Records the provider returned. Zero when the fetch failed.
    pub fetched: usize,
    /// Registry writes dispatched during this batch.
    pub ledger_transactions: usize,
    pub outcomes: Vec<RecordOutcome>,
    /// Set when the fetch failed and no record was processed.
    pub batch_error: Option<FetchError>,
}

impl ProviderReport {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            fetched: 0,
            ledger_transactions: 0,
            outcomes: Vec::new(),
            batch_error: None,
        }
    }

    pub fn persisted(&self) -> usize {
        self.count("persisted")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn tokens_inserted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.token_inserted()).count()
    }

    fn count(&self, label: &str) -> usize {
        self.outcomes.iter().filter(|o| o.label() == label).count()
    }
}

// ---------------------------------------------------------------------------
// Per-Run
// ---------------------------------------------------------------------------

/// Everything one reconciliation run did, in provider order.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub providers: Vec<ProviderReport>,
}

/// Raised at the process boundary when a provider batch could not be fetched.
#[derive(Debug, thiserror::Error)]
#[error("run {run_id}: {} provider batch(es) failed: {}", .failed.len(), .failed.join(", "))]
pub struct RunError {
    pub run_id: Uuid,
    pub failed: Vec<String>,
}

impl RunReport {
    pub fn persisted(&self) -> usize {
        self.providers.iter().map(ProviderReport::persisted).sum()
    }

    pub fn skipped(&self) -> usize {
        self.providers.iter().map(ProviderReport::skipped).sum()
    }

    pub fn failed(&self) -> usize {
        self.providers.iter().map(ProviderReport::failed).sum()
    }

    pub fn ledger_transactions(&self) -> usize {
        self.providers.iter().map(|p| p.ledger_transactions).sum()
    }

    pub fn failed_providers(&self) -> Vec<ProviderKind> {
        self.providers
            .iter()
            .filter(|p| p.batch_error.is_some())
            .map(|p| p.provider)
            .collect()
    }

    /// Wall-clock duration in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }

    /// `Err` when any provider batch failed to fetch. Per-record failures
    /// are reported, not raised.
    pub fn into_result(self) -> Result<RunReport, RunError> {
        let failed: Vec<String> = self
            .providers
            .iter()
            .filter_map(|p| p.batch_error.as_ref().map(|e| e.to_string()))
            .collect();
        if failed.is_empty() {
            Ok(self)
        } else {
            Err(RunError {
                run_id: self.run_id,
                failed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new(alloy::primitives::Address::repeat_byte(byte))
    }

    fn report_with(outcomes: Vec<RecordOutcome>) -> ProviderReport {
        let mut report = ProviderReport::new(ProviderKind::Infrared);
        report.fetched = outcomes.len();
        report.outcomes = outcomes;
        report
    }

    #[test]
    fn provider_counts() {
        let report = report_with(vec![
            RecordOutcome::Persisted {
                vault: addr(1),
                token_inserted: true,
                tx_hash: TxHash::repeat_byte(1),
                resumed: false,
            },
            RecordOutcome::Skipped {
                vault: addr(2),
                token_inserted: false,
            },
            RecordOutcome::Failed {
                vault: addr(3),
                at: RecordState::VaultDecided,
                token_inserted: true,
                error: RecordError::Ledger(LedgerError::Reverted {
                    tx_hash: TxHash::repeat_byte(3),
                }),
            },
        ]);

        assert_eq!(report.persisted(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.tokens_inserted(), 2);
    }

    #[test]
    fn error_kinds_are_stable() {
        let reverted = RecordError::Ledger(LedgerError::Reverted {
            tx_hash: TxHash::ZERO,
        });
        assert_eq!(reverted.kind(), "reverted");
        let query = RecordError::StoreQuery(StoreError::Transport {
            table: crate::store::Table::Tokens,
            reason: "down".into(),
        });
        assert_eq!(query.kind(), "store_query");
    }

    #[test]
    fn batch_error_fails_the_run() {
        let mut failed = ProviderReport::new(ProviderKind::BgtStation);
        failed.batch_error = Some(FetchError::Status {
            provider: ProviderKind::BgtStation,
            status: 502,
        });
        let now = Utc::now();
        let report = RunReport {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            providers: vec![failed, report_with(Vec::new())],
        };

        assert_eq!(report.failed_providers(), vec![ProviderKind::BgtStation]);
        let err = report.into_result().unwrap_err();
        assert_eq!(err.failed.len(), 1);
        assert!(err.to_string().contains("HTTP 502"));
    }

    #[test]
    fn record_failures_do_not_fail_the_run() {
        let now = Utc::now();
        let report = RunReport {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            providers: vec![report_with(vec![RecordOutcome::Failed {
                vault: addr(9),
                at: RecordState::Fetched,
                token_inserted: false,
                error: RecordError::StoreQuery(StoreError::Transport {
                    table: crate::store::Table::Tokens,
                    reason: "timeout".into(),
                }),
            }])],
        };
        assert!(report.into_result().is_ok());
    }
}
