// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Gauge Whitelist Core Library
//!
//! Keeps the HoneyQueen registry and the off-chain catalogue in step with
//! the reward vaults that exist upstream. Each run pulls vault listings
//! from a set of providers, catalogues any new staking token, whitelists
//! any new vault on-chain with `setProtocolOfTarget`, and records the vault
//! once the transaction is confirmed.
//!
//! ## Architecture
//!
//! - **address**: Checksummed EVM addresses. The one key type for every table.
//! - **record**: Vault records, listings, and the two persisted row shapes.
//! - **provider**: Upstream catalogues (BGT Station, Infrared, factory logs).
//! - **store**: The `lp_tokens` / `contracts` tables (PostgREST or sled).
//! - **ledger**: The on-chain registry client (alloy) and a dry-run stand-in.
//! - **journal**: Local markers for registry writes not yet recorded.
//! - **reconcile**: The per-record state machine and run reports.
//! - **config**: Chain, catalogue and storage constants.
//!
//! ## Guarantees
//!
//! 1. A vault row is only written after its registry transaction confirms.
//! 2. A token row is always written before any vault row that references it.
//! 3. A vault already present in the store is never sent to the registry again.
//! 4. One bad record never stops the rest of the run.

pub mod address;
pub mod config;
pub mod journal;
pub mod ledger;
pub mod provider;
pub mod reconcile;
pub mod record;
pub mod store;

pub use address::{Address, AddressError};
pub use journal::{JournalError, PendingJournal};
pub use ledger::{AuthorizationLedger, LedgerError, TxHandle};
pub use provider::{FetchError, ProviderAdapter, ProviderKind};
pub use reconcile::{Reconciler, ReconcilerContext, RecordOutcome, RunReport};
pub use record::{AuthorizationEntry, TokenEntry, VaultRecord};
pub use store::{RecordStore, StoreError};
