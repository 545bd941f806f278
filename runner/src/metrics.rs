//! # Prometheus Metrics
//!
//! Per-run metrics for the whitelist job. The job is a batch, so instead of
//! serving `/metrics` it writes the text exposition to a file for the
//! node-exporter textfile collector.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use anyhow::{Context, Result};
use prometheus::{Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::path::Path;

use gauge_whitelist::reconcile::{RecordOutcome, RunReport};

/// Holds all Prometheus metric handles for one run.
pub struct RunMetrics {
    registry: Registry,
    /// Terminal record states, by provider and outcome.
    pub records_total: IntCounterVec,
    /// Failed records, by provider and error kind.
    pub record_failures_total: IntCounterVec,
    /// Tokens catalogued, by provider.
    pub tokens_catalogued_total: IntCounterVec,
    /// Registry writes dispatched, by provider.
    pub ledger_transactions_total: IntCounterVec,
    /// Provider batches that could not be fetched.
    pub provider_fetch_failures_total: IntCounterVec,
    /// Wall-clock duration of the run.
    pub run_duration_seconds: Gauge,
    /// Unix time the run finished.
    pub last_run_timestamp_seconds: IntGauge,
}

impl RunMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("whitelist".into()), None)?;

        let records_total = IntCounterVec::new(
            Opts::new("records_total", "Vault records by terminal state"),
            &["provider", "outcome"],
        )?;
        registry.register(Box::new(records_total.clone()))?;

        let record_failures_total = IntCounterVec::new(
            Opts::new("record_failures_total", "Failed vault records by error kind"),
            &["provider", "kind"],
        )?;
        registry.register(Box::new(record_failures_total.clone()))?;

        let tokens_catalogued_total = IntCounterVec::new(
            Opts::new("tokens_catalogued_total", "Staking tokens inserted"),
            &["provider"],
        )?;
        registry.register(Box::new(tokens_catalogued_total.clone()))?;

        let ledger_transactions_total = IntCounterVec::new(
            Opts::new(
                "ledger_transactions_total",
                "setProtocolOfTarget transactions dispatched",
            ),
            &["provider"],
        )?;
        registry.register(Box::new(ledger_transactions_total.clone()))?;

        let provider_fetch_failures_total = IntCounterVec::new(
            Opts::new(
                "provider_fetch_failures_total",
                "Provider batches that could not be fetched",
            ),
            &["provider"],
        )?;
        registry.register(Box::new(provider_fetch_failures_total.clone()))?;

        let run_duration_seconds =
            Gauge::new("run_duration_seconds", "Duration of the last reconciliation run")?;
        registry.register(Box::new(run_duration_seconds.clone()))?;

        let last_run_timestamp_seconds = IntGauge::new(
            "last_run_timestamp_seconds",
            "Unix time the last reconciliation run finished",
        )?;
        registry.register(Box::new(last_run_timestamp_seconds.clone()))?;

        Ok(Self {
            registry,
            records_total,
            record_failures_total,
            tokens_catalogued_total,
            ledger_transactions_total,
            provider_fetch_failures_total,
            run_duration_seconds,
            last_run_timestamp_seconds,
        })
    }

    /// Folds a finished run into the counters.
    pub fn observe(&self, report: &RunReport) {
        for batch in &report.providers {
            let provider = batch.provider.as_str();

            if batch.batch_error.is_some() {
                self.provider_fetch_failures_total
                    .with_label_values(&[provider])
                    .inc();
            }

            for outcome in &batch.outcomes {
                self.records_total
                    .with_label_values(&[provider, outcome.label()])
                    .inc();
                if let RecordOutcome::Failed { error, .. } = outcome {
                    self.record_failures_total
                        .with_label_values(&[provider, error.kind()])
                        .inc();
                }
            }

            self.tokens_catalogued_total
                .with_label_values(&[provider])
                .inc_by(batch.tokens_inserted() as u64);
            self.ledger_transactions_total
                .with_label_values(&[provider])
                .inc_by(batch.ledger_transactions as u64);
        }

        self.run_duration_seconds.set(report.elapsed_secs());
        self.last_run_timestamp_seconds
            .set(report.finished_at.timestamp());
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).context("prometheus output is not utf-8")
    }

    /// Writes the exposition to `path`, replacing it atomically so the
    /// collector never reads a half-written file.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let body = self.encode()?;
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, body)
            .with_context(|| format!("failed to write metrics to {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to move metrics into {}", path.display()))?;
        Ok(())
    }
}
