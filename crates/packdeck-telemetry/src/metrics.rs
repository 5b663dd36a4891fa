//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes only the counters and gauges the catalog and downloads report.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Label recorded for each catalog fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcomeLabel {
    /// The page was accepted and published.
    Ready,
    /// The response arrived after a newer query was issued.
    Superseded,
    /// An identical request was already outstanding.
    Coalesced,
    /// The request failed.
    Error,
}

impl FetchOutcomeLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Superseded => "superseded",
            Self::Coalesced => "coalesced",
            Self::Error => "error",
        }
    }
}

/// Label recorded when a download leaves the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The worker finished successfully.
    Completed,
    /// The worker reported an error.
    Failed,
    /// Bookkeeping was dropped while the worker kept running.
    Forgotten,
}

impl DownloadOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Forgotten => "forgotten",
        }
    }
}

/// Prometheus-backed metrics registry shared across components.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    catalog_fetches_total: IntCounterVec,
    downloads_started_total: IntCounter,
    downloads_finished_total: IntCounterVec,
    events_emitted_total: IntCounterVec,
    fsops_steps_total: IntCounterVec,
    active_downloads: IntGauge,
}

/// Snapshot of selected gauges and counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Downloads currently tracked as active.
    pub active_downloads: i64,
    /// Downloads started since process start.
    pub downloads_started_total: u64,
    /// Downloads that completed successfully.
    pub downloads_completed_total: u64,
    /// Downloads that failed.
    pub downloads_failed_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let catalog_fetches_total = counter_vec(
            "catalog_fetches_total",
            "Catalog fetches by outcome",
            &["outcome"],
        )?;
        let downloads_started_total = IntCounter::with_opts(Opts::new(
            "downloads_started_total",
            "Pack downloads started",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "downloads_started_total",
            source,
        })?;
        let downloads_finished_total = counter_vec(
            "downloads_finished_total",
            "Pack downloads that left the active set, by outcome",
            &["outcome"],
        )?;
        let events_emitted_total = counter_vec(
            "events_emitted_total",
            "Lifecycle events emitted by type",
            &["type"],
        )?;
        let fsops_steps_total = counter_vec(
            "fsops_steps_total",
            "Pack post-processing steps executed by status",
            &["step", "status"],
        )?;
        let active_downloads = IntGauge::with_opts(Opts::new(
            "active_downloads",
            "Pack downloads currently in progress",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "active_downloads",
            source,
        })?;

        register(&registry, "catalog_fetches_total", &catalog_fetches_total)?;
        register(&registry, "downloads_started_total", &downloads_started_total)?;
        register(&registry, "downloads_finished_total", &downloads_finished_total)?;
        register(&registry, "events_emitted_total", &events_emitted_total)?;
        register(&registry, "fsops_steps_total", &fsops_steps_total)?;
        register(&registry, "active_downloads", &active_downloads)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                catalog_fetches_total,
                downloads_started_total,
                downloads_finished_total,
                events_emitted_total,
                fsops_steps_total,
                active_downloads,
            }),
        })
    }

    /// Count one catalog fetch.
    pub fn inc_catalog_fetch(&self, outcome: FetchOutcomeLabel) {
        self.inner
            .catalog_fetches_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Count a started download and raise the active gauge.
    pub fn inc_download_started(&self) {
        self.inner.downloads_started_total.inc();
        self.inner.active_downloads.inc();
    }

    /// Count a download leaving the active set and lower the active gauge.
    pub fn inc_download_finished(&self, outcome: DownloadOutcome) {
        self.inner
            .downloads_finished_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.inner.active_downloads.dec();
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Increment the post-processing step counter.
    pub fn inc_fsops_step(&self, step: &str, status: &str) {
        self.inner
            .fsops_steps_total
            .with_label_values(&[step, status])
            .inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the download gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let finished = &self.inner.downloads_finished_total;
        MetricsSnapshot {
            active_downloads: self.inner.active_downloads.get(),
            downloads_started_total: self.inner.downloads_started_total.get(),
            downloads_completed_total: finished
                .with_label_values(&[DownloadOutcome::Completed.as_str()])
                .get(),
            downloads_failed_total: finished
                .with_label_values(&[DownloadOutcome::Failed.as_str()])
                .get(),
        }
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}
