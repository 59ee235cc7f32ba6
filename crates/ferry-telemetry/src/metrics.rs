//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Counts replication outcomes by label so alerting can be built on them.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    events_received_total: IntCounterVec,
    copy_outcomes_total: IntCounterVec,
    dispatch_total: IntCounterVec,
    token_refresh_total: IntCounterVec,
    directories_created_total: IntCounter,
}

/// Snapshot of the replication counters for health reporting and tests.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Copies accepted by the destination account.
    pub copies_accepted: u64,
    /// Copies abandoned after a terminal failure.
    pub copies_failed: u64,
    /// Queue tasks enqueued.
    pub dispatched: u64,
    /// Queue tasks that failed to enqueue.
    pub dispatch_failures: u64,
    /// Successful token refreshes.
    pub token_refreshes: u64,
    /// Token refreshes that failed and kept the previous set.
    pub token_refresh_failures: u64,
    /// Directories created on the destination share.
    pub directories_created: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_received_total = counter_vec(
            "events_received_total",
            "Storage notifications received by kind",
            &["kind"],
        )?;
        let copy_outcomes_total = counter_vec(
            "copy_outcomes_total",
            "Cross-account copy requests by final outcome",
            &["outcome"],
        )?;
        let dispatch_total = counter_vec(
            "dispatch_total",
            "Processing queue dispatch decisions by outcome",
            &["outcome"],
        )?;
        let token_refresh_total = counter_vec(
            "token_refresh_total",
            "Access token refreshes by outcome",
            &["outcome"],
        )?;
        let directories_created_total = IntCounter::with_opts(Opts::new(
            "directories_created_total",
            "Directories created on the destination share",
        ))
        .map_err(|source| TelemetryError::counter("directories_created_total", "build", source))?;

        register(&registry, "events_received_total", &events_received_total)?;
        register(&registry, "copy_outcomes_total", &copy_outcomes_total)?;
        register(&registry, "dispatch_total", &dispatch_total)?;
        register(&registry, "token_refresh_total", &token_refresh_total)?;
        register(
            &registry,
            "directories_created_total",
            &directories_created_total,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                events_received_total,
                copy_outcomes_total,
                dispatch_total,
                token_refresh_total,
                directories_created_total,
            }),
        })
    }

    /// Increment the received notification counter for the event kind.
    pub fn inc_event(&self, kind: &str) {
        self.inner
            .events_received_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record the final outcome of a copy (`accepted` or `failed`).
    pub fn inc_copy(&self, outcome: &str) {
        self.inner
            .copy_outcomes_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a dispatch decision (`enqueued`, `skipped` or `failed`).
    pub fn inc_dispatch(&self, outcome: &str) {
        self.inner
            .dispatch_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a token refresh attempt (`succeeded` or `failed`).
    pub fn inc_token_refresh(&self, outcome: &str) {
        self.inner
            .token_refresh_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Add to the created directory counter.
    pub fn add_directories_created(&self, count: u64) {
        self.inner.directories_created_total.inc_by(count);
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
            .map_err(|source| TelemetryError::Encode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::NotUtf8 { source })
    }

    /// Take a point-in-time snapshot of the replication counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            copies_accepted: inner.copy_outcomes_total.with_label_values(&["accepted"]).get(),
            copies_failed: inner.copy_outcomes_total.with_label_values(&["failed"]).get(),
            dispatched: inner.dispatch_total.with_label_values(&["enqueued"]).get(),
            dispatch_failures: inner.dispatch_total.with_label_values(&["failed"]).get(),
            token_refreshes: inner
                .token_refresh_total
                .with_label_values(&["succeeded"])
                .get(),
            token_refresh_failures: inner
                .token_refresh_total
                .with_label_values(&["failed"])
                .get(),
            directories_created: inner.directories_created_total.get(),
        }
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::counter(name, "build", source))
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::counter(name, "register", source))
}
