//! # Prometheus Metrics
//!
//! Operational metrics for the ledger node, scraped at `/metrics` on the
//! configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `loyalty` namespace so they do not collide with any default global
//! registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct LedgerMetrics {
    registry: Registry,
    /// Invocations received, by function name.
    pub invocations_total: IntCounterVec,
    /// Invocations that did not commit, by error kind.
    pub invocation_failures_total: IntCounterVec,
    /// Commits rejected because a concurrent commit changed what was read.
    pub commit_conflicts_total: IntCounter,
    /// Ledger events broadcast to subscribers, by event name.
    pub events_emitted_total: IntCounterVec,
    /// Entries in the backing store after the latest commit.
    pub ledger_entries: IntGauge,
    /// Wall-clock time from request to commit, in seconds.
    pub invocation_latency_seconds: Histogram,
}

impl LedgerMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("loyalty".into()), None)?;

        let invocations_total = IntCounterVec::new(
            Opts::new("invocations_total", "Total number of invocations received"),
            &["function"],
        )?;
        registry.register(Box::new(invocations_total.clone()))?;

        let invocation_failures_total = IntCounterVec::new(
            Opts::new(
                "invocation_failures_total",
                "Total number of invocations that did not commit",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(invocation_failures_total.clone()))?;

        let commit_conflicts_total = IntCounter::new(
            "commit_conflicts_total",
            "Total number of commits rejected by read-set validation",
        )?;
        registry.register(Box::new(commit_conflicts_total.clone()))?;

        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Total number of ledger events broadcast"),
            &["event"],
        )?;
        registry.register(Box::new(events_emitted_total.clone()))?;

        let ledger_entries =
            IntGauge::new("ledger_entries", "Number of entries in the ledger store")?;
        registry.register(Box::new(ledger_entries.clone()))?;

        let invocation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "invocation_latency_seconds",
                "End-to-end invocation latency in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(invocation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            invocations_total,
            invocation_failures_total,
            commit_conflicts_total,
            events_emitted_total,
            ledger_entries,
            invocation_latency_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<LedgerMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
