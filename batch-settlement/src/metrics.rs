//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `settlement_pricing_attempts_total` - Pricing attempts, by direction
//! - `settlement_source_failures_total` - Failed pricing attempts, by error kind
//! - `settlement_pricing_latency_seconds` - Time to price a batch
//! - `settlement_cycles_total` - Settlement cycles, by outcome

use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Pricing attempts
    pub pricing_attempts_total: IntCounterVec,

    /// Pricing failures
    pub source_failures_total: IntCounterVec,

    /// Pricing latency
    pub pricing_latency_seconds: Histogram,

    /// Settlement cycles
    pub cycles_total: IntCounterVec,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("pricing_samples", &self.pricing_latency_seconds.get_sample_count())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector on its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let pricing_attempts_total = IntCounterVec::new(
            Opts::new("settlement_pricing_attempts_total", "Settlement pricing attempts"),
            &["direction"],
        )?;
        registry.register(Box::new(pricing_attempts_total.clone()))?;

        let source_failures_total = IntCounterVec::new(
            Opts::new("settlement_source_failures_total", "Failed settlement pricing"),
            &["kind"],
        )?;
        registry.register(Box::new(source_failures_total.clone()))?;

        let pricing_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "settlement_pricing_latency_seconds",
                "Time to price a frozen batch",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(pricing_latency_seconds.clone()))?;

        let cycles_total = IntCounterVec::new(
            Opts::new("settlement_cycles_total", "Settlement cycles by outcome"),
            &["direction", "outcome"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        Ok(Self {
            pricing_attempts_total,
            source_failures_total,
            pricing_latency_seconds,
            cycles_total,
            registry,
        })
    }

    /// Record pricing attempt
    pub fn record_pricing(&self, direction: &str, duration_secs: f64) {
        self.pricing_attempts_total
            .with_label_values(&[direction])
            .inc();
        self.pricing_latency_seconds.observe(duration_secs);
    }

    /// Record pricing failure
    pub fn record_source_failure(&self, kind: &str) {
        self.source_failures_total.with_label_values(&[kind]).inc();
    }

    /// Record cycle outcome
    pub fn record_cycle(&self, direction: &str, outcome: &str) {
        self.cycles_total
            .with_label_values(&[direction, outcome])
            .inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
