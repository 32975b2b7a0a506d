//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `batch_deposits_total` - Accepted deposits, by direction
//! - `batch_freezes_total` - Batches frozen, by direction
//! - `batch_settlements_total` - Batches settled, by direction
//! - `batch_claims_total` - Claims paid
//! - `batch_rejections_total` - Rejected operations, by reason

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Accepted deposits
    pub deposits_total: IntCounterVec,

    /// Frozen batches
    pub freezes_total: IntCounterVec,

    /// Settled batches
    pub settlements_total: IntCounterVec,

    /// Paid claims
    pub claims_total: IntCounter,

    /// Rejected operations
    pub rejections_total: IntCounterVec,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("claims_total", &self.claims_total.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector on its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let deposits_total = IntCounterVec::new(
            Opts::new("batch_deposits_total", "Accepted deposits"),
            &["direction"],
        )?;
        registry.register(Box::new(deposits_total.clone()))?;

        let freezes_total = IntCounterVec::new(
            Opts::new("batch_freezes_total", "Batches frozen for settlement"),
            &["direction"],
        )?;
        registry.register(Box::new(freezes_total.clone()))?;

        let settlements_total = IntCounterVec::new(
            Opts::new("batch_settlements_total", "Batches settled"),
            &["direction"],
        )?;
        registry.register(Box::new(settlements_total.clone()))?;

        let claims_total = IntCounter::new("batch_claims_total", "Claims paid")?;
        registry.register(Box::new(claims_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new("batch_rejections_total", "Rejected ledger operations"),
            &["reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        Ok(Self {
            deposits_total,
            freezes_total,
            settlements_total,
            claims_total,
            rejections_total,
            registry,
        })
    }

    /// Record accepted deposit
    pub fn record_deposit(&self, direction: &str) {
        self.deposits_total.with_label_values(&[direction]).inc();
    }

    /// Record freeze
    pub fn record_freeze(&self, direction: &str) {
        self.freezes_total.with_label_values(&[direction]).inc();
    }

    /// Record settlement
    pub fn record_settlement(&self, direction: &str) {
        self.settlements_total.with_label_values(&[direction]).inc();
    }

    /// Record paid claim
    pub fn record_claim(&self) {
        self.claims_total.inc();
    }

    /// Record rejected operation
    pub fn record_rejection(&self, reason: &str) {
        self.rejections_total.with_label_values(&[reason]).inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
