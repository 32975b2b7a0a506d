//! Main settlement engine
//!
//! One cycle per direction:
//!
//! 1. **Select**: the batch already frozen and awaiting settlement, otherwise
//!    freeze the open batch once its cooldown has elapsed
//! 2. **Price**: quote expected and minimum output, retrying price-source
//!    failures with backoff
//! 3. **Execute**: submit the instruction to the execution gateway
//! 4. **Settle**: record the realized output in the ledger
//!
//! A batch whose pricing or execution fails stays Frozen and is picked up
//! again by the next cycle. At most one cycle per direction runs at a time;
//! an overlapping call is skipped so a batch is never submitted twice.

use crate::{
    config::Config,
    gateway::ExecutionGateway,
    metrics::Metrics,
    nav::NavComposer,
    pricer::SettlementPricer,
    rate_source::StaticRateSource,
    retry::RetryStrategy,
    types::{CycleOutcome, SettlementInstruction, SettlementReport, SkipReason},
    Error, Result,
};
use batch_ledger::{Batch, BatchLedger, Direction};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Settlement engine
#[derive(Debug)]
pub struct SettlementEngine {
    /// Batch ledger
    ledger: Arc<BatchLedger>,

    /// Pricing
    pricer: SettlementPricer,

    /// Execution collaborator
    gateway: Arc<dyn ExecutionGateway>,

    /// Pricing retries
    retry: RetryStrategy,

    /// Slippage tolerance (bps)
    slippage_bps: u32,

    /// Metrics
    metrics: Metrics,

    /// Directions with a cycle running
    in_flight: Mutex<HashSet<Direction>>,
}

/// Marks a direction busy until dropped
struct CycleGuard<'a> {
    in_flight: &'a Mutex<HashSet<Direction>>,
    direction: Direction,
}

impl<'a> CycleGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<Direction>>, direction: Direction) -> Option<Self> {
        if !in_flight.lock().insert(direction) {
            return None;
        }
        Some(Self {
            in_flight,
            direction,
        })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.direction);
    }
}

impl SettlementEngine {
    /// Create new settlement engine
    pub fn new(
        config: &Config,
        ledger: Arc<BatchLedger>,
        pricer: SettlementPricer,
        gateway: Arc<dyn ExecutionGateway>,
        metrics: Metrics,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            ledger,
            pricer,
            gateway,
            retry: RetryStrategy::new(config.retry.clone()),
            slippage_bps: config.slippage_bps,
            metrics,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Engine priced from the configured static market
    ///
    /// Returns the rate table as well so callers can update it live.
    pub fn from_static_market(
        config: &Config,
        ledger: Arc<BatchLedger>,
        gateway: Arc<dyn ExecutionGateway>,
    ) -> Result<(Self, Arc<StaticRateSource>)> {
        let market = config.build_market()?;
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        let pricer = SettlementPricer::new(
            NavComposer::new(Arc::new(market.registry), config.precision()),
            Arc::new(market.composition),
            config.basket.clone(),
            config.funding_asset.clone(),
            config.precision(),
            metrics.clone(),
        );

        let engine = Self::new(config, ledger, pricer, gateway, metrics)?;
        Ok((engine, market.source))
    }

    /// Batch ledger
    pub fn ledger(&self) -> &Arc<BatchLedger> {
        &self.ledger
    }

    /// Settlement metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Run one settlement cycle for `direction`
    pub async fn run_cycle(&self, direction: Direction, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let _guard = match CycleGuard::acquire(&self.in_flight, direction) {
            Some(guard) => guard,
            None => {
                tracing::debug!(direction = %direction, "Settlement cycle already running");
                self.metrics.record_cycle(direction.as_str(), "skipped");
                return Ok(CycleOutcome::Skipped {
                    direction,
                    reason: SkipReason::CycleInProgress,
                });
            }
        };

        let batch = match self.ledger.pending_batch(direction) {
            Some(batch) => {
                tracing::info!(batch_id = %batch.id, "Resuming settlement of frozen batch");
                batch
            }
            None => match self.ledger.try_freeze(direction, now) {
                Ok(batch) => batch,
                Err(err) => match SkipReason::from_timing(&err) {
                    Some(reason) => {
                        tracing::debug!(direction = %direction, reason = %reason, "Settlement cycle skipped");
                        self.metrics.record_cycle(direction.as_str(), "skipped");
                        return Ok(CycleOutcome::Skipped { direction, reason });
                    }
                    None => {
                        self.metrics.record_cycle(direction.as_str(), "failed");
                        return Err(err.into());
                    }
                },
            },
        };

        match self.settle_batch(&batch, now).await {
            Ok(report) => {
                self.metrics.record_cycle(direction.as_str(), "settled");
                Ok(CycleOutcome::Settled(report))
            }
            Err(err) => {
                self.metrics.record_cycle(direction.as_str(), "failed");
                tracing::warn!(
                    batch_id = %batch.id,
                    reason = err.kind(),
                    error = %err,
                    "Settlement attempt failed, batch stays frozen"
                );
                Err(err)
            }
        }
    }

    /// Price, execute and settle a frozen batch
    async fn settle_batch(&self, batch: &Batch, now: DateTime<Utc>) -> Result<SettlementReport> {
        let pricer = &self.pricer;
        let slippage_bps = self.slippage_bps;
        let quote = self
            .retry
            .execute_with_retry(
                move || pricer.price_settlement(batch, slippage_bps, now),
                "price_settlement",
            )
            .await?;

        self.ledger.record_quote(batch.id, quote.clone())?;

        let instruction = SettlementInstruction {
            batch_id: batch.id,
            supplied_total: batch.supplied_total,
            expected_output: quote.expected_output,
            minimum_output: quote.minimum_output,
            requested_at: now,
        };
        let receipt = self.gateway.submit_settlement(&instruction).await?;

        // Stored output and rate both derive from the floored receipt
        let precision = self.ledger.precision();
        let output_total = precision.floor(receipt.output_total);
        if output_total < quote.minimum_output {
            tracing::warn!(
                batch_id = %batch.id,
                reference = %receipt.reference,
                output_total = %output_total,
                minimum_output = %quote.minimum_output,
                "Gateway reported output below minimum"
            );
        }

        let settlement_rate = precision.div_floor(output_total, batch.supplied_total)?;
        let settled = self.ledger.settle(
            batch.id,
            output_total,
            settlement_rate,
            receipt.executed_at,
        )?;

        Ok(SettlementReport {
            batch_id: settled.id,
            supplied_total: settled.supplied_total,
            quote,
            reference: receipt.reference,
            output_total: settled.output_total.unwrap_or(output_total),
            settlement_rate,
            settled_at: receipt.executed_at,
        })
    }
}
