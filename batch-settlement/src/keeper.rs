//! Cooldown keeper
//!
//! Runs a settlement cycle for every enabled direction on a fixed interval and
//! broadcasts what happened. Cooldown and empty-batch skips are routine and
//! only logged at debug.

use crate::{
    config::KeeperConfig,
    engine::SettlementEngine,
    types::{CycleOutcome, SettlementReport, SkipReason},
    Result,
};
use batch_ledger::Direction;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Event capacity of the broadcast channel
const EVENT_CAPACITY: usize = 256;

/// Settlement event for subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementEvent {
    /// Batch settled
    Settled(SettlementReport),

    /// Nothing to settle in this direction yet
    Skipped {
        /// Direction checked
        direction: Direction,
        /// Why nothing happened
        reason: SkipReason,
    },

    /// Settlement attempt failed; the batch stays frozen
    Failed {
        /// Direction attempted
        direction: Direction,
        /// Error label
        kind: String,
        /// Error message
        reason: String,
        /// Price-source failure
        retryable: bool,
    },
}

/// Interval-driven settlement trigger
#[derive(Debug)]
pub struct Keeper {
    engine: Arc<SettlementEngine>,
    config: KeeperConfig,
    events: broadcast::Sender<SettlementEvent>,
}

impl Keeper {
    /// Create new keeper
    pub fn new(engine: Arc<SettlementEngine>, config: KeeperConfig) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            engine,
            config,
            events,
        })
    }

    /// Subscribe to settlement events
    pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
        self.events.subscribe()
    }

    /// Run one cycle per enabled direction
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<SettlementEvent> {
        let mut emitted = Vec::with_capacity(self.config.directions.len());

        for direction in &self.config.directions {
            let event = match self.engine.run_cycle(*direction, now).await {
                Ok(CycleOutcome::Settled(report)) => {
                    info!(
                        batch_id = %report.batch_id,
                        output_total = %report.output_total,
                        reference = %report.reference,
                        "Keeper settled batch"
                    );
                    SettlementEvent::Settled(report)
                }
                Ok(CycleOutcome::Skipped { direction, reason }) => {
                    debug!(direction = %direction, reason = %reason, "Keeper skipped");
                    SettlementEvent::Skipped { direction, reason }
                }
                Err(err) => {
                    warn!(direction = %direction, error = %err, "Keeper cycle failed");
                    SettlementEvent::Failed {
                        direction: *direction,
                        kind: err.kind().to_string(),
                        reason: err.to_string(),
                        retryable: err.is_retryable(),
                    }
                }
            };

            // No subscribers is fine
            let _ = self.events.send(event.clone());
            emitted.push(event);
        }

        emitted
    }

    /// Start keeper loop
    pub async fn start(self: Arc<Self>) {
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            directions = ?self.config.directions,
            "Starting settlement keeper"
        );

        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(self.config.poll_interval_secs));

        loop {
            interval.tick().await;
            self.tick(Utc::now()).await;
        }
    }
}
