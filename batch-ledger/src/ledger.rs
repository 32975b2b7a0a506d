//! Batch ledger: deposits, freezing, settlement and claims
//!
//! # Concurrency
//!
//! ```text
//!   deposit / try_freeze / settle          record_quote / claim / queries
//!              │                                       │
//!              ▼                                       │
//!   ┌─────────────────────┐                            │
//!   │ Lane (per direction)│  open batch, pending batch,│
//!   │ parking_lot::Mutex  │  sequence, cooldown        │
//!   └──────────┬──────────┘                            │
//!              ▼                                       ▼
//!   ┌──────────────────────────────────────────────────────┐
//!   │ DashMap<BatchId, BatchRecord>  (per-batch writer)    │
//!   └──────────────────────────────────────────────────────┘
//! ```
//!
//! Lock order is always lane → batch writer → map entry. Deposits and freezes
//! of one direction serialize on its lane, so a freeze is a barrier: once it
//! returns, no deposit can reach the frozen batch. Every write to a batch
//! holds that batch's writer lock; map entries are only held long enough to
//! copy or commit, never across persistence. Reads take map entries only.
//!
//! Every mutation builds the new records on a copy, persists them, and then
//! commits them in memory. A rejected or failed operation leaves no trace.

use crate::{
    claim,
    math::Precision,
    metrics::Metrics,
    storage::{BatchStore, MemoryStore, RocksStore, StoreWrite},
    types::{
        AccountBatch, AccountClaim, AccountId, Amount, Batch, BatchId, BatchState, BatchTiming,
        CooldownState, CurrentBatches, Direction, SettlementQuote,
    },
    Config, Error, Result,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct BatchRecord {
    batch: Batch,
    claims: HashMap<AccountId, AccountClaim>,
    writer: Arc<Mutex<()>>,
}

impl BatchRecord {
    fn new(batch: Batch) -> Self {
        Self {
            batch,
            claims: HashMap::new(),
            writer: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Debug)]
struct Lane {
    open: BatchId,
    pending: Option<BatchId>,
    next_sequence: u64,
    cooldown: CooldownState,
}

/// Owner of every batch and account claim
#[derive(Debug)]
pub struct BatchLedger {
    batches: DashMap<BatchId, BatchRecord>,
    accounts: DashMap<AccountId, BTreeSet<BatchId>>,
    lanes: [Mutex<Lane>; 2],
    store: Arc<dyn BatchStore>,
    precision: Precision,
    metrics: Metrics,
}

impl BatchLedger {
    /// Open ledger with configuration, recovering persisted records
    pub fn open(config: &Config) -> Result<Self> {
        let store: Arc<dyn BatchStore> = if config.storage.enabled {
            Arc::new(RocksStore::open(&config.storage)?)
        } else {
            Arc::new(MemoryStore::new())
        };
        Self::with_store(config, store, Utc::now())
    }

    /// In-memory ledger whose cooldowns start at `now`
    pub fn in_memory(config: &Config, now: DateTime<Utc>) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()), now)
    }

    /// Build a ledger on top of any store
    ///
    /// Directions without a persisted cooldown start their cooldown at `now`.
    /// Directions without an open batch get a fresh one.
    pub fn with_store(
        config: &Config,
        store: Arc<dyn BatchStore>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        config.validate()?;
        let snapshot = store.load()?;

        let batches: DashMap<BatchId, BatchRecord> = DashMap::new();
        let accounts: DashMap<AccountId, BTreeSet<BatchId>> = DashMap::new();

        for batch in snapshot.batches {
            batches.insert(batch.id, BatchRecord::new(batch));
        }

        for claim in snapshot.claims {
            let mut record = batches.get_mut(&claim.batch_id).ok_or_else(|| {
                Error::Storage(format!("Claim references missing batch {}", claim.batch_id))
            })?;
            accounts
                .entry(claim.account.clone())
                .or_default()
                .insert(claim.batch_id);
            record.claims.insert(claim.account.clone(), claim);
        }

        let mut writes = Vec::new();
        let mint = Self::recover_lane(
            Direction::Mint,
            &batches,
            &snapshot.cooldowns,
            config,
            now,
            &mut writes,
        )?;
        let redeem = Self::recover_lane(
            Direction::Redeem,
            &batches,
            &snapshot.cooldowns,
            config,
            now,
            &mut writes,
        )?;
        store.apply(&writes)?;

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        tracing::info!(
            batches = batches.len(),
            accounts = accounts.len(),
            mint_open = %mint.open,
            redeem_open = %redeem.open,
            "Batch ledger opened"
        );

        Ok(Self {
            batches,
            accounts,
            lanes: [Mutex::new(mint), Mutex::new(redeem)],
            store,
            precision: config.precision,
            metrics,
        })
    }

    fn recover_lane(
        direction: Direction,
        batches: &DashMap<BatchId, BatchRecord>,
        cooldowns: &[CooldownState],
        config: &Config,
        now: DateTime<Utc>,
        writes: &mut Vec<StoreWrite>,
    ) -> Result<Lane> {
        let mut open: Option<BatchId> = None;
        let mut pending: Option<BatchId> = None;
        let mut last_sequence = 0;

        for entry in batches.iter().filter(|e| e.key().direction == direction) {
            let id = *entry.key();
            last_sequence = last_sequence.max(id.sequence);
            match entry.batch.state {
                BatchState::Open => open = open.max(Some(id)),
                BatchState::Frozen => {
                    pending = Some(pending.map_or(id, |p: BatchId| p.min(id)));
                }
                BatchState::Settled => {}
            }
        }

        let open = match open {
            Some(id) => id,
            None => {
                last_sequence += 1;
                let batch = Batch::open(BatchId::new(direction, last_sequence), now);
                writes.push(StoreWrite::Batch(batch.clone()));
                let id = batch.id;
                batches.insert(id, BatchRecord::new(batch));
                id
            }
        };

        // Persisted last settlement, current configured duration
        let cooldown = CooldownState {
            direction,
            last_settled_at: cooldowns
                .iter()
                .find(|c| c.direction == direction)
                .map(|c| c.last_settled_at)
                .unwrap_or(now),
            cooldown_secs: config.cooldown_secs,
        };
        writes.push(StoreWrite::Cooldown(cooldown.clone()));

        Ok(Lane {
            open,
            pending,
            next_sequence: last_sequence + 1,
            cooldown,
        })
    }

    fn lane(&self, direction: Direction) -> &Mutex<Lane> {
        &self.lanes[direction.index()]
    }

    fn reject(&self, err: Error) -> Error {
        self.metrics.record_rejection(err.kind());
        if err.is_timing() {
            tracing::debug!(reason = err.kind(), "{}", err);
        } else {
            tracing::warn!(reason = err.kind(), "{}", err);
        }
        err
    }

    /// Add `amount` from `account` to the open batch of `direction`
    pub fn deposit(&self, direction: Direction, account: &AccountId, amount: Amount) -> Result<BatchId> {
        if amount <= Decimal::ZERO {
            return Err(self.reject(Error::InvalidAmount(format!(
                "deposit must be positive, got {}",
                amount
            ))));
        }
        if self.precision.floor(amount) != amount {
            return Err(self.reject(Error::InvalidAmount(format!(
                "deposit {} exceeds {} decimals",
                amount, self.precision.decimals
            ))));
        }

        let lane = self.lane(direction).lock();
        let writer = self.writer(lane.open)?;
        let _write = writer.lock();
        let (mut batch, existing) = self.stage(lane.open, account)?;

        if batch.state != BatchState::Open {
            return Err(self.reject(Error::InvalidState {
                batch_id: lane.open,
                expected: BatchState::Open,
                actual: batch.state,
            }));
        }

        batch.supplied_total = checked_add(batch.supplied_total, amount)?;
        batch.unclaimed_shares = checked_add(batch.unclaimed_shares, amount)?;

        let mut claim = existing.unwrap_or_else(|| AccountClaim::new(batch.id, account.clone()));
        claim.deposit_amount = checked_add(claim.deposit_amount, amount)?;

        self.store.apply(&[
            StoreWrite::Batch(batch.clone()),
            StoreWrite::Claim(claim.clone()),
        ])?;
        self.commit(batch.clone(), Some(claim));

        self.accounts
            .entry(account.clone())
            .or_default()
            .insert(batch.id);
        drop(lane);

        self.metrics.record_deposit(direction.as_str());
        tracing::info!(
            batch_id = %batch.id,
            account = %account,
            amount = %amount,
            supplied_total = %batch.supplied_total,
            "Deposit accepted"
        );

        Ok(batch.id)
    }

    /// Freeze the open batch of `direction` and open its successor
    ///
    /// Fails with a timing error (`CooldownActive`, `EmptyBatch`,
    /// `SettlementPending`) without changing anything when not yet eligible.
    pub fn try_freeze(&self, direction: Direction, now: DateTime<Utc>) -> Result<Batch> {
        let mut lane = self.lane(direction).lock();

        if let Some(pending) = lane.pending {
            return Err(self.reject(Error::SettlementPending(pending)));
        }

        if !lane.cooldown.has_elapsed(now) {
            return Err(self.reject(Error::CooldownActive {
                direction,
                remaining: lane.cooldown.remaining(now),
            }));
        }

        let writer = self.writer(lane.open)?;
        let _write = writer.lock();
        let frozen = {
            let record = self
                .batches
                .get(&lane.open)
                .ok_or(Error::UnknownBatch(lane.open))?;
            if record.batch.supplied_total.is_zero() {
                return Err(self.reject(Error::EmptyBatch(lane.open)));
            }
            let mut batch = record.batch.clone();
            batch.state = BatchState::Frozen;
            batch.frozen_at = Some(now);
            batch
        };
        let next = Batch::open(BatchId::new(direction, lane.next_sequence), now);

        self.store.apply(&[
            StoreWrite::Batch(frozen.clone()),
            StoreWrite::Batch(next.clone()),
        ])?;

        self.commit(frozen.clone(), None);
        self.batches.insert(next.id, BatchRecord::new(next.clone()));

        lane.open = next.id;
        lane.pending = Some(frozen.id);
        lane.next_sequence += 1;
        drop(lane);

        self.metrics.record_freeze(direction.as_str());
        tracing::info!(
            batch_id = %frozen.id,
            supplied_total = %frozen.supplied_total,
            next_batch = %next.id,
            "Batch frozen"
        );

        Ok(frozen)
    }

    /// Record the latest pricing of a frozen batch
    pub fn record_quote(&self, batch_id: BatchId, quote: SettlementQuote) -> Result<()> {
        let writer = self
            .writer(batch_id)
            .map_err(|err| self.reject(err))?;
        let _write = writer.lock();
        let mut batch = self.batch(batch_id)?;

        if batch.state != BatchState::Frozen {
            return Err(self.reject(Error::InvalidState {
                batch_id,
                expected: BatchState::Frozen,
                actual: batch.state,
            }));
        }

        batch.quote = Some(quote);
        self.store.apply(&[StoreWrite::Batch(batch.clone())])?;
        self.commit(batch, None);

        Ok(())
    }

    /// Mark a frozen batch settled with its realized output
    ///
    /// Restarts the direction's cooldown at `settled_at`.
    pub fn settle(
        &self,
        batch_id: BatchId,
        output_total: Amount,
        settlement_rate: Decimal,
        settled_at: DateTime<Utc>,
    ) -> Result<Batch> {
        let mut lane = self.lane(batch_id.direction).lock();
        let writer = self
            .writer(batch_id)
            .map_err(|err| self.reject(err))?;
        let _write = writer.lock();
        let mut batch = self.batch(batch_id)?;

        let validation = match batch.state {
            BatchState::Settled => Err(Error::AlreadySettled(batch_id)),
            BatchState::Open => Err(Error::InvalidState {
                batch_id,
                expected: BatchState::Frozen,
                actual: BatchState::Open,
            }),
            BatchState::Frozen if output_total < Decimal::ZERO || settlement_rate < Decimal::ZERO => {
                Err(Error::InvalidAmount(format!(
                    "settlement values must be non-negative (output {}, rate {})",
                    output_total, settlement_rate
                )))
            }
            BatchState::Frozen
                if self.precision.floor(output_total) != output_total
                    || self.precision.floor(settlement_rate) != settlement_rate =>
            {
                Err(Error::InvalidAmount(format!(
                    "settlement values exceed {} decimals (output {}, rate {})",
                    self.precision.decimals, output_total, settlement_rate
                )))
            }
            BatchState::Frozen => Ok(()),
        };
        if let Err(err) = validation {
            return Err(self.reject(err));
        }

        if let Some(quote) = &batch.quote {
            if output_total < quote.minimum_output {
                return Err(self.reject(Error::BelowMinimumOutput {
                    batch_id,
                    output: output_total,
                    minimum: quote.minimum_output,
                }));
            }
        }

        batch.state = BatchState::Settled;
        batch.output_total = Some(output_total);
        batch.settlement_rate = Some(settlement_rate);
        batch.settled_at = Some(settled_at);

        let mut cooldown = lane.cooldown.clone();
        cooldown.last_settled_at = settled_at;

        self.store.apply(&[
            StoreWrite::Batch(batch.clone()),
            StoreWrite::Cooldown(cooldown.clone()),
        ])?;
        self.commit(batch.clone(), None);

        lane.cooldown = cooldown;
        if lane.pending == Some(batch_id) {
            lane.pending = None;
        }
        drop(lane);

        self.metrics.record_settlement(batch_id.direction.as_str());
        tracing::info!(
            batch_id = %batch_id,
            supplied_total = %batch.supplied_total,
            output_total = %output_total,
            settlement_rate = %settlement_rate,
            "Batch settled"
        );

        Ok(batch)
    }

    /// Pay out an account's share of a settled batch
    pub fn claim(&self, batch_id: BatchId, account: &AccountId) -> Result<Amount> {
        let writer = self
            .writer(batch_id)
            .map_err(|err| self.reject(err))?;
        let _write = writer.lock();
        let (batch, existing) = self.stage(batch_id, account)?;

        let (batch, claim, amount) =
            match Self::prepare_claim(batch, existing, account, self.precision) {
                Ok(prepared) => prepared,
                Err(err) => return Err(self.reject(err)),
            };

        self.store.apply(&[
            StoreWrite::Batch(batch.clone()),
            StoreWrite::Claim(claim.clone()),
        ])?;
        self.commit(batch, Some(claim));

        self.metrics.record_claim();
        tracing::info!(
            batch_id = %batch_id,
            account = %account,
            amount = %amount,
            "Claim paid"
        );

        Ok(amount)
    }

    fn prepare_claim(
        mut batch: Batch,
        existing: Option<AccountClaim>,
        account: &AccountId,
        precision: Precision,
    ) -> Result<(Batch, AccountClaim, Amount)> {
        let mut claim = existing.ok_or_else(|| Error::UnknownClaim {
            batch_id: batch.id,
            account: account.to_string(),
        })?;

        let amount = claim::claimable_amount(&batch, &claim, precision)?;
        claim::mark_claimed(&mut claim, amount)?;

        batch.unclaimed_shares -= claim.deposit_amount;
        batch.claimed_output = checked_add(batch.claimed_output, amount)?;

        if batch.claimed_output > batch.output_total.unwrap_or(Decimal::ZERO) {
            return Err(Error::Arithmetic(format!(
                "claims on {} would exceed its output",
                batch.id
            )));
        }

        Ok((batch, claim, amount))
    }

    /// Writer lock of one batch
    fn writer(&self, batch_id: BatchId) -> Result<Arc<Mutex<()>>> {
        self.batches
            .get(&batch_id)
            .map(|record| record.writer.clone())
            .ok_or(Error::UnknownBatch(batch_id))
    }

    /// Copy of a batch and one account's claim, for staging a write
    fn stage(&self, batch_id: BatchId, account: &AccountId) -> Result<(Batch, Option<AccountClaim>)> {
        let record = self
            .batches
            .get(&batch_id)
            .ok_or(Error::UnknownBatch(batch_id))?;
        Ok((record.batch.clone(), record.claims.get(account).cloned()))
    }

    /// Install persisted records; caller holds the batch writer lock
    fn commit(&self, batch: Batch, claim: Option<AccountClaim>) {
        if let Some(mut record) = self.batches.get_mut(&batch.id) {
            if let Some(claim) = claim {
                record.claims.insert(claim.account.clone(), claim);
            }
            record.batch = batch;
        }
    }

    /// Output `account` could claim from `batch_id` right now
    pub fn claimable(&self, batch_id: BatchId, account: &AccountId) -> Result<Amount> {
        let record = self
            .batches
            .get(&batch_id)
            .ok_or(Error::UnknownBatch(batch_id))?;
        let claim = record.claims.get(account).ok_or_else(|| Error::UnknownClaim {
            batch_id,
            account: account.to_string(),
        })?;
        claim::claimable_amount(&record.batch, claim, self.precision)
    }

    /// Snapshot of a batch
    pub fn batch(&self, batch_id: BatchId) -> Result<Batch> {
        self.batches
            .get(&batch_id)
            .map(|record| record.batch.clone())
            .ok_or(Error::UnknownBatch(batch_id))
    }

    /// Snapshot of one claim record
    pub fn claim_record(&self, batch_id: BatchId, account: &AccountId) -> Result<AccountClaim> {
        let record = self
            .batches
            .get(&batch_id)
            .ok_or(Error::UnknownBatch(batch_id))?;
        record
            .claims
            .get(account)
            .cloned()
            .ok_or_else(|| Error::UnknownClaim {
                batch_id,
                account: account.to_string(),
            })
    }

    /// Every claim record of a batch, ordered by account
    pub fn claims(&self, batch_id: BatchId) -> Result<Vec<AccountClaim>> {
        let record = self
            .batches
            .get(&batch_id)
            .ok_or(Error::UnknownBatch(batch_id))?;
        let mut claims: Vec<AccountClaim> = record.claims.values().cloned().collect();
        claims.sort_by(|a, b| a.account.cmp(&b.account));
        Ok(claims)
    }

    /// Open batch of a direction
    pub fn current_batch(&self, direction: Direction) -> Result<Batch> {
        let open = self.lane(direction).lock().open;
        self.batch(open)
    }

    /// Open batches of both directions
    pub fn current_batches(&self) -> Result<CurrentBatches> {
        Ok(CurrentBatches {
            mint: self.current_batch(Direction::Mint)?,
            redeem: self.current_batch(Direction::Redeem)?,
        })
    }

    /// Frozen batch of a direction awaiting settlement
    pub fn pending_batch(&self, direction: Direction) -> Option<Batch> {
        let pending = self.lane(direction).lock().pending?;
        self.batch(pending).ok()
    }

    /// Cooldown state of a direction
    pub fn cooldown(&self, direction: Direction) -> CooldownState {
        self.lane(direction).lock().cooldown.clone()
    }

    /// Time left before the open batch of `direction` may be frozen
    pub fn time_until_settlement(&self, direction: Direction, now: DateTime<Utc>) -> BatchTiming {
        let cooldown = self.cooldown(direction);
        let total_ms = cooldown.cooldown().num_milliseconds();
        let elapsed_ms = (now - cooldown.last_settled_at).num_milliseconds();

        let progress = if total_ms <= 0 {
            1.0
        } else {
            (elapsed_ms as f64 / total_ms as f64).clamp(0.0, 1.0)
        };

        BatchTiming {
            direction,
            ready_at: cooldown.ready_at(),
            remaining_secs: cooldown.remaining(now).num_seconds(),
            progress,
        }
    }

    /// Every batch `account` supplied into, with its balances
    pub fn account_batches(&self, account: &AccountId) -> Vec<AccountBatch> {
        let ids: Vec<BatchId> = match self.accounts.get(account) {
            Some(ids) => ids.iter().copied().collect(),
            None => return Vec::new(),
        };

        ids.into_iter()
            .filter_map(|id| {
                let record = self.batches.get(&id)?;
                let claim = record.claims.get(account)?;
                let claimable = if record.batch.is_claimable() && !claim.claimed {
                    claim::claimable_amount(&record.batch, claim, self.precision)
                        .unwrap_or(Decimal::ZERO)
                } else {
                    Decimal::ZERO
                };
                Some(AccountBatch {
                    batch: record.batch.clone(),
                    supplied: claim.deposit_amount,
                    claimable,
                    claimed: claim.claimed,
                })
            })
            .filter(|view| view.supplied > Decimal::ZERO)
            .collect()
    }

    /// Fixed-point scale of the ledger
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Ledger metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| Error::Arithmetic(format!("{} + {} overflows", a, b)))
}
