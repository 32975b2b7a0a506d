//! Batch Ledger
//!
//! Accounting for time-windowed mint and redeem batches.
//!
//! # Architecture
//!
//! - **Two lanes**: Mint and redeem batches progress independently
//! - **State machine**: Open → Frozen → Settled, never backwards
//! - **Pro-rata claims**: Each depositor receives `output * deposit / supplied`
//! - **Write-then-commit**: Records are persisted before memory changes
//!
//! # Invariants
//!
//! - Conservation: Σ(account deposits) == batch supplied total
//! - Claims never pay out more than the batch output
//! - Amounts are floored at one fixed-point scale
//! - A rejected operation changes nothing

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod claim;
pub mod config;
pub mod error;
pub mod ledger;
pub mod math;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::BatchLedger;
pub use math::Precision;
pub use storage::{BatchStore, MemoryStore, RocksStore};
pub use types::{
    AccountBatch, AccountClaim, AccountId, Amount, Batch, BatchId, BatchState, BatchTiming,
    CooldownState, CurrentBatches, Direction, SettlementQuote,
};
