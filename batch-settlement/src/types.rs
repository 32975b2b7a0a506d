//! Core types for settlement pricing and execution

use batch_ledger::{Amount, BatchId, Direction, SettlementQuote};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate value in quote units
pub type Value = Decimal;

/// Priced component identifier (a vault share, a pool token, the funding asset)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// Create new component ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Basket asset identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BasketId(String);

impl BasketId {
    /// Create new basket ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BasketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quote units per one base unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(Decimal);

impl Rate {
    /// Unit rate
    pub const ONE: Rate = Rate(Decimal::ONE);

    /// Wrap a decimal rate
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Convert an integer fixed-point reading, e.g. a 1e18-scaled price
    pub fn from_raw(raw: u128, decimals: u32) -> Option<Self> {
        let raw = i128::try_from(raw).ok()?;
        Decimal::try_from_i128_with_scale(raw, decimals)
            .ok()
            .map(|value| Self(value.normalize()))
    }

    /// Decimal value
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quantity of a component backing the basket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHolding {
    /// Component held
    pub component: ComponentId,

    /// Units of the component
    pub units_held: Amount,
}

/// Order handed to the execution gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementInstruction {
    /// Frozen batch being settled
    pub batch_id: BatchId,

    /// Input pooled in the batch
    pub supplied_total: Amount,

    /// Output expected at quoted prices
    pub expected_output: Amount,

    /// Execution must produce at least this much
    pub minimum_output: Amount,

    /// When the instruction was issued
    pub requested_at: DateTime<Utc>,
}

impl SettlementInstruction {
    /// Direction of the batch
    pub fn direction(&self) -> Direction {
        self.batch_id.direction
    }
}

/// Execution gateway confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// External reference of the executed conversion
    pub reference: String,

    /// Realized output
    pub output_total: Amount,

    /// When execution completed
    pub executed_at: DateTime<Utc>,
}

/// Summary of one settled batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReport {
    /// Settled batch
    pub batch_id: BatchId,

    /// Input pooled in the batch
    pub supplied_total: Amount,

    /// Pricing used to bound execution
    pub quote: SettlementQuote,

    /// Gateway reference
    pub reference: String,

    /// Realized output
    pub output_total: Amount,

    /// Realized output per input unit
    pub settlement_rate: Decimal,

    /// Settlement timestamp
    pub settled_at: DateTime<Utc>,
}

/// Why a cycle did nothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Cooldown since the last settlement still running
    Cooldown {
        /// Seconds left
        remaining_secs: i64,
    },
    /// Open batch has no deposits
    EmptyBatch,
    /// Another frozen batch awaits settlement
    SettlementPending(BatchId),
    /// A cycle for this direction is already running
    CycleInProgress,
}

impl SkipReason {
    /// Map a ledger timing error
    pub fn from_timing(err: &batch_ledger::Error) -> Option<Self> {
        match err {
            batch_ledger::Error::CooldownActive { remaining, .. } => Some(SkipReason::Cooldown {
                remaining_secs: remaining.num_seconds(),
            }),
            batch_ledger::Error::EmptyBatch(_) => Some(SkipReason::EmptyBatch),
            batch_ledger::Error::SettlementPending(id) => Some(SkipReason::SettlementPending(*id)),
            _ => None,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Cooldown { remaining_secs } => {
                write!(f, "cooldown active, {}s remaining", remaining_secs)
            }
            SkipReason::EmptyBatch => f.write_str("open batch is empty"),
            SkipReason::SettlementPending(id) => write!(f, "{} awaiting settlement", id),
            SkipReason::CycleInProgress => f.write_str("settlement cycle already running"),
        }
    }
}

/// Result of one settlement cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing to settle yet
    Skipped {
        /// Direction checked
        direction: Direction,
        /// Why nothing happened
        reason: SkipReason,
    },
    /// A batch was settled
    Settled(SettlementReport),
}
