//! Core types for the batch ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for amounts)
//! - Cheap snapshots (every record is `Clone`)

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quantity of an asset in its natural unit (e.g. `1000.5` funding units)
pub type Amount = Decimal;

/// Account identifier (address, custody account, etc.)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversion direction of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Direction {
    /// Funding asset in, basket asset out
    Mint = 0,
    /// Basket asset in, funding asset out
    Redeem = 1,
}

impl Direction {
    /// Both directions, in lane order
    pub const ALL: [Direction; 2] = [Direction::Mint, Direction::Redeem];

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Mint => "mint",
            Direction::Redeem => "redeem",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Direction::Mint),
            1 => Some(Direction::Redeem),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch identifier, sequential per direction starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId {
    /// Direction the sequence belongs to
    pub direction: Direction,
    /// Position in the direction's sequence
    pub sequence: u64,
}

impl BatchId {
    /// Create new batch ID
    pub fn new(direction: Direction, sequence: u64) -> Self {
        Self {
            direction,
            sequence,
        }
    }

    /// Storage key: direction byte || big-endian sequence
    pub fn to_key(&self) -> [u8; 9] {
        let mut key = [0u8; 9];
        key[0] = self.direction as u8;
        key[1..].copy_from_slice(&self.sequence.to_be_bytes());
        key
    }

    /// Parse a storage key
    pub fn from_key(key: &[u8]) -> Option<Self> {
        if key.len() < 9 {
            return None;
        }
        let direction = Direction::from_byte(key[0])?;
        let sequence = u64::from_be_bytes(key[1..9].try_into().ok()?);
        Some(Self::new(direction, sequence))
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.direction, self.sequence)
    }
}

/// Batch lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BatchState {
    /// Accepting deposits
    Open = 1,
    /// Deposits rejected, awaiting settlement
    Frozen = 2,
    /// Terminal, claims payable
    Settled = 3,
}

/// Pricing recorded against a frozen batch before execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementQuote {
    /// Output expected at current prices
    pub expected_output: Amount,

    /// Slippage-bounded minimum acceptable output
    pub minimum_output: Amount,

    /// Tolerance used to derive the minimum (basis points)
    pub slippage_bps: u32,

    /// When the prices were read
    pub priced_at: DateTime<Utc>,
}

/// A time-windowed group of deposits settled at one rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Batch ID (carries the direction)
    pub id: BatchId,

    /// Lifecycle state
    pub state: BatchState,

    /// Sum of accepted deposits, in the input unit
    pub supplied_total: Amount,

    /// Deposit weight not yet claimed
    pub unclaimed_shares: Amount,

    /// Output produced by settlement (set once, when Settled)
    pub output_total: Option<Amount>,

    /// Realized output per input unit (set once, when Settled)
    pub settlement_rate: Option<Decimal>,

    /// Output already paid out to claimants
    pub claimed_output: Amount,

    /// Latest pricing while Frozen
    pub quote: Option<SettlementQuote>,

    /// Opened timestamp
    pub created_at: DateTime<Utc>,

    /// Frozen timestamp
    pub frozen_at: Option<DateTime<Utc>>,

    /// Settled timestamp
    pub settled_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// Create an empty open batch
    pub fn open(id: BatchId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            state: BatchState::Open,
            supplied_total: Decimal::ZERO,
            unclaimed_shares: Decimal::ZERO,
            output_total: None,
            settlement_rate: None,
            claimed_output: Decimal::ZERO,
            quote: None,
            created_at,
            frozen_at: None,
            settled_at: None,
        }
    }

    /// Direction of the batch
    pub fn direction(&self) -> Direction {
        self.id.direction
    }

    /// Claims are payable
    pub fn is_claimable(&self) -> bool {
        self.state == BatchState::Settled
    }

    /// Output not yet paid out (including rounding dust)
    pub fn unclaimed_output(&self) -> Amount {
        self.output_total
            .map(|total| total - self.claimed_output)
            .unwrap_or(Decimal::ZERO)
    }
}

/// An account's contribution to one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountClaim {
    /// Batch the deposit went into
    pub batch_id: BatchId,

    /// Depositing account
    pub account: AccountId,

    /// Sum of the account's deposits into the batch
    pub deposit_amount: Amount,

    /// Share has been paid (terminal)
    pub claimed: bool,

    /// Amount paid out on claim
    pub claimed_amount: Option<Amount>,
}

impl AccountClaim {
    /// Create an empty claim record
    pub fn new(batch_id: BatchId, account: AccountId) -> Self {
        Self {
            batch_id,
            account,
            deposit_amount: Decimal::ZERO,
            claimed: false,
            claimed_amount: None,
        }
    }

    /// Storage key: batch key || account bytes
    pub fn key(&self) -> Vec<u8> {
        let mut key = self.batch_id.to_key().to_vec();
        key.extend_from_slice(self.account.as_str().as_bytes());
        key
    }
}

/// Settlement cadence for one direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownState {
    /// Direction this cooldown gates
    pub direction: Direction,

    /// Most recent settlement
    pub last_settled_at: DateTime<Utc>,

    /// Minimum time between settlements (seconds)
    pub cooldown_secs: u64,
}

impl CooldownState {
    /// Cooldown duration
    pub fn cooldown(&self) -> Duration {
        i64::try_from(self.cooldown_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    /// Earliest time the open batch may be frozen
    pub fn ready_at(&self) -> DateTime<Utc> {
        self.last_settled_at
            .checked_add_signed(self.cooldown())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Time left before a freeze is allowed (zero once elapsed)
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let remaining = self.ready_at() - now;
        if remaining < Duration::zero() {
            Duration::zero()
        } else {
            remaining
        }
    }

    /// Cooldown has elapsed at `now`
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now - self.last_settled_at >= self.cooldown()
    }
}

/// Time left until the next settlement of a direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTiming {
    /// Direction
    pub direction: Direction,

    /// Earliest freeze time
    pub ready_at: DateTime<Utc>,

    /// Seconds until `ready_at` (zero once elapsed)
    pub remaining_secs: i64,

    /// Elapsed share of the cooldown, in `[0, 1]`
    pub progress: f64,
}

/// A batch as seen by one depositor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBatch {
    /// Batch snapshot
    pub batch: Batch,

    /// Account's deposit into the batch
    pub supplied: Amount,

    /// Output the account can claim now (zero until settled or once claimed)
    pub claimable: Amount,

    /// Account already claimed
    pub claimed: bool,
}

/// Open batches of both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentBatches {
    /// Open mint batch
    pub mint: Batch,

    /// Open redeem batch
    pub redeem: Batch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_batch_id_key_roundtrip() {
        let id = BatchId::new(Direction::Redeem, 42);
        assert_eq!(BatchId::from_key(&id.to_key()), Some(id));
        assert_eq!(id.to_string(), "redeem-42");
    }

    #[test]
    fn test_batch_keys_sort_by_sequence() {
        let a = BatchId::new(Direction::Mint, 9).to_key();
        let b = BatchId::new(Direction::Mint, 10).to_key();
        assert!(a < b);
    }

    #[test]
    fn test_cooldown_remaining() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let cooldown = CooldownState {
            direction: Direction::Mint,
            last_settled_at: start,
            cooldown_secs: 1800,
        };

        assert!(!cooldown.has_elapsed(start + Duration::seconds(1799)));
        assert!(cooldown.has_elapsed(start + Duration::seconds(1800)));
        assert_eq!(
            cooldown.remaining(start + Duration::seconds(600)),
            Duration::seconds(1200)
        );
        assert_eq!(cooldown.remaining(start + Duration::hours(2)), Duration::zero());
    }

    #[test]
    fn test_unclaimed_output() {
        let mut batch = Batch::open(BatchId::new(Direction::Mint, 1), Utc::now());
        assert_eq!(batch.unclaimed_output(), Decimal::ZERO);

        batch.output_total = Some(Decimal::new(997, 2));
        batch.claimed_output = Decimal::new(249, 2);
        assert_eq!(batch.unclaimed_output(), Decimal::new(748, 2));
    }
}
