//! Error types for the batch ledger

use crate::types::{BatchId, BatchState, Direction};
use chrono::Duration;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Deposit or settlement amount is not acceptable
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Cooldown since the last settlement has not elapsed yet
    #[error("Cooldown active for {direction}: {remaining} remaining")]
    CooldownActive {
        /// Direction being frozen
        direction: Direction,
        /// Time left until the batch may be frozen
        remaining: Duration,
    },

    /// Open batch has no deposits
    #[error("Batch {0} has no deposits")]
    EmptyBatch(BatchId),

    /// A frozen batch of the same direction still awaits settlement
    #[error("Batch {0} is frozen and awaiting settlement")]
    SettlementPending(BatchId),

    /// Batch id was never assigned
    #[error("Unknown batch: {0}")]
    UnknownBatch(BatchId),

    /// Account never deposited into the batch
    #[error("No claim for account {account} in batch {batch_id}")]
    UnknownClaim {
        /// Batch queried
        batch_id: BatchId,
        /// Account queried
        account: String,
    },

    /// Operation not allowed in the batch's current state
    #[error("Batch {batch_id} is {actual:?}, expected {expected:?}")]
    InvalidState {
        /// Batch involved
        batch_id: BatchId,
        /// State the operation requires
        expected: BatchState,
        /// State the batch is in
        actual: BatchState,
    },

    /// Batch was already settled
    #[error("Batch {0} already settled")]
    AlreadySettled(BatchId),

    /// Claim was already paid
    #[error("Account {account} already claimed from batch {batch_id}")]
    AlreadyClaimed {
        /// Batch involved
        batch_id: BatchId,
        /// Claiming account
        account: String,
    },

    /// Realized output is below the recorded slippage bound
    #[error("Output {output} for batch {batch_id} is below minimum {minimum}")]
    BelowMinimumOutput {
        /// Batch involved
        batch_id: BatchId,
        /// Realized output
        output: Decimal,
        /// Recorded minimum acceptable output
        minimum: Decimal,
    },

    /// Fixed-point overflow or division by zero
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidAmount(_) => "invalid_amount",
            Error::CooldownActive { .. } => "cooldown_active",
            Error::EmptyBatch(_) => "empty_batch",
            Error::SettlementPending(_) => "settlement_pending",
            Error::UnknownBatch(_) => "unknown_batch",
            Error::UnknownClaim { .. } => "unknown_claim",
            Error::InvalidState { .. } => "invalid_state",
            Error::AlreadySettled(_) => "already_settled",
            Error::AlreadyClaimed { .. } => "already_claimed",
            Error::BelowMinimumOutput { .. } => "below_minimum_output",
            Error::Arithmetic(_) => "arithmetic",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }

    /// Expected timing preconditions; the trigger retries later
    pub fn is_timing(&self) -> bool {
        matches!(
            self,
            Error::CooldownActive { .. } | Error::EmptyBatch(_) | Error::SettlementPending(_)
        )
    }

    /// Caller errors against the batch state machine
    pub fn is_state_violation(&self) -> bool {
        matches!(
            self,
            Error::UnknownBatch(_)
                | Error::UnknownClaim { .. }
                | Error::InvalidState { .. }
                | Error::AlreadySettled(_)
                | Error::AlreadyClaimed { .. }
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
