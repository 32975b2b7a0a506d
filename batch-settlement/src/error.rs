//! Error types for batch settlement

use crate::types::{BasketId, ComponentId};
use batch_ledger::BatchId;
use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] batch_ledger::Error),

    /// Slippage tolerance outside `[0, 10000)` basis points
    #[error("Invalid slippage: {0} bps")]
    InvalidSlippage(u32),

    /// A single price source could not be read
    #[error("Rate source unavailable for {component}: {reason}")]
    SourceUnavailable {
        /// Component being priced
        component: ComponentId,
        /// Underlying failure
        reason: String,
    },

    /// A component's price route could not be resolved
    #[error("Rate unavailable for {component}: {reason}")]
    RateUnavailable {
        /// Component being priced
        component: ComponentId,
        /// Underlying failure
        reason: String,
    },

    /// Composition registry has no entry for the basket
    #[error("Unknown basket: {0}")]
    UnknownBasket(BasketId),

    /// Basket's holdings are worth nothing per unit
    #[error("Basket {0} has no value per unit")]
    EmptyBasket(BasketId),

    /// Execution gateway refused the settlement
    #[error("Settlement of {batch_id} rejected: {reason}")]
    Rejected {
        /// Batch submitted
        batch_id: BatchId,
        /// Gateway's reason
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Ledger(err) => err.kind(),
            Error::InvalidSlippage(_) => "invalid_slippage",
            Error::SourceUnavailable { .. } => "source_unavailable",
            Error::RateUnavailable { .. } => "rate_unavailable",
            Error::UnknownBasket(_) => "unknown_basket",
            Error::EmptyBasket(_) => "empty_basket",
            Error::Rejected { .. } => "rejected",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }

    /// Expected timing preconditions; the trigger retries later
    pub fn is_timing(&self) -> bool {
        matches!(self, Error::Ledger(err) if err.is_timing())
    }

    /// Price-source failures, worth another attempt with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SourceUnavailable { .. } | Error::RateUnavailable { .. }
        )
    }
}
