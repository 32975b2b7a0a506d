//! Batch Settlement
//!
//! Prices frozen mint/redeem batches and drives them to settlement.
//!
//! # Architecture
//!
//! The keeper runs one cycle per direction on an interval:
//!
//! 1. **Freeze**: Close the open batch once its cooldown has elapsed
//! 2. **Price**: Compose the basket NAV from routed rate sources
//! 3. **Bound**: Derive a slippage-bounded minimum output
//! 4. **Execute**: Hand the instruction to the execution gateway
//! 5. **Settle**: Record the realized output so depositors can claim
//!
//! # Example
//!
//! ```no_run
//! use batch_ledger::BatchLedger;
//! use batch_settlement::{Config, DryRunGateway, SettlementEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> batch_settlement::Result<()> {
//!     let config = Config::default();
//!     let ledger = Arc::new(BatchLedger::open(&config.ledger)?);
//!     let (engine, _rates) = SettlementEngine::from_static_market(
//!         &config,
//!         ledger,
//!         Arc::new(DryRunGateway::new()),
//!     )?;
//!
//!     let outcome = engine
//!         .run_cycle(batch_ledger::Direction::Mint, chrono::Utc::now())
//!         .await?;
//!     println!("{:?}", outcome);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod composition;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod keeper;
pub mod metrics;
pub mod nav;
pub mod pricer;
pub mod rate_source;
pub mod retry;
pub mod types;

// Re-exports
pub use composition::{Composition, StaticComposition};
pub use config::Config;
pub use engine::SettlementEngine;
pub use error::{Error, Result};
pub use gateway::{DryRunGateway, ExecutionGateway};
pub use keeper::{Keeper, SettlementEvent};
pub use nav::{NavComposer, PriceRoute, RateHop, RateRegistry};
pub use pricer::{minimum_output, SettlementPricer};
pub use rate_source::{RateSource, StaticRateSource, TimeoutRateSource};
pub use types::*;
