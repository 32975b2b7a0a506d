//! Batch keeper binary

use anyhow::Context;
use batch_ledger::BatchLedger;
use batch_settlement::{Config, DryRunGateway, Keeper, SettlementEngine};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    if config.keeper.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        service = %config.service_name,
        basket = %config.basket,
        slippage_bps = config.slippage_bps,
        "Starting batch keeper"
    );

    // Open ledger
    let ledger = Arc::new(BatchLedger::open(&config.ledger).context("failed to open ledger")?);

    // Nothing is executed for real: the gateway reports the quoted output
    let (engine, _rates) =
        SettlementEngine::from_static_market(&config, ledger, Arc::new(DryRunGateway::new()))
            .context("failed to build settlement engine")?;

    let keeper = Arc::new(
        Keeper::new(Arc::new(engine), config.keeper.clone()).context("invalid keeper configuration")?,
    );
    let mut events = keeper.subscribe();

    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!(?event, "Settlement event");
        }
    });

    tokio::select! {
        _ = keeper.start() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
        }
    }

    tracing::info!("Shutting down batch keeper");
    Ok(())
}
