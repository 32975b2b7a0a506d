//! End-to-end settlement scenarios
//!
//! Deposit → freeze → price → execute → settle → claim, against an in-memory
//! ledger and a scripted execution gateway.

use async_trait::async_trait;
use batch_ledger::{AccountId, BatchLedger, BatchState, Direction};
use batch_settlement::{
    metrics::Metrics, BasketId, ComponentHolding, ComponentId, Config, CycleOutcome, Error,
    ExecutionGateway, NavComposer, PriceRoute, RateHop, RateRegistry, Result, SettlementEngine,
    SettlementInstruction, SettlementPricer, SettlementReceipt, StaticComposition,
    StaticRateSource,
};
use batch_settlement::types::Rate;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn after_cooldown() -> DateTime<Utc> {
    start() + Duration::seconds(1800)
}

/// Gateway reporting a scripted output, or rejecting
#[derive(Debug, Default)]
struct ScriptedGateway {
    output: Mutex<Option<Decimal>>,
    submitted: Mutex<Vec<SettlementInstruction>>,
}

impl ScriptedGateway {
    fn realize(&self, output: Decimal) {
        *self.output.lock() = Some(output);
    }

    fn reject(&self) {
        *self.output.lock() = None;
    }
}

#[async_trait]
impl ExecutionGateway for ScriptedGateway {
    async fn submit_settlement(
        &self,
        instruction: &SettlementInstruction,
    ) -> Result<SettlementReceipt> {
        self.submitted.lock().push(instruction.clone());
        match *self.output.lock() {
            Some(output_total) => Ok(SettlementReceipt {
                reference: format!("TX-{}", instruction.batch_id),
                output_total,
                executed_at: instruction.requested_at,
            }),
            None => Err(Error::Rejected {
                batch_id: instruction.batch_id,
                reason: "pool liquidity".to_string(),
            }),
        }
    }
}

struct Harness {
    engine: SettlementEngine,
    gateway: Arc<ScriptedGateway>,
    pools: Arc<StaticRateSource>,
}

/// Funding asset worth 1, basket backed by one vault share worth 50 × 2
fn harness() -> Harness {
    let mut config = Config::default();
    config.slippage_bps = 50;
    config.retry.max_retries = 0;
    let precision = config.precision();

    let vaults = Arc::new(StaticRateSource::with_rates(
        "vaults",
        [(ComponentId::new("yv-frax"), Rate::new(dec!(50)))],
    ));
    let pools = Arc::new(StaticRateSource::with_rates(
        "pools",
        [
            (ComponentId::new("frax-pool"), Rate::new(dec!(2))),
            (ComponentId::new("3pool"), Rate::ONE),
        ],
    ));

    let mut registry = RateRegistry::new();
    registry
        .register(PriceRoute::new(
            ComponentId::new("yv-frax"),
            vec![
                RateHop::new(vaults, ComponentId::new("yv-frax")),
                RateHop::new(pools.clone(), ComponentId::new("frax-pool")),
            ],
        ))
        .unwrap();
    registry
        .register(PriceRoute::new(
            ComponentId::new("3crv"),
            vec![RateHop::new(pools.clone(), ComponentId::new("3pool"))],
        ))
        .unwrap();

    let mut composition = StaticComposition::new(precision);
    composition.insert(
        BasketId::new("butter"),
        vec![ComponentHolding {
            component: ComponentId::new("yv-frax"),
            units_held: dec!(1),
        }],
    );

    let metrics = Metrics::new().unwrap();
    let pricer = SettlementPricer::new(
        NavComposer::new(Arc::new(registry), precision),
        Arc::new(composition),
        config.basket.clone(),
        config.funding_asset.clone(),
        precision,
        metrics.clone(),
    );

    let ledger = Arc::new(BatchLedger::in_memory(&config.ledger, start()).unwrap());
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = SettlementEngine::new(&config, ledger, pricer, gateway.clone(), metrics).unwrap();

    Harness {
        engine,
        gateway,
        pools,
    }
}

#[tokio::test]
async fn test_mint_batch_lifecycle() {
    let h = harness();
    let ledger = h.engine.ledger().clone();
    let alice = AccountId::new("alice");
    let bob = AccountId::new("bob");

    let id = ledger.deposit(Direction::Mint, &alice, dec!(750)).unwrap();
    ledger.deposit(Direction::Mint, &bob, dec!(250)).unwrap();

    h.gateway.realize(dec!(9.97));
    let outcome = h.engine.run_cycle(Direction::Mint, after_cooldown()).await.unwrap();
    let report = match outcome {
        CycleOutcome::Settled(report) => report,
        other => panic!("expected settlement, got {:?}", other),
    };

    assert_eq!(report.batch_id, id);
    assert_eq!(report.quote.expected_output, dec!(10));
    assert_eq!(report.quote.minimum_output, dec!(9.95));
    assert_eq!(report.output_total, dec!(9.97));
    assert_eq!(report.settlement_rate, dec!(0.00997));

    let submitted = h.gateway.submitted.lock().clone();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].minimum_output, dec!(9.95));

    assert_eq!(ledger.claimable(id, &bob).unwrap(), dec!(2.4925));
    assert_eq!(ledger.claim(id, &bob).unwrap(), dec!(2.4925));
    assert_eq!(ledger.claim(id, &alice).unwrap(), dec!(7.4775));

    let batch = ledger.batch(id).unwrap();
    assert_eq!(batch.state, BatchState::Settled);
    assert_eq!(batch.claimed_output, dec!(9.97));
}

#[tokio::test]
async fn test_redeem_batch_lifecycle() {
    let h = harness();
    let ledger = h.engine.ledger().clone();
    let carol = AccountId::new("carol");

    let id = ledger.deposit(Direction::Redeem, &carol, dec!(2)).unwrap();
    h.gateway.realize(dec!(199.5));

    let outcome = h.engine.run_cycle(Direction::Redeem, after_cooldown()).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Settled(ref report)
        if report.quote.expected_output == dec!(200)
            && report.quote.minimum_output == dec!(199)));

    assert_eq!(ledger.claim(id, &carol).unwrap(), dec!(199.5));
}

#[tokio::test]
async fn test_output_below_minimum_keeps_batch_frozen() {
    let h = harness();
    let ledger = h.engine.ledger().clone();
    let alice = AccountId::new("alice");
    let id = ledger.deposit(Direction::Mint, &alice, dec!(1000)).unwrap();

    h.gateway.realize(dec!(9.9));
    let err = h
        .engine
        .run_cycle(Direction::Mint, after_cooldown())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Ledger(batch_ledger::Error::BelowMinimumOutput { .. })
    ));

    let batch = ledger.batch(id).unwrap();
    assert_eq!(batch.state, BatchState::Frozen);
    assert_eq!(batch.quote.unwrap().minimum_output, dec!(9.95));
    assert!(matches!(
        ledger.claim(id, &alice),
        Err(batch_ledger::Error::InvalidState { .. })
    ));

    // Next cycle retries the same batch
    h.gateway.realize(dec!(10));
    let outcome = h
        .engine
        .run_cycle(Direction::Mint, after_cooldown() + Duration::minutes(5))
        .await
        .unwrap();
    assert!(matches!(outcome, CycleOutcome::Settled(ref report) if report.batch_id == id));
}

#[tokio::test]
async fn test_gateway_rejection_keeps_batch_frozen() {
    let h = harness();
    let ledger = h.engine.ledger().clone();
    let id = ledger
        .deposit(Direction::Mint, &AccountId::new("alice"), dec!(1000))
        .unwrap();

    h.gateway.reject();
    let err = h
        .engine
        .run_cycle(Direction::Mint, after_cooldown())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rejected { .. }));
    assert_eq!(ledger.batch(id).unwrap().state, BatchState::Frozen);

    // Deposits keep flowing into the successor
    let next = ledger
        .deposit(Direction::Mint, &AccountId::new("bob"), dec!(5))
        .unwrap();
    assert_ne!(next, id);
}

#[tokio::test]
async fn test_price_outage_never_settles() {
    let h = harness();
    let ledger = h.engine.ledger().clone();
    let id = ledger
        .deposit(Direction::Mint, &AccountId::new("alice"), dec!(1000))
        .unwrap();

    h.gateway.realize(dec!(10));
    h.pools.remove_rate(&ComponentId::new("frax-pool"));

    let err = h
        .engine
        .run_cycle(Direction::Mint, after_cooldown())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RateUnavailable { .. }));
    assert!(h.gateway.submitted.lock().is_empty());

    let batch = ledger.batch(id).unwrap();
    assert_eq!(batch.state, BatchState::Frozen);
    assert!(batch.quote.is_none());
    assert_eq!(
        ledger.cooldown(Direction::Mint).last_settled_at,
        start()
    );
}

#[tokio::test]
async fn test_cooldown_restarts_after_settlement() {
    let h = harness();
    let ledger = h.engine.ledger().clone();
    ledger
        .deposit(Direction::Mint, &AccountId::new("alice"), dec!(1000))
        .unwrap();
    h.gateway.realize(dec!(10));
    h.engine
        .run_cycle(Direction::Mint, after_cooldown())
        .await
        .unwrap();

    ledger
        .deposit(Direction::Mint, &AccountId::new("bob"), dec!(1000))
        .unwrap();
    let outcome = h
        .engine
        .run_cycle(Direction::Mint, after_cooldown() + Duration::seconds(60))
        .await
        .unwrap();
    assert!(matches!(outcome, CycleOutcome::Skipped { .. }));

    let timing = ledger.time_until_settlement(Direction::Mint, after_cooldown() + Duration::seconds(60));
    assert_eq!(timing.remaining_secs, 1740);
}
