//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conservation: Σ(account deposits) == supplied total
//! - Claim order independence: pro-rata shares ignore claim order
//! - Bounded payout: Σ(claims) <= output total
//! - Freeze gating: no freeze before the cooldown elapses
//! - Exactness: shares equal an integer floor at the full 18 decimals
//! - Recovery: a reopened store reproduces the same ledger state

use batch_ledger::{
    AccountId, Batch, BatchLedger, BatchState, BatchStore, Config, Direction, Error, MemoryStore,
    RocksStore,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use primitive_types::U256;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

const COOLDOWN_SECS: u64 = 1800;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn after_cooldown() -> DateTime<Utc> {
    start() + Duration::seconds(COOLDOWN_SECS as i64)
}

fn test_ledger() -> BatchLedger {
    let config = Config {
        cooldown_secs: COOLDOWN_SECS,
        ..Default::default()
    };
    BatchLedger::in_memory(&config, start()).unwrap()
}

/// Strategy for generating valid amounts (positive, 6 decimals)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_000_000i64).prop_map(|units| Decimal::new(units, 6))
}

/// Strategy for generating deposits over a small account set
fn deposits_strategy() -> impl Strategy<Value = Vec<(u8, Decimal)>> {
    prop::collection::vec((0u8..6, amount_strategy()), 1..40)
}

const ONE: i128 = 1_000_000_000_000_000_000;

/// Amounts at the full 18 decimals: near one, small, or near the top of the range
fn precise_amount_strategy() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        (ONE - 1_000_000..ONE + 1_000_000),
        (1i128..ONE),
        (ONE..1_000_000 * ONE),
        (1_000_000_000 * ONE..2_000_000_000 * ONE),
    ]
    .prop_map(|mantissa| Decimal::from_i128_with_scale(mantissa, 18))
}

/// Few deposits so the supplied total stays inside a 96-bit mantissa
fn precise_deposits_strategy() -> impl Strategy<Value = Vec<(u8, Decimal)>> {
    prop::collection::vec((0u8..6, precise_amount_strategy()), 1..12)
}

/// `floor(output * deposit / supplied)` on 18-decimal integers
fn exact_share(output: Decimal, deposit: Decimal, supplied: Decimal) -> Decimal {
    let fixed = |value: Decimal| {
        let mut value = value;
        value.rescale(18);
        U256::from(value.mantissa() as u128)
    };
    let share = fixed(output) * fixed(deposit) / fixed(supplied);
    Decimal::from_i128_with_scale(share.low_u128() as i128, 18)
}

fn account(index: u8) -> AccountId {
    AccountId::new(format!("acct-{}", index))
}

/// Deposit everything into the open mint batch, freeze and settle it
fn settled_batch(ledger: &BatchLedger, deposits: &[(u8, Decimal)], output: Decimal) -> Batch {
    let mut id = None;
    for (index, amount) in deposits {
        id = Some(ledger.deposit(Direction::Mint, &account(*index), *amount).unwrap());
    }
    let id = id.unwrap();
    ledger.try_freeze(Direction::Mint, after_cooldown()).unwrap();
    ledger
        .settle(id, output, Decimal::ZERO, after_cooldown())
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: account deposits always sum to the batch's supplied total
    #[test]
    fn prop_deposit_conservation(deposits in deposits_strategy()) {
        let ledger = test_ledger();
        let mut expected: HashMap<u8, Decimal> = HashMap::new();

        for (index, amount) in &deposits {
            ledger.deposit(Direction::Mint, &account(*index), *amount).unwrap();
            *expected.entry(*index).or_default() += *amount;
        }

        let batch = ledger.current_batch(Direction::Mint).unwrap();
        let claims = ledger.claims(batch.id).unwrap();
        let sum: Decimal = claims.iter().map(|c| c.deposit_amount).sum();

        prop_assert_eq!(sum, batch.supplied_total);
        prop_assert_eq!(batch.unclaimed_shares, batch.supplied_total);
        for claim in &claims {
            let index: u8 = claim.account.as_str()[5..].parse().unwrap();
            prop_assert_eq!(claim.deposit_amount, expected[&index]);
        }
    }

    /// Property: total paid never exceeds output, and each share is floored pro-rata
    #[test]
    fn prop_claims_bounded_by_output(
        deposits in deposits_strategy(),
        output in amount_strategy(),
    ) {
        let ledger = test_ledger();
        let batch = settled_batch(&ledger, &deposits, output);

        let mut paid = Decimal::ZERO;
        for claim in ledger.claims(batch.id).unwrap() {
            let amount = ledger.claim(batch.id, &claim.account).unwrap();
            prop_assert_eq!(amount, exact_share(output, claim.deposit_amount, batch.supplied_total));
            paid += amount;
        }

        let after = ledger.batch(batch.id).unwrap();
        prop_assert!(paid <= output);
        prop_assert_eq!(after.claimed_output, paid);
        prop_assert_eq!(after.unclaimed_shares, Decimal::ZERO);
        prop_assert!(after.unclaimed_output() >= Decimal::ZERO);
    }

    /// Property: at 18 decimals every share is the exact integer floor
    #[test]
    fn prop_full_precision_shares_exact(
        deposits in precise_deposits_strategy(),
        output in precise_amount_strategy(),
    ) {
        let ledger = test_ledger();
        let batch = settled_batch(&ledger, &deposits, output);

        let mut paid = Decimal::ZERO;
        for claim in ledger.claims(batch.id).unwrap() {
            let amount = ledger.claim(batch.id, &claim.account).unwrap();
            prop_assert_eq!(amount, exact_share(output, claim.deposit_amount, batch.supplied_total));
            paid += amount;
        }

        prop_assert!(paid <= output);
        prop_assert_eq!(ledger.batch(batch.id).unwrap().claimed_output, paid);
    }

    /// Property: claim order does not change any account's payout
    #[test]
    fn prop_claim_order_independent(
        deposits in deposits_strategy(),
        output in amount_strategy(),
    ) {
        let forward = test_ledger();
        let backward = test_ledger();
        let id = settled_batch(&forward, &deposits, output).id;
        settled_batch(&backward, &deposits, output);

        let accounts: Vec<AccountId> = forward
            .claims(id)
            .unwrap()
            .into_iter()
            .map(|c| c.account)
            .collect();

        let paid_forward: Vec<Decimal> = accounts
            .iter()
            .map(|a| forward.claim(id, a).unwrap())
            .collect();
        let mut paid_backward: Vec<Decimal> = accounts
            .iter()
            .rev()
            .map(|a| backward.claim(id, a).unwrap())
            .collect();
        paid_backward.reverse();

        prop_assert_eq!(paid_forward, paid_backward);
    }

    /// Property: a second claim is rejected and changes nothing
    #[test]
    fn prop_claim_idempotent(
        deposits in deposits_strategy(),
        output in amount_strategy(),
    ) {
        let ledger = test_ledger();
        let batch = settled_batch(&ledger, &deposits, output);
        let first = account(deposits[0].0);

        ledger.claim(batch.id, &first).unwrap();
        let snapshot = ledger.batch(batch.id).unwrap();
        let record = ledger.claim_record(batch.id, &first).unwrap();

        let second = ledger.claim(batch.id, &first);
        let is_already_claimed = matches!(second, Err(Error::AlreadyClaimed { .. }));
        prop_assert!(is_already_claimed);
        prop_assert_eq!(ledger.batch(batch.id).unwrap(), snapshot);
        prop_assert_eq!(ledger.claim_record(batch.id, &first).unwrap(), record);
    }

    /// Property: freezing before the cooldown elapses always fails untouched
    #[test]
    fn prop_freeze_gated_by_cooldown(
        deposits in deposits_strategy(),
        elapsed in 0i64..(COOLDOWN_SECS as i64),
    ) {
        let ledger = test_ledger();
        for (index, amount) in &deposits {
            ledger.deposit(Direction::Mint, &account(*index), *amount).unwrap();
        }
        let before = ledger.current_batch(Direction::Mint).unwrap();

        let result = ledger.try_freeze(Direction::Mint, start() + Duration::seconds(elapsed));
        let is_cooldown = matches!(result, Err(Error::CooldownActive { .. }));
        prop_assert!(is_cooldown);
        prop_assert_eq!(ledger.current_batch(Direction::Mint).unwrap(), before);
        prop_assert!(ledger.pending_batch(Direction::Mint).is_none());
    }
}

#[test]
fn test_shares_floor_below_rounded_product() {
    let ledger = test_ledger();
    let output = Decimal::from_i128_with_scale(999_999_999_999_999_997, 18);
    let batch = settled_batch(
        &ledger,
        &[
            (0, Decimal::from_i128_with_scale(1_000_000_000_000_000_003, 18)),
            (1, Decimal::from_i128_with_scale(2_999_999_999_999_999_997, 18)),
        ],
        output,
    );

    assert_eq!(
        ledger.claim(batch.id, &account(0)).unwrap(),
        Decimal::from_i128_with_scale(249_999_999_999_999_999, 18)
    );
    assert_eq!(
        ledger.claim(batch.id, &account(1)).unwrap(),
        Decimal::from_i128_with_scale(749_999_999_999_999_997, 18)
    );
    assert!(ledger.batch(batch.id).unwrap().claimed_output < output);
}

#[test]
fn test_settled_batch_rejects_deposits() {
    let ledger = test_ledger();
    let batch = settled_batch(&ledger, &[(0, Decimal::ONE)], Decimal::ONE);

    // New deposits always land in the open successor
    let landed = ledger
        .deposit(Direction::Mint, &account(0), Decimal::ONE)
        .unwrap();
    assert_ne!(landed, batch.id);
    assert_eq!(ledger.batch(batch.id).unwrap().state, BatchState::Settled);
    assert_eq!(ledger.batch(batch.id).unwrap().supplied_total, Decimal::ONE);
}

#[test]
fn test_recovery_from_rocksdb() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config {
        cooldown_secs: COOLDOWN_SECS,
        ..Default::default()
    };
    config.storage.enabled = true;
    config.storage.data_dir = temp_dir.path().to_path_buf();

    let (settled, claimant) = {
        let store: Arc<dyn BatchStore> = Arc::new(RocksStore::open(&config.storage).unwrap());
        let ledger = BatchLedger::with_store(&config, store, start()).unwrap();
        let batch = settled_batch(
            &ledger,
            &[(0, Decimal::new(750, 0)), (1, Decimal::new(250, 0))],
            Decimal::new(997, 2),
        );
        ledger.claim(batch.id, &account(1)).unwrap();
        ledger
            .deposit(Direction::Redeem, &account(2), Decimal::new(3, 0))
            .unwrap();
        (ledger.batch(batch.id).unwrap(), account(1))
    };

    let store: Arc<dyn BatchStore> = Arc::new(RocksStore::open(&config.storage).unwrap());
    let reopened = BatchLedger::with_store(&config, store, start() + Duration::days(1)).unwrap();

    assert_eq!(reopened.batch(settled.id).unwrap(), settled);
    assert!(reopened.claim_record(settled.id, &claimant).unwrap().claimed);
    assert_eq!(
        reopened.claim(settled.id, &account(0)).unwrap(),
        Decimal::new(74775, 4)
    );
    assert_eq!(
        reopened.cooldown(Direction::Mint).last_settled_at,
        after_cooldown()
    );
    assert_eq!(
        reopened.current_batch(Direction::Redeem).unwrap().supplied_total,
        Decimal::new(3, 0)
    );
}

#[test]
fn test_memory_store_shared_between_instances() {
    let config = Config::default();
    let store: Arc<dyn BatchStore> = Arc::new(MemoryStore::new());

    let first = BatchLedger::with_store(&config, store.clone(), start()).unwrap();
    let id = first
        .deposit(Direction::Mint, &account(0), Decimal::TEN)
        .unwrap();

    let second = BatchLedger::with_store(&config, store, start()).unwrap();
    assert_eq!(second.batch(id).unwrap().supplied_total, Decimal::TEN);
}
