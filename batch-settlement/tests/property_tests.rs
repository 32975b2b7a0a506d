//! Property-based tests for pricing invariants
//!
//! - Slippage bound: minimum <= expected, equal at zero tolerance
//! - Monotonicity: a wider tolerance never raises the minimum
//! - Flooring: composed NAV never exceeds the exact product
//! - Exactness: at 18 decimals, results equal an integer floor computation

use batch_ledger::Precision;
use batch_settlement::{
    minimum_output, ComponentHolding, ComponentId, Error, NavComposer, PriceRoute, RateHop,
    RateRegistry, StaticRateSource,
};
use batch_settlement::types::Rate;
use primitive_types::U256;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

fn precision() -> Precision {
    Precision::default()
}

/// Expected outputs (positive, 8 decimals)
fn expected_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_000_000_000i64).prop_map(|units| Decimal::new(units, 8))
}

/// Rates between 0.0001 and 1000 with 4 decimals
fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|units| Decimal::new(units, 4))
}

/// Rates at 18 decimals: near one, or anywhere up to 100
fn precise_rate_strategy() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        (ONE - 1_000_000..ONE + 1_000_000),
        (1i128..100 * ONE),
    ]
    .prop_map(|mantissa| Decimal::from_i128_with_scale(mantissa, 18))
}

/// Unit counts at 18 decimals up to 1000
fn precise_units_strategy() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        (ONE - 1_000_000..ONE + 1_000_000),
        (1i128..1_000 * ONE),
    ]
    .prop_map(|mantissa| Decimal::from_i128_with_scale(mantissa, 18))
}

const ONE: i128 = 1_000_000_000_000_000_000;

/// 18-decimal integer of `value`
fn fixed(value: Decimal) -> U256 {
    let mut value = value;
    value.rescale(18);
    U256::from(value.mantissa() as u128)
}

fn from_fixed(value: U256) -> Decimal {
    Decimal::from_i128_with_scale(value.low_u128() as i128, 18)
}

fn floor_mul(a: U256, b: U256) -> U256 {
    a * b / U256::from(ONE as u128)
}

fn two_hop_composer(first: Decimal, second: Decimal, precision: Precision) -> NavComposer {
    let source = Arc::new(StaticRateSource::with_rates(
        "market",
        [(ComponentId::new("a"), Rate::new(first)), (ComponentId::new("b"), Rate::new(second))],
    ));

    let mut registry = RateRegistry::new();
    registry
        .register(PriceRoute::new(
            ComponentId::new("a"),
            vec![
                RateHop::new(source.clone(), ComponentId::new("a")),
                RateHop::new(source, ComponentId::new("b")),
            ],
        ))
        .unwrap();
    NavComposer::new(Arc::new(registry), precision)
}

fn one_holding(units_held: Decimal) -> Vec<ComponentHolding> {
    vec![ComponentHolding {
        component: ComponentId::new("a"),
        units_held,
    }]
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_minimum_never_exceeds_expected(
        expected in expected_strategy(),
        bps in 0u32..10_000,
    ) {
        let minimum = minimum_output(expected, bps, precision()).unwrap();
        prop_assert!(minimum <= expected);
        prop_assert!(minimum >= Decimal::ZERO);
    }

    #[test]
    fn prop_zero_tolerance_is_exact(expected in expected_strategy()) {
        prop_assert_eq!(minimum_output(expected, 0, precision()).unwrap(), expected);
    }

    #[test]
    fn prop_minimum_monotone_in_tolerance(
        expected in expected_strategy(),
        low in 0u32..10_000,
        high in 0u32..10_000,
    ) {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let tight = minimum_output(expected, low, precision()).unwrap();
        let loose = minimum_output(expected, high, precision()).unwrap();
        prop_assert!(loose <= tight);
    }

    #[test]
    fn prop_full_tolerance_rejected(
        expected in expected_strategy(),
        bps in 10_000u32..20_000,
    ) {
        prop_assert!(matches!(
            minimum_output(expected, bps, precision()),
            Err(Error::InvalidSlippage(_))
        ));
    }

    #[test]
    fn prop_nav_floors_below_exact_value(
        first in rate_strategy(),
        second in rate_strategy(),
        units_held in rate_strategy(),
        units in 1i64..1_000,
    ) {
        let precision = Precision::new(6).unwrap();
        let composer = two_hop_composer(first, second, precision);
        let units = Decimal::from(units);
        let value = block_on(composer.compute_basket_value(&one_holding(units_held), units)).unwrap();

        let exact = first * second * units_held * units;
        prop_assert!(value <= exact);
        prop_assert_eq!(value, precision.floor(value));
    }

    #[test]
    fn prop_nav_matches_integer_floors_at_full_precision(
        first in precise_rate_strategy(),
        second in precise_rate_strategy(),
        units_held in precise_rate_strategy(),
        units in precise_units_strategy(),
    ) {
        let composer = two_hop_composer(first, second, precision());
        let value = block_on(composer.compute_basket_value(&one_holding(units_held), units)).unwrap();

        // floor after every multiplication, on 18-decimal integers
        let rate = floor_mul(fixed(first), fixed(second));
        let unit_value = floor_mul(fixed(units_held), rate);
        let exact = floor_mul(unit_value, fixed(units));
        prop_assert_eq!(value, from_fixed(exact));
    }

    #[test]
    fn prop_minimum_matches_integer_bound_at_full_precision(
        expected in precise_units_strategy(),
        bps in 0u32..10_000,
    ) {
        let minimum = minimum_output(expected, bps, precision()).unwrap();

        let scaled = fixed(expected);
        let delta = scaled * U256::from(bps) / U256::from(10_000u32);
        prop_assert_eq!(minimum, from_fixed(scaled - delta));
    }
}
