//! Settlement pricing
//!
//! - **Mint**: `supplied × funding rate ÷ basket unit value`
//! - **Redeem**: `supplied × basket unit value ÷ funding rate`
//!
//! The minimum output is `expected - floor(expected × bps / 10000)`, so the
//! bound is never looser than the nominal tolerance. Pricing reads the batch
//! and mutates nothing.

use crate::{
    composition::Composition,
    metrics::Metrics,
    nav::NavComposer,
    types::{BasketId, ComponentId},
    Error, Result,
};
use batch_ledger::{math::BPS_DENOMINATOR, Amount, Batch, Direction, Precision, SettlementQuote};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;

/// Slippage-bounded minimum acceptable output
pub fn minimum_output(expected: Amount, slippage_bps: u32, precision: Precision) -> Result<Amount> {
    if slippage_bps >= BPS_DENOMINATOR {
        return Err(Error::InvalidSlippage(slippage_bps));
    }
    Ok(precision.less_bps(expected, slippage_bps)?)
}

/// Prices frozen batches
#[derive(Debug, Clone)]
pub struct SettlementPricer {
    nav: NavComposer,
    composition: Arc<dyn Composition>,
    basket: BasketId,
    funding_asset: ComponentId,
    precision: Precision,
    metrics: Metrics,
}

impl SettlementPricer {
    /// Create new pricer
    pub fn new(
        nav: NavComposer,
        composition: Arc<dyn Composition>,
        basket: BasketId,
        funding_asset: ComponentId,
        precision: Precision,
        metrics: Metrics,
    ) -> Self {
        Self {
            nav,
            composition,
            basket,
            funding_asset,
            precision,
            metrics,
        }
    }

    /// Expected and minimum output for `batch` at current prices
    pub async fn price_settlement(
        &self,
        batch: &Batch,
        slippage_bps: u32,
        now: DateTime<Utc>,
    ) -> Result<SettlementQuote> {
        if slippage_bps >= BPS_DENOMINATOR {
            return Err(Error::InvalidSlippage(slippage_bps));
        }

        let started = Instant::now();
        let result = self.expected_output(batch).await;
        self.metrics
            .record_pricing(batch.direction().as_str(), started.elapsed().as_secs_f64());

        let expected_output = match result {
            Ok(expected) => expected,
            Err(err) => {
                self.metrics.record_source_failure(err.kind());
                tracing::warn!(
                    batch_id = %batch.id,
                    error = %err,
                    "Settlement pricing failed"
                );
                return Err(err);
            }
        };

        let quote = SettlementQuote {
            expected_output,
            minimum_output: minimum_output(expected_output, slippage_bps, self.precision)?,
            slippage_bps,
            priced_at: now,
        };

        tracing::info!(
            batch_id = %batch.id,
            supplied_total = %batch.supplied_total,
            expected_output = %quote.expected_output,
            minimum_output = %quote.minimum_output,
            slippage_bps,
            "Batch priced"
        );

        Ok(quote)
    }

    async fn expected_output(&self, batch: &Batch) -> Result<Amount> {
        let holdings = self
            .composition
            .get_holdings(&self.basket, Decimal::ONE)
            .await?;

        let (unit_value, funding_rate) = futures::try_join!(
            self.nav.compute_basket_value(&holdings, Decimal::ONE),
            self.nav.component_rate(&self.funding_asset),
        )?;

        if unit_value.is_zero() {
            return Err(Error::EmptyBasket(self.basket.clone()));
        }

        let expected = match batch.direction() {
            Direction::Mint => {
                let input_value = self.precision.mul_floor(batch.supplied_total, funding_rate.value())?;
                self.precision.div_floor(input_value, unit_value)?
            }
            Direction::Redeem => self.precision.mul_div_floor(
                batch.supplied_total,
                unit_value,
                funding_rate.value(),
            )?,
        };

        Ok(expected)
    }
}
