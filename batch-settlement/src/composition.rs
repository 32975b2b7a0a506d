//! Basket composition registry

use crate::{
    types::{BasketId, ComponentHolding},
    Error, Result,
};
use async_trait::async_trait;
use batch_ledger::{Amount, Precision};
use std::collections::HashMap;
use std::fmt;

/// External registry of what backs a basket
#[async_trait]
pub trait Composition: Send + Sync + fmt::Debug {
    /// Component units required to back `units` of `basket`
    async fn get_holdings(&self, basket: &BasketId, units: Amount) -> Result<Vec<ComponentHolding>>;
}

/// Fixed per-unit compositions
#[derive(Debug, Clone, Default)]
pub struct StaticComposition {
    baskets: HashMap<BasketId, Vec<ComponentHolding>>,
    precision: Precision,
}

impl StaticComposition {
    /// Create empty registry
    pub fn new(precision: Precision) -> Self {
        Self {
            baskets: HashMap::new(),
            precision,
        }
    }

    /// Set the holdings backing one unit of `basket`
    pub fn insert(&mut self, basket: BasketId, per_unit: Vec<ComponentHolding>) {
        self.baskets.insert(basket, per_unit);
    }
}

#[async_trait]
impl Composition for StaticComposition {
    async fn get_holdings(&self, basket: &BasketId, units: Amount) -> Result<Vec<ComponentHolding>> {
        let per_unit = self
            .baskets
            .get(basket)
            .ok_or_else(|| Error::UnknownBasket(basket.clone()))?;

        per_unit
            .iter()
            .map(|holding| -> Result<ComponentHolding> {
                Ok(ComponentHolding {
                    component: holding.component.clone(),
                    units_held: self.precision.mul_floor(holding.units_held, units)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ComponentId;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_holdings_scale_with_units() {
        let mut composition = StaticComposition::new(Precision::default());
        composition.insert(
            BasketId::new("butter"),
            vec![ComponentHolding {
                component: ComponentId::new("yv-frax"),
                units_held: dec!(0.25),
            }],
        );

        let holdings = composition
            .get_holdings(&BasketId::new("butter"), dec!(4))
            .await
            .unwrap();
        assert_eq!(holdings[0].units_held, dec!(1));
    }

    #[tokio::test]
    async fn test_unknown_basket() {
        let composition = StaticComposition::new(Precision::default());
        let result = composition
            .get_holdings(&BasketId::new("missing"), dec!(1))
            .await;
        assert!(matches!(result, Err(Error::UnknownBasket(_))));
    }
}
