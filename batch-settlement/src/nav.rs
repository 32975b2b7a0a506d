//! Net asset value of a basket
//!
//! Each component is priced along a [`PriceRoute`]: the rates of its hops are
//! multiplied in order (e.g. vault share price × pool virtual price), flooring
//! after every step. Routes are registered once at setup, keyed by component.
//!
//! Rates for a NAV are read concurrently and combined only once every hop has
//! answered. Any failure fails the whole computation; a partial NAV is never
//! returned.
//!
//! Holdings and rates are read as independent snapshots, possibly taken at
//! slightly different times.

use crate::{
    rate_source::RateSource,
    types::{ComponentHolding, ComponentId, Rate, Value},
    Error, Result,
};
use batch_ledger::{Amount, Precision};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// One price lookup along a route
#[derive(Debug, Clone)]
pub struct RateHop {
    /// Source to query
    pub source: Arc<dyn RateSource>,

    /// Component to ask the source for
    pub component: ComponentId,
}

impl RateHop {
    /// Create new hop
    pub fn new(source: Arc<dyn RateSource>, component: ComponentId) -> Self {
        Self { source, component }
    }
}

/// Hops that price one component
#[derive(Debug, Clone)]
pub struct PriceRoute {
    /// Component priced by the route
    pub component: ComponentId,

    /// Rates multiplied in order
    pub hops: Vec<RateHop>,
}

impl PriceRoute {
    /// Create new route
    pub fn new(component: ComponentId, hops: Vec<RateHop>) -> Self {
        Self { component, hops }
    }

    /// Route reading the component's own rate from one source
    pub fn direct(component: ComponentId, source: Arc<dyn RateSource>) -> Self {
        let hop = RateHop::new(source, component.clone());
        Self::new(component, vec![hop])
    }
}

/// Price routes by component
#[derive(Debug, Clone, Default)]
pub struct RateRegistry {
    routes: HashMap<ComponentId, PriceRoute>,
}

impl RateRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route, replacing any previous route of the component
    pub fn register(&mut self, route: PriceRoute) -> Result<()> {
        if route.hops.is_empty() {
            return Err(Error::Config(format!(
                "price route for {} has no hops",
                route.component
            )));
        }
        self.routes.insert(route.component.clone(), route);
        Ok(())
    }

    /// Route of a component
    pub fn route(&self, component: &ComponentId) -> Option<&PriceRoute> {
        self.routes.get(component)
    }

    /// Registered components
    pub fn components(&self) -> impl Iterator<Item = &ComponentId> {
        self.routes.keys()
    }

    /// Resolve a component's rate through its route
    pub async fn resolve(&self, component: &ComponentId, precision: Precision) -> Result<Rate> {
        let route = self.route(component).ok_or_else(|| Error::RateUnavailable {
            component: component.clone(),
            reason: "no price route registered".to_string(),
        })?;

        let rates = try_join_all(
            route
                .hops
                .iter()
                .map(|hop| hop.source.get_rate(&hop.component)),
        )
        .await
        .map_err(|err| {
            tracing::warn!(component = %component, error = %err, "Price route failed");
            Error::RateUnavailable {
                component: component.clone(),
                reason: err.to_string(),
            }
        })?;

        let mut value = Decimal::ONE;
        for rate in rates {
            value = precision.mul_floor(value, rate.value())?;
        }
        Ok(Rate::new(value))
    }
}

/// Computes basket values from holdings and routed rates
#[derive(Debug, Clone)]
pub struct NavComposer {
    registry: Arc<RateRegistry>,
    precision: Precision,
}

impl NavComposer {
    /// Create new composer
    pub fn new(registry: Arc<RateRegistry>, precision: Precision) -> Self {
        Self {
            registry,
            precision,
        }
    }

    /// Current rate of one component
    pub async fn component_rate(&self, component: &ComponentId) -> Result<Rate> {
        self.registry.resolve(component, self.precision).await
    }

    /// Value of `units` basket units backed by per-unit `holdings`
    ///
    /// Zero for an empty composition.
    pub async fn compute_basket_value(
        &self,
        holdings: &[ComponentHolding],
        units: Amount,
    ) -> Result<Value> {
        if holdings.is_empty() {
            return Ok(Decimal::ZERO);
        }

        let rates = try_join_all(
            holdings
                .iter()
                .map(|holding| self.component_rate(&holding.component)),
        )
        .await?;

        let mut unit_value = Decimal::ZERO;
        for (holding, rate) in holdings.iter().zip(rates) {
            let component_value = self.precision.mul_floor(holding.units_held, rate.value())?;
            unit_value = unit_value.checked_add(component_value).ok_or_else(|| {
                batch_ledger::Error::Arithmetic(format!("basket value overflows at {}", holding.component))
            })?;
        }

        tracing::debug!(
            components = holdings.len(),
            unit_value = %unit_value,
            units = %units,
            "Basket value composed"
        );

        Ok(self.precision.mul_floor(unit_value, units)?)
    }
}
