//! Rate source adapters
//!
//! A [`RateSource`] reads the current price of one component. Adapters never
//! retry; retry policy belongs to the caller.

use crate::{
    types::{ComponentId, Rate},
    Error, Result,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Reads current exchange rates
#[async_trait]
pub trait RateSource: Send + Sync + fmt::Debug {
    /// Quote units per one unit of `component`
    async fn get_rate(&self, component: &ComponentId) -> Result<Rate>;
}

/// Fixed rate table
#[derive(Debug, Default)]
pub struct StaticRateSource {
    name: String,
    rates: RwLock<HashMap<ComponentId, Rate>>,
}

impl StaticRateSource {
    /// Create empty source
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: RwLock::new(HashMap::new()),
        }
    }

    /// Create source from a table
    pub fn with_rates(
        name: impl Into<String>,
        rates: impl IntoIterator<Item = (ComponentId, Rate)>,
    ) -> Self {
        Self {
            name: name.into(),
            rates: RwLock::new(rates.into_iter().collect()),
        }
    }

    /// Set or replace a rate
    pub fn set_rate(&self, component: ComponentId, rate: Rate) {
        self.rates.write().insert(component, rate);
    }

    /// Remove a rate; reads fail until it is set again
    pub fn remove_rate(&self, component: &ComponentId) {
        self.rates.write().remove(component);
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    async fn get_rate(&self, component: &ComponentId) -> Result<Rate> {
        self.rates
            .read()
            .get(component)
            .copied()
            .ok_or_else(|| Error::SourceUnavailable {
                component: component.clone(),
                reason: format!("{} has no rate", self.name),
            })
    }
}

/// Bounds the latency of another source
#[derive(Debug)]
pub struct TimeoutRateSource {
    inner: Arc<dyn RateSource>,
    timeout: Duration,
}

impl TimeoutRateSource {
    /// Wrap `inner`, failing reads slower than `timeout`
    pub fn new(inner: Arc<dyn RateSource>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl RateSource for TimeoutRateSource {
    async fn get_rate(&self, component: &ComponentId) -> Result<Rate> {
        match tokio::time::timeout(self.timeout, self.inner.get_rate(component)).await {
            Ok(result) => result,
            Err(_) => Err(Error::SourceUnavailable {
                component: component.clone(),
                reason: format!("timed out after {:?}", self.timeout),
            }),
        }
    }
}
