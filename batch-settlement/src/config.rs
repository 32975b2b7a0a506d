//! Configuration for batch settlement

use crate::{
    composition::StaticComposition,
    nav::{PriceRoute, RateHop, RateRegistry},
    rate_source::{RateSource, StaticRateSource, TimeoutRateSource},
    retry::RetryConfig,
    types::{BasketId, ComponentHolding, ComponentId, Rate},
    Error, Result,
};
use batch_ledger::{math::BPS_DENOMINATOR, Direction, Precision};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable naming a TOML configuration file
pub const CONFIG_PATH_ENV: &str = "BATCH_KEEPER_CONFIG";

/// Settlement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Ledger configuration
    pub ledger: batch_ledger::Config,

    /// Slippage tolerance applied to every settlement (basis points)
    pub slippage_bps: u32,

    /// Basket minted and redeemed
    pub basket: BasketId,

    /// Asset deposited by minters and paid to redeemers
    pub funding_asset: ComponentId,

    /// Pricing retry policy
    pub retry: RetryConfig,

    /// Keeper loop
    pub keeper: KeeperConfig,

    /// Static rates and compositions
    pub market: MarketConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "batch-settlement".to_string(),
            ledger: batch_ledger::Config::default(),
            slippage_bps: 50, // 0.5%
            basket: BasketId::new("butter"),
            funding_asset: ComponentId::new("3crv"),
            retry: RetryConfig::default(),
            keeper: KeeperConfig::default(),
            market: MarketConfig::default(),
        }
    }
}

/// Keeper loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    /// Seconds between cycles
    pub poll_interval_secs: u64,

    /// Directions the keeper settles
    pub directions: Vec<Direction>,

    /// Timeout for a single rate read (ms)
    pub rate_timeout_ms: u64,

    /// Emit logs as JSON
    pub json_logs: bool,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            directions: Direction::ALL.to_vec(),
            rate_timeout_ms: 5000,
            json_logs: false,
        }
    }
}

impl KeeperConfig {
    /// Check loop settings
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::Config(
                "keeper.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.rate_timeout_ms == 0 {
            return Err(Error::Config(
                "keeper.rate_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Price route declared by source keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Component priced
    pub component: String,

    /// Rate keys multiplied in order
    pub hops: Vec<String>,
}

/// Component units backing one basket unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingConfig {
    /// Component held
    pub component: String,

    /// Units per basket unit
    pub units: Decimal,
}

/// Static market data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Rates by key
    pub rates: BTreeMap<String, Decimal>,

    /// Price routes
    pub routes: Vec<RouteConfig>,

    /// Per-unit holdings by basket
    pub holdings: BTreeMap<String, Vec<HoldingConfig>>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        let rates = [
            ("3crv.virtual_price", Decimal::new(102, 2)),
            ("yv-crvfrax.price_per_share", Decimal::new(105, 2)),
            ("crvfrax.virtual_price", Decimal::new(101, 2)),
            ("yv-crvmim.price_per_share", Decimal::new(103, 2)),
            ("crvmim.virtual_price", Decimal::new(100, 2)),
        ]
        .into_iter()
        .map(|(key, rate)| (key.to_string(), rate))
        .collect();

        let route = |component: &str, hops: &[&str]| RouteConfig {
            component: component.to_string(),
            hops: hops.iter().map(|hop| hop.to_string()).collect(),
        };
        let routes = vec![
            route("3crv", &["3crv.virtual_price"]),
            route(
                "yv-crvfrax",
                &["yv-crvfrax.price_per_share", "crvfrax.virtual_price"],
            ),
            route(
                "yv-crvmim",
                &["yv-crvmim.price_per_share", "crvmim.virtual_price"],
            ),
        ];

        let mut holdings = BTreeMap::new();
        holdings.insert(
            "butter".to_string(),
            vec![
                HoldingConfig {
                    component: "yv-crvfrax".to_string(),
                    units: Decimal::new(50, 0),
                },
                HoldingConfig {
                    component: "yv-crvmim".to_string(),
                    units: Decimal::new(50, 0),
                },
            ],
        );

        Self {
            rates,
            routes,
            holdings,
        }
    }
}

/// Rate registry and composition built from [`MarketConfig`]
#[derive(Debug)]
pub struct StaticMarket {
    /// Underlying rate table, for live updates
    pub source: Arc<StaticRateSource>,

    /// Routes over the table
    pub registry: RateRegistry,

    /// Basket compositions
    pub composition: StaticComposition,
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `BATCH_KEEPER_CONFIG`, else defaults,
    /// then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(PathBuf::from(path))?,
            Err(_) => Config::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BATCH_KEEPER_*` and `BATCH_LEDGER_*` overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.ledger.apply_env()?;

        if let Ok(bps) = std::env::var("BATCH_KEEPER_SLIPPAGE_BPS") {
            self.slippage_bps = bps
                .parse()
                .map_err(|e| Error::Config(format!("Invalid BATCH_KEEPER_SLIPPAGE_BPS: {}", e)))?;
        }

        if let Ok(secs) = std::env::var("BATCH_KEEPER_POLL_SECS") {
            self.keeper.poll_interval_secs = secs
                .parse()
                .map_err(|e| Error::Config(format!("Invalid BATCH_KEEPER_POLL_SECS: {}", e)))?;
        }

        if let Ok(json) = std::env::var("BATCH_KEEPER_JSON_LOGS") {
            self.keeper.json_logs = matches!(json.as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.ledger.validate()?;

        if self.slippage_bps >= BPS_DENOMINATOR {
            return Err(Error::InvalidSlippage(self.slippage_bps));
        }

        self.keeper.validate()

    }

    /// Precision shared by ledger and pricing
    pub fn precision(&self) -> Precision {
        self.ledger.precision
    }

    /// Build rate routes and compositions from the static market tables
    pub fn build_market(&self) -> Result<StaticMarket> {
        let market = &self.market;

        let source = Arc::new(StaticRateSource::with_rates(
            "static",
            market
                .rates
                .iter()
                .map(|(key, rate)| (ComponentId::new(key.as_str()), Rate::new(*rate))),
        ));
        let bounded: Arc<dyn RateSource> = Arc::new(TimeoutRateSource::new(
            source.clone(),
            Duration::from_millis(self.keeper.rate_timeout_ms),
        ));

        let mut registry = RateRegistry::new();
        for route in &market.routes {
            let hops = route
                .hops
                .iter()
                .map(|key| {
                    if !market.rates.contains_key(key) {
                        return Err(Error::Config(format!(
                            "route {} references unknown rate {}",
                            route.component, key
                        )));
                    }
                    Ok(RateHop::new(bounded.clone(), ComponentId::new(key.as_str())))
                })
                .collect::<Result<Vec<_>>>()?;
            registry.register(PriceRoute::new(ComponentId::new(route.component.as_str()), hops))?;
        }

        let mut composition = StaticComposition::new(self.precision());
        for (basket, holdings) in &market.holdings {
            if holdings.is_empty() {
                return Err(Error::Config(format!("basket {} has no holdings", basket)));
            }
            let per_unit = holdings
                .iter()
                .map(|holding| ComponentHolding {
                    component: ComponentId::new(holding.component.as_str()),
                    units_held: holding.units,
                })
                .collect::<Vec<_>>();

            for holding in &per_unit {
                if registry.route(&holding.component).is_none() {
                    return Err(Error::Config(format!(
                        "basket {} holds {} which has no price route",
                        basket, holding.component
                    )));
                }
            }
            composition.insert(BasketId::new(basket.as_str()), per_unit);
        }

        if !market.holdings.contains_key(self.basket.as_str()) {
            return Err(Error::Config(format!(
                "no holdings configured for basket {}",
                self.basket
            )));
        }
        if registry.route(&self.funding_asset).is_none() {
            return Err(Error::Config(format!(
                "funding asset {} has no price route",
                self.funding_asset
            )));
        }

        Ok(StaticMarket {
            source,
            registry,
            composition,
        })
    }
}
