//! Configuration for the batch ledger

use crate::math::Precision;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Minimum seconds between settlements of the same direction
    pub cooldown_secs: u64,

    /// Fixed-point scale for every amount
    pub precision: Precision,

    /// Persistence configuration
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "batch-ledger".to_string(),
            cooldown_secs: 1800, // 30 minutes
            precision: Precision::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persist records to RocksDB (in-memory otherwise)
    pub enabled: bool,

    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB tuning
    pub rocksdb: RocksDBConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            data_dir: PathBuf::from("./data/batch-ledger"),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 16, // records are small and few
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse TOML
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `BATCH_LEDGER_*` overrides
    pub fn apply_env(&mut self) -> crate::Result<()> {
        if let Ok(secs) = std::env::var("BATCH_LEDGER_COOLDOWN_SECS") {
            self.cooldown_secs = secs.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid BATCH_LEDGER_COOLDOWN_SECS: {}", e))
            })?;
        }

        if let Ok(decimals) = std::env::var("BATCH_LEDGER_DECIMALS") {
            let decimals = decimals.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid BATCH_LEDGER_DECIMALS: {}", e))
            })?;
            self.precision = Precision::new(decimals)?;
        }

        if let Ok(dir) = std::env::var("BATCH_LEDGER_DATA_DIR") {
            self.storage.enabled = true;
            self.storage.data_dir = PathBuf::from(dir);
        }

        Ok(())
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> crate::Result<()> {
        Precision::new(self.precision.decimals)?;
        Ok(())
    }
}
