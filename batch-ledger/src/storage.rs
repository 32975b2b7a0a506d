//! Persistence for batch and claim records
//!
//! # Column Families
//!
//! - `batches` - Batch records (key: direction || sequence)
//! - `claims` - Account claims (key: batch key || account)
//! - `cooldowns` - Cooldown state (key: direction)
//!
//! The ledger validates a mutation in memory, hands the resulting records to
//! [`BatchStore::apply`] and only commits them to memory once the write
//! succeeded. Writes that touch several records are atomic.

use crate::{
    config::StorageConfig,
    error::{Error, Result},
    types::{AccountClaim, Batch, CooldownState},
};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Column family names
const CF_BATCHES: &str = "batches";
const CF_CLAIMS: &str = "claims";
const CF_COOLDOWNS: &str = "cooldowns";

/// A record to persist
#[derive(Debug, Clone)]
pub enum StoreWrite {
    /// Batch record
    Batch(Batch),
    /// Account claim record
    Claim(AccountClaim),
    /// Cooldown state of one direction
    Cooldown(CooldownState),
}

/// Every persisted record, as loaded on open
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Batches in key order
    pub batches: Vec<Batch>,
    /// Claims in key order
    pub claims: Vec<AccountClaim>,
    /// Cooldowns by direction
    pub cooldowns: Vec<CooldownState>,
}

/// Backend that keeps ledger records across restarts
pub trait BatchStore: Send + Sync + std::fmt::Debug {
    /// Load every record
    fn load(&self) -> Result<StoreSnapshot>;

    /// Persist records atomically
    fn apply(&self, writes: &[StoreWrite]) -> Result<()>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<MemoryRecords>,
}

#[derive(Debug, Default)]
struct MemoryRecords {
    batches: BTreeMap<[u8; 9], Batch>,
    claims: BTreeMap<Vec<u8>, AccountClaim>,
    cooldowns: BTreeMap<u8, CooldownState>,
}

impl MemoryStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchStore for MemoryStore {
    fn load(&self) -> Result<StoreSnapshot> {
        let records = self.records.lock();
        Ok(StoreSnapshot {
            batches: records.batches.values().cloned().collect(),
            claims: records.claims.values().cloned().collect(),
            cooldowns: records.cooldowns.values().cloned().collect(),
        })
    }

    fn apply(&self, writes: &[StoreWrite]) -> Result<()> {
        let mut records = self.records.lock();
        for write in writes {
            match write {
                StoreWrite::Batch(batch) => {
                    records.batches.insert(batch.id.to_key(), batch.clone());
                }
                StoreWrite::Claim(claim) => {
                    records.claims.insert(claim.key(), claim.clone());
                }
                StoreWrite::Cooldown(cooldown) => {
                    records
                        .cooldowns
                        .insert(cooldown.direction as u8, cooldown.clone());
                }
            }
        }
        Ok(())
    }
}

/// RocksDB-backed store
pub struct RocksStore {
    db: Arc<DB>,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore")
            .field("path", &self.db.path())
            .finish()
    }
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BATCHES, Self::cf_options()),
            ColumnFamilyDescriptor::new(CF_CLAIMS, Self::cf_options()),
            ColumnFamilyDescriptor::new(CF_COOLDOWNS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened batch store");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn load_cf<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let cf = self.cf_handle(name)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }
}

impl BatchStore for RocksStore {
    fn load(&self) -> Result<StoreSnapshot> {
        Ok(StoreSnapshot {
            batches: self.load_cf(CF_BATCHES)?,
            claims: self.load_cf(CF_CLAIMS)?,
            cooldowns: self.load_cf(CF_COOLDOWNS)?,
        })
    }

    fn apply(&self, writes: &[StoreWrite]) -> Result<()> {
        let mut batch = WriteBatch::default();

        for write in writes {
            match write {
                StoreWrite::Batch(record) => {
                    let cf = self.cf_handle(CF_BATCHES)?;
                    batch.put_cf(cf, record.id.to_key(), bincode::serialize(record)?);
                }
                StoreWrite::Claim(record) => {
                    let cf = self.cf_handle(CF_CLAIMS)?;
                    batch.put_cf(cf, record.key(), bincode::serialize(record)?);
                }
                StoreWrite::Cooldown(record) => {
                    let cf = self.cf_handle(CF_COOLDOWNS)?;
                    batch.put_cf(cf, [record.direction as u8], bincode::serialize(record)?);
                }
            }
        }

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(records = writes.len(), "Batch store write committed");

        Ok(())
    }
}
