//! RocksDB-backed block fact store.
//!
//! This implementation persists facts in a RocksDB instance with dedicated
//! column families:
//!
//! - `"facts"`:   maps block number (8 bytes, big-endian) -> bincode fact,
//! - `"by_time"`: maps `observed_at ++ number` (16 bytes, big-endian) -> `[]`.
//!
//! Big-endian keys sort numerically, so the last key of `"facts"` is the
//! highest stored block and a forward scan of `"by_time"` from the window
//! cutoff visits exactly the facts inside the window.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use crate::store::{BlockFactStore, StoreError};
use crate::types::{
    Aggregates, AggregationWindow, BlockFact, ClientVersionValidator, MinerClientValidator,
};

type Db = DBWithThreadMode<MultiThreaded>;

const CF_FACTS: &str = "facts";
const CF_BY_TIME: &str = "by_time";

/// Configuration for [`RocksDbFactStore`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/eth-clients-db".to_string(),
            create_if_missing: true,
        }
    }
}

/// RocksDB-backed implementation of [`BlockFactStore`].
pub struct RocksDbFactStore {
    db: Db,
    /// Serializes upserts: each one reads the previous fact to drop its
    /// stale `by_time` entry before writing.
    write_lock: Mutex<()>,
}

impl RocksDbFactStore {
    /// Opens (or creates) a RocksDB-backed fact store at the given path.
    ///
    /// This sets up the `"facts"` and `"by_time"` column families. The
    /// `"default"` column family is also created to keep RocksDB happy,
    /// but it is not currently used.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StoreError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_FACTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_BY_TIME, Options::default()),
        ];

        let db = Db::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &'static str) -> Result<Arc<BoundColumnFamily<'_>>, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or(StoreError::MissingColumnFamily(name))
    }

    fn encode_fact(fact: &BlockFact) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(fact, bincode::config::standard())
            .map_err(|e| StoreError::Encode(e.to_string()))
    }

    fn decode_fact(bytes: &[u8]) -> Result<BlockFact, StoreError> {
        let (fact, _): (BlockFact, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| StoreError::Corrupted(format!("fact value: {e}")))?;
        Ok(fact)
    }

    /// Scans the time index and folds every fact inside `window`.
    ///
    /// Reads go through one snapshot so a concurrent upsert cannot make a
    /// fact appear under both its old and new timestamp.
    fn window_aggregates(&self, window: AggregationWindow) -> Result<Aggregates, StoreError> {
        let mut out = Aggregates::default();
        let Some(from_ts) = window.cutoff().checked_add(1) else {
            return Ok(out);
        };

        let cf_facts = self.cf(CF_FACTS)?;
        let cf_time = self.cf(CF_BY_TIME)?;
        let snapshot = self.db.snapshot();

        let start = time_key(from_ts, 0);
        let iter = snapshot.iterator_cf(&cf_time, IteratorMode::From(&start, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            let number = number_from_time_key(&key)?;
            match snapshot.get_cf(&cf_facts, number.to_be_bytes())? {
                Some(bytes) => {
                    let fact = Self::decode_fact(&bytes)?;
                    if window.contains(&fact) {
                        out.add(&fact);
                    }
                }
                None => {
                    return Err(StoreError::Corrupted(format!(
                        "time index points at missing block {number}"
                    )));
                }
            }
        }

        Ok(out)
    }
}

fn time_key(observed_at: u64, number: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&observed_at.to_be_bytes());
    key[8..].copy_from_slice(&number.to_be_bytes());
    key
}

fn number_from_time_key(key: &[u8]) -> Result<u64, StoreError> {
    let tail: [u8; 8] = key
        .get(8..16)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| StoreError::Corrupted("time index key length".to_string()))?;
    Ok(u64::from_be_bytes(tail))
}

fn number_from_fact_key(key: &[u8]) -> Result<u64, StoreError> {
    let arr: [u8; 8] = key
        .try_into()
        .map_err(|_| StoreError::Corrupted("fact key length".to_string()))?;
    Ok(u64::from_be_bytes(arr))
}

impl BlockFactStore for RocksDbFactStore {
    fn upsert(&self, fact: BlockFact) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let cf_facts = self.cf(CF_FACTS)?;
        let cf_time = self.cf(CF_BY_TIME)?;
        let key = fact.number.to_be_bytes();

        let mut batch = WriteBatch::default();
        if let Some(previous) = self.db.get_cf(&cf_facts, key)? {
            let previous = Self::decode_fact(&previous)?;
            batch.delete_cf(&cf_time, time_key(previous.observed_at, previous.number));
        }
        batch.put_cf(&cf_facts, key, Self::encode_fact(&fact)?);
        batch.put_cf(&cf_time, time_key(fact.observed_at, fact.number), b"");

        self.db.write(batch)?;
        Ok(())
    }

    fn fact(&self, number: u64) -> Result<Option<BlockFact>, StoreError> {
        let cf = self.cf(CF_FACTS)?;
        match self.db.get_cf(&cf, number.to_be_bytes())? {
            Some(bytes) => Ok(Some(Self::decode_fact(&bytes)?)),
            None => Ok(None),
        }
    }

    fn last_processed_block(&self) -> Result<u64, StoreError> {
        let cf = self.cf(CF_FACTS)?;
        match self.db.iterator_cf(&cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                number_from_fact_key(&key)
            }
            None => Ok(0),
        }
    }

    fn aggregate_by_client_version_validator(
        &self,
        window: AggregationWindow,
    ) -> Result<BTreeMap<ClientVersionValidator, u64>, StoreError> {
        Ok(self.window_aggregates(window)?.by_client)
    }

    fn aggregate_by_miner_client_validator(
        &self,
        window: AggregationWindow,
    ) -> Result<BTreeMap<MinerClientValidator, u64>, StoreError> {
        Ok(self.window_aggregates(window)?.by_miner)
    }

    fn aggregate_empty_blocks_by_validator(
        &self,
        window: AggregationWindow,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        Ok(self.window_aggregates(window)?.empty_by_validator)
    }

    // One index scan for all three aggregates.
    fn aggregates(&self, window: AggregationWindow) -> Result<Aggregates, StoreError> {
        self.window_aggregates(window)
    }
}
