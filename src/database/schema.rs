//! Database Schema
//!
//! RocksDB column families for persisted chain state, with per-family
//! tuning and atomic write batches.

use anyhow::{anyhow, Context, Result};
use rocksdb::{
    BlockBasedOptions, ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode,
    Options, ReadOptions, WriteBatch, WriteOptions, DB,
};
use std::path::Path;
use std::sync::Arc;

/// Column family names
pub mod cf_names {
    /// height -> encoded block
    pub const BLOCKS: &str = "cf_blocks";
    /// serial -> spent record
    pub const SPENT_SERIALS: &str = "cf_spent_serials";
    /// height -> canonical checkpoint bytes
    pub const CHECKPOINTS: &str = "cf_checkpoints";
    pub const METADATA: &str = "cf_metadata";

    pub const ALL: [&str; 4] = [BLOCKS, SPENT_SERIALS, CHECKPOINTS, METADATA];
}

/// Metadata keys
pub mod meta_keys {
    pub const TIP: &[u8] = b"tip";
    pub const CONSENSUS_PARAMS: &[u8] = b"consensus_params";
}

#[derive(Debug, Clone)]
pub struct DBConfig {
    pub db_path: String,

    /// Write buffer size per column family (default: 64MB)
    pub write_buffer_size: usize,

    /// Maximum open files (default: 1000)
    pub max_open_files: i32,

    /// Background thread count for compaction
    pub max_background_jobs: i32,

    /// fsync every batch
    pub sync_writes: bool,
}

impl Default for DBConfig {
    fn default() -> Self {
        Self {
            db_path: "./zerocoin_db".to_string(),
            write_buffer_size: 64 * 1024 * 1024,
            max_open_files: 1000,
            max_background_jobs: 4,
            sync_writes: true,
        }
    }
}

/// Per column family tuning
#[derive(Debug, Clone)]
pub struct CFConfig {
    pub name: &'static str,
    pub write_buffer_size: usize,
    pub enable_bloom_filter: bool,
    pub compression_type: rocksdb::DBCompressionType,
}

impl CFConfig {
    /// Sequential, written once per block
    pub fn blocks(write_buffer_size: usize) -> Self {
        Self {
            name: cf_names::BLOCKS,
            write_buffer_size,
            enable_bloom_filter: false,
            compression_type: rocksdb::DBCompressionType::Lz4,
        }
    }

    /// Point lookups on every validated spend
    pub fn spent_serials(write_buffer_size: usize) -> Self {
        Self {
            name: cf_names::SPENT_SERIALS,
            write_buffer_size,
            enable_bloom_filter: true,
            compression_type: rocksdb::DBCompressionType::None,
        }
    }

    pub fn checkpoints() -> Self {
        Self {
            name: cf_names::CHECKPOINTS,
            write_buffer_size: 8 * 1024 * 1024,
            enable_bloom_filter: false,
            compression_type: rocksdb::DBCompressionType::Lz4,
        }
    }

    pub fn metadata() -> Self {
        Self {
            name: cf_names::METADATA,
            write_buffer_size: 4 * 1024 * 1024,
            enable_bloom_filter: true,
            compression_type: rocksdb::DBCompressionType::None,
        }
    }

    pub fn to_options(&self) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(self.write_buffer_size);
        opts.set_compression_type(self.compression_type);
        opts.set_compaction_style(DBCompactionStyle::Level);

        let mut block_opts = BlockBasedOptions::default();
        if self.enable_bloom_filter {
            block_opts.set_bloom_filter(10.0, false);
            block_opts.set_cache_index_and_filter_blocks(true);
        }
        opts.set_block_based_table_factory(&block_opts);
        opts
    }
}

#[derive(Clone)]
pub struct DatabaseManager {
    db: Arc<DB>,
    config: DBConfig,
}

impl DatabaseManager {
    /// Open the database, creating every column family
    pub fn open(config: DBConfig) -> Result<Self> {
        let cf_configs = [
            CFConfig::blocks(config.write_buffer_size),
            CFConfig::spent_serials(config.write_buffer_size),
            CFConfig::checkpoints(),
            CFConfig::metadata(),
        ];
        let cf_descriptors: Vec<ColumnFamilyDescriptor> = cf_configs
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(cf.name, cf.to_options()))
            .collect();

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_max_background_jobs(config.max_background_jobs);

        let db = DB::open_cf_descriptors(&db_opts, Path::new(&config.db_path), cf_descriptors)
            .with_context(|| format!("Failed to open database at {}", config.db_path))?;

        Ok(Self {
            db: Arc::new(db),
            config,
        })
    }

    pub fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| anyhow!("Column family '{}' not found", name))
    }

    pub fn config(&self) -> &DBConfig {
        &self.config
    }

    pub fn create_write_batch(&self) -> WriteBatch {
        WriteBatch::default()
    }

    pub fn batch_put(&self, batch: &mut WriteBatch, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        batch.put_cf(self.cf_handle(cf_name)?, key, value);
        Ok(())
    }

    pub fn batch_delete(&self, batch: &mut WriteBatch, cf_name: &str, key: &[u8]) -> Result<()> {
        batch.delete_cf(self.cf_handle(cf_name)?, key);
        Ok(())
    }

    /// Apply a batch atomically
    pub fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db
            .write_opt(batch, &write_opts)
            .context("Failed to execute write batch")
    }

    pub fn get_cf(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(cf_name)?;
        self.db
            .get_cf_opt(cf, key, &ReadOptions::default())
            .with_context(|| format!("Failed to get key from {}", cf_name))
    }

    pub fn put_cf(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf_handle(cf_name)?;
        self.db
            .put_cf_opt(cf, key, value, &WriteOptions::default())
            .with_context(|| format!("Failed to put key to {}", cf_name))
    }

    /// Every entry of a column family in key order
    pub fn entries_cf(&self, cf_name: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf_handle(cf_name)?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.with_context(|| format!("Failed to iterate {}", cf_name))?;
            entries.push((key.into_vec(), value.into_vec()));
        }
        Ok(entries)
    }
}

/// Big-endian height keys sort in height order
pub fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

pub fn parse_height_key(key: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| anyhow!("Height key of {} bytes", key.len()))?;
    Ok(u64::from_be_bytes(bytes))
}
