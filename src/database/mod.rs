//! Database Module
//!
//! RocksDB persistence for chain state, behind the `rocksdb` feature.

pub mod schema;
pub mod chain_store;

pub use schema::{cf_names, DBConfig, DatabaseManager};
pub use chain_store::ChainStore;
