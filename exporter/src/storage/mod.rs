//! Storage backends for block facts.
//!
//! This module provides concrete implementations of the
//! [`crate::store::BlockFactStore`] trait, including:
//!
//! - an in-memory store ([`mem::InMemoryFactStore`]) suitable for tests,
//! - a RocksDB-backed store ([`rocksdb::RocksDbFactStore`]) for long-running
//!   exporters.

pub mod mem;
pub mod rocksdb;

pub use mem::InMemoryFactStore;
pub use self::rocksdb::{RocksDbConfig, RocksDbFactStore};
