//! Adapters for the domain ports.

pub mod in_memory;
pub mod jwt;
pub mod password;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
