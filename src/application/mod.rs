//! Application layer containing the business logic orchestration.
//!
//! Services here only talk to the domain ports, so the same logic runs
//! against the in-memory stores in tests and RocksDB in production. Record
//! updates use optimistic concurrency: read, apply the domain rule, then
//! compare-and-swap on the record version, retrying when another writer won.

pub mod accounts;
pub mod catalog;
pub mod machine;
pub mod policy;
pub mod purchase;
pub mod sessions;

/// Upper bound on compare-and-swap retries for a single record write.
pub(crate) const MAX_WRITE_ATTEMPTS: usize = 16;
