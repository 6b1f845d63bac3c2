//! Ledger ports and their implementations
//!
//! `ledger` declares the capability traits services depend on. `media` holds the
//! Postgres repositories (one file per entity, all sharing a single
//! transaction). `memory` is a snapshot-based ledger used by tests and local runs.

pub mod ledger;
pub mod media;
pub mod memory;
pub mod pool;
pub mod transaction;
