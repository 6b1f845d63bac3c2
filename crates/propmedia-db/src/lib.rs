//! Propmedia job ledger
//!
//! Durable state for media assets, processing jobs and upload batches, plus the
//! slice of the listing catalog the media core advances. Every write happens
//! inside a [`TransactionGuard`] obtained from a [`MediaLedger`].

pub mod db;

pub use db::ledger::{
    AssetFilter, AssetStore, BatchStore, JobStore, LedgerSession, ListingStore, MediaLedger,
    Pagination,
};
pub use db::media::PgMediaLedger;
pub use db::memory::MemoryLedger;
pub use db::pool::setup_database;
pub use db::transaction::TransactionGuard;
