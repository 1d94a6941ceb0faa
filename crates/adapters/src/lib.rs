//! geofinds adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `geocaching`: scraping client for the listing site (plus a stub)
//! - `store`: SQLite and in-memory change stores
//! - `mastodon`: Mastodon publishing adapter (plus a recording stub)
//! - `outbox`: JSONL outbox publisher for approval workflows

pub mod geocaching;
pub mod mastodon;
pub mod outbox;
mod store_memory;
mod store_sqlite;

/// Re-exports for change store adapters
pub mod store {
    pub use crate::store_memory::InMemoryChangeStore;
    pub use crate::store_sqlite::{SqliteChangeStore, StoreStats};
}
