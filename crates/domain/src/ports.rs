//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{Announcement, CacheRecord, FindEvent, Listing, LogEntry, SearchQuery};

/// Which scraped token a page failed to yield
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Anti-forgery token on the sign-in page
    RequestVerification,
    /// Per-item GUID on the detail page
    ItemGuid,
    /// Short-lived user token on the logbook bootstrap page
    UserToken,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RequestVerification => "request verification token",
            Self::ItemGuid => "item guid",
            Self::UserToken => "user token",
        };
        f.write_str(name)
    }
}

/// Error type for listing service operations
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Could not find {kind}: {context}")]
    ScrapeToken { kind: TokenKind, context: String },
    #[error("Search needed {pages} pages, more than the limit of {limit}")]
    SanityLimitExceeded { pages: usize, limit: usize },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ListingError {
    /// Errors that must stop the process rather than the current cycle
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

/// Capability interface for the listing service
///
/// Implemented by the real scraping client and by a deterministic double.
#[async_trait]
pub trait ListingService: Send + Sync {
    /// Establish the session used by every later call
    async fn authenticate(&self) -> Result<(), ListingError>;

    /// Return the complete, optionally premium-filtered result set
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Listing>, ListingError>;

    /// Fetch the most recent activity entries for one item, newest first.
    /// Resolves and stores `listing.guid` when it is not yet known.
    async fn fetch_log_entries(&self, listing: &mut Listing)
    -> Result<Vec<LogEntry>, ListingError>;
}

/// Error type for persistence operations
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Port for the persisted change-detection state
#[async_trait]
pub trait ChangeStore: Send + Sync {
    /// Look up the record for an item code
    async fn get_cache(&self, code: &str) -> Result<Option<CacheRecord>, PersistenceError>;

    /// Insert a record for a first-seen code. Returns false if the code already existed.
    async fn insert_cache(&self, record: &CacheRecord) -> Result<bool, PersistenceError>;

    /// Atomically advance `last_seen_at` for `code` and append `event`.
    ///
    /// Only applies when the stored time is strictly earlier than `last_seen_at`;
    /// returns false (and writes nothing) otherwise.
    async fn record_find(
        &self,
        code: &str,
        last_seen_at: OffsetDateTime,
        event: &FindEvent,
    ) -> Result<bool, PersistenceError>;

    /// Number of journal rows for `actor` with `found_at >= since`
    async fn count_finds_since(
        &self,
        actor: &str,
        since: OffsetDateTime,
    ) -> Result<u32, PersistenceError>;

    /// Read the singleton cursor
    async fn get_cursor(&self) -> Result<Option<OffsetDateTime>, PersistenceError>;

    /// Overwrite the singleton cursor
    async fn set_cursor(&self, at: OffsetDateTime) -> Result<(), PersistenceError>;
}

/// Error type for publisher operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Content too long: {len} > {max}")]
    ContentTooLong { len: usize, max: usize },
}

/// Result of a successful publish operation
#[derive(Debug, Clone)]
pub struct PublishResult {
    /// Platform-specific post ID
    pub id: String,
    /// URL to the published content, if available
    pub url: Option<String>,
}

/// Port for the posting collaborator
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish an announcement, returns the published ID
    async fn publish(&self, announcement: &Announcement) -> Result<PublishResult, PublishError>;

    /// Get the platform name (e.g., "mastodon", "outbox")
    fn platform(&self) -> &'static str;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
