//! Domain models and value objects

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A point-in-time snapshot of one listed item, as returned by a search
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    /// Unique item code (e.g. `GC1234`)
    pub code: String,
    /// Display name
    pub name: String,
    /// Username of the item's owner
    pub owner: String,
    /// When the item was placed, if the service reported a parseable date
    pub placed_at: Option<OffsetDateTime>,
    /// Most recent activity on the item, if any
    pub last_activity_at: Option<OffsetDateTime>,
    /// Whether the item is restricted to premium members
    pub premium_only: bool,
    /// Site-relative path of the item's detail page
    pub detail_path: String,
    /// Opaque per-item session token, resolved lazily from the detail page
    pub guid: Option<String>,
}

/// One activity-log entry for an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Username of whoever wrote the entry
    pub actor: String,
    /// Sanitised, single-line note text
    pub note: String,
    /// Entry type label (e.g. "Found it", "Attended")
    pub entry_type: String,
    /// Local midnight of the reported visit date, when it was recognisable
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub visited: Option<OffsetDateTime>,
    /// Coordinates attached to the entry, when the service supplied usable ones
    #[serde(default)]
    pub coordinates: Option<(f64, f64)>,
}

/// Persisted per-item state used for change detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub code: String,
    pub placed_at: Option<OffsetDateTime>,
    /// Latest activity time already announced for this item
    pub last_seen_at: Option<OffsetDateTime>,
}

/// Append-only journal row for one announced find
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindEvent {
    pub actor: String,
    pub found_at: OffsetDateTime,
    pub item_code: String,
    pub note: String,
    pub entry_type: String,
}

/// Geographic query parameters for a search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: u32,
    /// Human-readable area label used in announcements
    pub area_name: String,
    /// Drop premium-only items from the result set
    pub ignore_premium: bool,
}

/// Outcome of comparing an observed listing with persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// First sighting of this code
    NewCache,
    /// Activity time moved strictly forward
    FoundUpdate {
        previous: Option<OffsetDateTime>,
        current: OffsetDateTime,
    },
    /// Nothing to announce
    NoChange,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NewCache => "new_cache",
            Self::FoundUpdate { .. } => "found_update",
            Self::NoChange => "no_change",
        }
    }
}

/// A state mutation waiting for its announcement to be accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    NewCache(CacheRecord),
    FoundUpdate {
        code: String,
        last_seen_at: OffsetDateTime,
        event: FindEvent,
    },
}

impl PendingChange {
    pub fn code(&self) -> &str {
        match self {
            Self::NewCache(record) => &record.code,
            Self::FoundUpdate { code, .. } => code,
        }
    }
}

/// Data needed to render a found-it announcement
#[derive(Debug, Clone)]
pub struct FindDetails {
    pub actor: String,
    pub note: String,
    /// Finds by this actor since local midnight, including this one
    pub same_day_count: u32,
}

/// Composed announcement text ready for the posting collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub text: String,
    /// Code of the item the announcement is about
    pub item_code: String,
    /// Absolute URL of the item's detail page
    pub item_url: String,
}

/// Processing result for a single observed listing
#[derive(Debug)]
pub enum ProcessResult {
    /// Announcement accepted by the publisher and state persisted
    Announced {
        classification: Classification,
        post_id: Option<String>,
    },
    /// Listing was skipped (unchanged, dry run, inaccessible, ...)
    Skipped { reason: String },
    /// Fetching, publishing or persisting failed
    Failed { error: String },
}
