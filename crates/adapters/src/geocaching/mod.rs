//! Listing-site adapters
//!
//! `GeocachingClient` scrapes the public website with a signed-in session.
//! `StubListingService` serves fixed data for offline runs and tests.

mod logbook;
mod markers;
mod rate_limit;
mod sanitize;
mod search;
mod session;
mod wire;

pub use session::{Credentials, SessionConfig};

use async_trait::async_trait;
use geofinds_domain::{Listing, ListingError, ListingService, LogEntry, SearchQuery};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use time::{OffsetDateTime, UtcOffset};

use session::Session;

/// Scraping client for the listing site
pub struct GeocachingClient {
    session: Session,
    credentials: Credentials,
    utc_offset: UtcOffset,
    /// Resolved item GUIDs, kept across cycles
    guids: Mutex<HashMap<String, String>>,
}

impl GeocachingClient {
    pub fn new(
        config: &SessionConfig,
        credentials: Credentials,
        utc_offset: UtcOffset,
    ) -> Result<Self, ListingError> {
        Ok(Self {
            session: Session::new(config)?,
            credentials,
            utc_offset,
            guids: Mutex::new(HashMap::new()),
        })
    }

    fn cached_guid(&self, code: &str) -> Option<String> {
        self.guids
            .lock()
            .ok()
            .and_then(|guids| guids.get(code).cloned())
    }

    fn remember_guid(&self, code: &str, guid: &str) {
        if let Ok(mut guids) = self.guids.lock() {
            guids.insert(code.to_string(), guid.to_string());
        }
    }
}

#[async_trait]
impl ListingService for GeocachingClient {
    async fn authenticate(&self) -> Result<(), ListingError> {
        self.session.sign_in(&self.credentials).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Listing>, ListingError> {
        tracing::info!(area = %query.area_name, "Running a search");
        search::search_all(&self.session, query, self.utc_offset).await
    }

    async fn fetch_log_entries(
        &self,
        listing: &mut Listing,
    ) -> Result<Vec<LogEntry>, ListingError> {
        if listing.guid.is_none() {
            listing.guid = self.cached_guid(&listing.code);
        }

        let entries = logbook::fetch_entries(&self.session, listing, self.utc_offset).await?;

        if let Some(guid) = &listing.guid {
            self.remember_guid(&listing.code, guid);
        }
        Ok(entries)
    }
}

/// Deterministic listing service serving fixed listings and log entries
#[derive(Default)]
pub struct StubListingService {
    listings: Vec<Listing>,
    logs: HashMap<String, Vec<LogEntry>>,
}

impl StubListingService {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_listings(listings: Vec<Listing>) -> Self {
        Self {
            listings,
            logs: HashMap::new(),
        }
    }

    /// Serve `entries` (newest first) for `code`
    pub fn with_log(mut self, code: &str, entries: Vec<LogEntry>) -> Self {
        self.logs.insert(code.to_string(), entries);
        self
    }

    /// Load listings and log entries from a JSON fixture.
    ///
    /// ```json
    /// {
    ///   "listings": [{"code": "GC1", "name": "Hideout", "owner": "johndoe",
    ///                 "last_activity_at": "2023-03-02T09:00:00+10:00"}],
    ///   "logs": {"GC1": [{"actor": "Amy", "note": "TFTC", "entry_type": "Found it"}]}
    /// }
    /// ```
    pub fn from_fixture_json(json: &str) -> Result<Self, ListingError> {
        let fixture: Fixture = serde_json::from_str(json)
            .map_err(|e| ListingError::Decode(format!("stub fixture: {}", e)))?;

        Ok(Self {
            listings: fixture.listings.into_iter().map(Listing::from).collect(),
            logs: fixture.logs,
        })
    }

    pub fn from_fixture_file(path: &Path) -> Result<Self, ListingError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ListingError::Transport(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_fixture_json(&json)
    }
}

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    listings: Vec<FixtureListing>,
    #[serde(default)]
    logs: HashMap<String, Vec<LogEntry>>,
}

#[derive(Debug, Deserialize)]
struct FixtureListing {
    code: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    owner: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    placed_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    last_activity_at: Option<OffsetDateTime>,
    #[serde(default)]
    premium_only: bool,
    detail_path: Option<String>,
}

impl From<FixtureListing> for Listing {
    fn from(f: FixtureListing) -> Self {
        Listing {
            detail_path: f
                .detail_path
                .unwrap_or_else(|| format!("/geocache/{}", f.code)),
            code: f.code,
            name: f.name,
            owner: f.owner,
            placed_at: f.placed_at,
            last_activity_at: f.last_activity_at,
            premium_only: f.premium_only,
            guid: None,
        }
    }
}

#[async_trait]
impl ListingService for StubListingService {
    async fn authenticate(&self) -> Result<(), ListingError> {
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Listing>, ListingError> {
        Ok(self
            .listings
            .iter()
            .filter(|l| !(query.ignore_premium && l.premium_only))
            .cloned()
            .collect())
    }

    async fn fetch_log_entries(
        &self,
        listing: &mut Listing,
    ) -> Result<Vec<LogEntry>, ListingError> {
        match self.logs.get(&listing.code) {
            Some(entries) => {
                if listing.guid.is_none() {
                    listing.guid = Some(format!("stub-{}", listing.code));
                }
                Ok(entries.clone())
            }
            None => Err(ListingError::ScrapeToken {
                kind: geofinds_domain::TokenKind::ItemGuid,
                context: listing.code.clone(),
            }),
        }
    }
}
