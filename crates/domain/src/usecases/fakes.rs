//! Fake port implementations shared by the use-case tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use time::OffsetDateTime;

use crate::model::{Announcement, CacheRecord, FindEvent, Listing, LogEntry, SearchQuery};
use crate::ports::{
    ChangeStore, Clock, ListingError, ListingService, PersistenceError, PublishError,
    PublishResult, Publisher,
};

pub fn listing(code: &str, last_activity_at: Option<OffsetDateTime>) -> Listing {
    Listing {
        code: code.to_string(),
        name: format!("Cache {}", code),
        owner: "owner".to_string(),
        placed_at: None,
        last_activity_at,
        premium_only: false,
        detail_path: format!("/geocache/{}", code),
        guid: None,
    }
}

pub struct FakeClock {
    time: Mutex<OffsetDateTime>,
}

impl FakeClock {
    pub fn at(time: OffsetDateTime) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    pub fn set(&self, time: OffsetDateTime) {
        *self.time.lock().unwrap() = time;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> OffsetDateTime {
        *self.time.lock().unwrap()
    }
}

#[derive(Default)]
pub struct FakeStore {
    caches: Mutex<HashMap<String, CacheRecord>>,
    events: Mutex<Vec<FindEvent>>,
    cursor: Mutex<Option<OffsetDateTime>>,
    mutations: Mutex<usize>,
    pub fail_writes: Mutex<bool>,
}

impl FakeStore {
    pub fn mutations(&self) -> usize {
        *self.mutations.lock().unwrap()
    }

    pub fn events(&self) -> Vec<FindEvent> {
        self.events.lock().unwrap().clone()
    }

    fn write(&self) -> Result<(), PersistenceError> {
        if *self.fail_writes.lock().unwrap() {
            return Err(PersistenceError::Database("disk full".to_string()));
        }
        *self.mutations.lock().unwrap() += 1;
        Ok(())
    }
}

#[async_trait]
impl ChangeStore for FakeStore {
    async fn get_cache(&self, code: &str) -> Result<Option<CacheRecord>, PersistenceError> {
        Ok(self.caches.lock().unwrap().get(code).cloned())
    }

    async fn insert_cache(&self, record: &CacheRecord) -> Result<bool, PersistenceError> {
        if self.caches.lock().unwrap().contains_key(&record.code) {
            return Ok(false);
        }
        self.write()?;
        self.caches
            .lock()
            .unwrap()
            .insert(record.code.clone(), record.clone());
        Ok(true)
    }

    async fn record_find(
        &self,
        code: &str,
        last_seen_at: OffsetDateTime,
        event: &FindEvent,
    ) -> Result<bool, PersistenceError> {
        let mut caches = self.caches.lock().unwrap();
        let Some(record) = caches.get_mut(code) else {
            return Ok(false);
        };
        if record.last_seen_at >= Some(last_seen_at) {
            return Ok(false);
        }
        self.write()?;
        record.last_seen_at = Some(last_seen_at);
        self.events.lock().unwrap().push(event.clone());
        Ok(true)
    }

    async fn count_finds_since(
        &self,
        actor: &str,
        since: OffsetDateTime,
    ) -> Result<u32, PersistenceError> {
        let count = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.actor == actor && e.found_at >= since)
            .count();
        Ok(count as u32)
    }

    async fn get_cursor(&self) -> Result<Option<OffsetDateTime>, PersistenceError> {
        Ok(*self.cursor.lock().unwrap())
    }

    async fn set_cursor(&self, at: OffsetDateTime) -> Result<(), PersistenceError> {
        self.write()?;
        *self.cursor.lock().unwrap() = Some(at);
        Ok(())
    }
}

/// Listing service double driven by mutable fixtures
#[derive(Default)]
pub struct FakeListingService {
    pub listings: Mutex<Vec<Listing>>,
    pub logs: Mutex<HashMap<String, Vec<LogEntry>>>,
    pub log_requests: Mutex<Vec<String>>,
    pub search_error: Mutex<Option<ListingError>>,
}

impl FakeListingService {
    pub fn set_listings(&self, listings: Vec<Listing>) {
        *self.listings.lock().unwrap() = listings;
    }

    pub fn set_log(&self, code: &str, actor: &str, note: &str) {
        self.logs.lock().unwrap().insert(
            code.to_string(),
            vec![LogEntry {
                actor: actor.to_string(),
                note: note.to_string(),
                entry_type: "Found it".to_string(),
                visited: None,
                coordinates: None,
            }],
        );
    }

    pub fn log_requests(&self) -> Vec<String> {
        self.log_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingService for FakeListingService {
    async fn authenticate(&self) -> Result<(), ListingError> {
        Ok(())
    }

    async fn search(&self, _query: &SearchQuery) -> Result<Vec<Listing>, ListingError> {
        if let Some(error) = self.search_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.listings.lock().unwrap().clone())
    }

    async fn fetch_log_entries(
        &self,
        listing: &mut Listing,
    ) -> Result<Vec<LogEntry>, ListingError> {
        self.log_requests.lock().unwrap().push(listing.code.clone());
        match self.logs.lock().unwrap().get(&listing.code) {
            Some(entries) => Ok(entries.clone()),
            None => Err(ListingError::ScrapeToken {
                kind: crate::ports::TokenKind::ItemGuid,
                context: listing.code.clone(),
            }),
        }
    }
}

/// Publisher that records announcements and can be told to fail
#[derive(Default)]
pub struct FakePublisher {
    pub published: Mutex<Vec<Announcement>>,
    pub failures: Mutex<VecDeque<PublishError>>,
}

impl FakePublisher {
    pub fn texts(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.text.clone())
            .collect()
    }

    pub fn fail_next(&self, error: PublishError) {
        self.failures.lock().unwrap().push_back(error);
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, announcement: &Announcement) -> Result<PublishResult, PublishError> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut published = self.published.lock().unwrap();
        published.push(announcement.clone());
        Ok(PublishResult {
            id: format!("post_{}", published.len()),
            url: None,
        })
    }

    fn platform(&self) -> &'static str {
        "fake"
    }
}
