//! Change registry - classifies observed listings against persisted state
//!
//! Classification is derived purely from `CacheRecord` comparisons, so
//! observing an unchanged listing any number of times has no side effects.
//! Nothing is written until [`ChangeRegistry::commit`] is called, which the
//! run loop only does after the announcement was accepted.

use std::sync::Arc;
use time::{OffsetDateTime, Time, UtcOffset};

use crate::model::{CacheRecord, Classification, FindEvent, Listing, LogEntry, PendingChange};
use crate::ports::{ChangeStore, Clock, PersistenceError};

/// Start of the calendar day containing `now`, in the given fixed offset
pub fn local_midnight(now: OffsetDateTime, offset: UtcOffset) -> OffsetDateTime {
    now.to_offset(offset).replace_time(Time::MIDNIGHT)
}

/// Persisted classification state machine
pub struct ChangeRegistry<St, Cl>
where
    St: ChangeStore + ?Sized,
    Cl: Clock + ?Sized,
{
    store: Arc<St>,
    clock: Arc<Cl>,
    offset: UtcOffset,
}

impl<St, Cl> ChangeRegistry<St, Cl>
where
    St: ChangeStore + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(store: Arc<St>, clock: Arc<Cl>, offset: UtcOffset) -> Self {
        Self {
            store,
            clock,
            offset,
        }
    }

    /// Compare a listing with its stored record
    pub async fn classify(&self, listing: &Listing) -> Result<Classification, PersistenceError> {
        let Some(record) = self.store.get_cache(&listing.code).await? else {
            return Ok(Classification::NewCache);
        };

        match listing.last_activity_at {
            Some(current) if Some(current) > record.last_seen_at => {
                Ok(Classification::FoundUpdate {
                    previous: record.last_seen_at,
                    current,
                })
            }
            _ => Ok(Classification::NoChange),
        }
    }

    /// Prepare the record insert for a first-seen listing
    pub fn stage_new_cache(&self, listing: &Listing) -> PendingChange {
        PendingChange::NewCache(CacheRecord {
            code: listing.code.clone(),
            placed_at: listing.placed_at,
            last_seen_at: listing.last_activity_at,
        })
    }

    /// Prepare the journal entry for an update and compute the actor's
    /// same-day count as it will be once the entry is written.
    pub async fn stage_find(
        &self,
        listing: &Listing,
        current: OffsetDateTime,
        entry: &LogEntry,
    ) -> Result<(PendingChange, u32), PersistenceError> {
        let event = FindEvent {
            actor: entry.actor.clone(),
            found_at: current,
            item_code: listing.code.clone(),
            note: entry.note.clone(),
            entry_type: entry.entry_type.clone(),
        };

        let midnight = self.midnight();
        let existing = self.store.count_finds_since(&event.actor, midnight).await?;
        let count = existing + u32::from(event.found_at >= midnight);

        let change = PendingChange::FoundUpdate {
            code: listing.code.clone(),
            last_seen_at: current,
            event,
        };
        Ok((change, count))
    }

    /// Persist a staged change. Returns false if the store already held an
    /// equal or newer state for the code, in which case nothing was written.
    pub async fn commit(&self, change: &PendingChange) -> Result<bool, PersistenceError> {
        match change {
            PendingChange::NewCache(record) => self.store.insert_cache(record).await,
            PendingChange::FoundUpdate {
                code,
                last_seen_at,
                event,
            } => {
                let applied = self.store.record_find(code, *last_seen_at, event).await?;
                if applied {
                    self.advance_cursor(*last_seen_at).await;
                }
                Ok(applied)
            }
        }
    }

    /// Finds by `actor` since local midnight, as currently persisted
    pub async fn same_day_count(&self, actor: &str) -> Result<u32, PersistenceError> {
        self.store.count_finds_since(actor, self.midnight()).await
    }

    /// Stored cursor, or `default` (which is then stored) if none exists yet
    pub async fn last_announced(
        &self,
        default: OffsetDateTime,
    ) -> Result<OffsetDateTime, PersistenceError> {
        match self.store.get_cursor().await? {
            Some(at) => Ok(at),
            None => {
                self.store.set_cursor(default).await?;
                Ok(default)
            }
        }
    }

    fn midnight(&self) -> OffsetDateTime {
        local_midnight(self.clock.now(), self.offset)
    }

    async fn advance_cursor(&self, at: OffsetDateTime) {
        let result = match self.store.get_cursor().await {
            Ok(Some(existing)) if existing >= at => return,
            Ok(_) => self.store.set_cursor(at).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to advance announcement cursor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::fakes::{FakeClock, FakeStore, listing};
    use time::macros::{datetime, offset};

    const BRISBANE: UtcOffset = offset!(+10:00);

    fn registry(
        store: &Arc<FakeStore>,
        now: OffsetDateTime,
    ) -> ChangeRegistry<FakeStore, FakeClock> {
        ChangeRegistry::new(Arc::clone(store), Arc::new(FakeClock::at(now)), BRISBANE)
    }

    fn entry(actor: &str) -> LogEntry {
        LogEntry {
            actor: actor.to_string(),
            note: "TFTC".to_string(),
            entry_type: "Found it".to_string(),
            visited: None,
            coordinates: None,
        }
    }

    #[test]
    fn test_local_midnight_uses_fixed_offset() {
        // 20:00 UTC on the 1st is 06:00 on the 2nd in +10:00
        let now = datetime!(2023-03-01 20:00 UTC);
        let midnight = local_midnight(now, BRISBANE);
        assert_eq!(midnight, datetime!(2023-03-02 00:00 +10:00));
    }

    #[tokio::test]
    async fn test_unknown_code_is_new_cache_until_committed() {
        let store = Arc::new(FakeStore::default());
        let registry = registry(&store, datetime!(2023-03-02 12:00 +10:00));
        let gc = listing("GC123", Some(datetime!(2023-03-02 09:00 +10:00)));

        assert_eq!(
            registry.classify(&gc).await.unwrap(),
            Classification::NewCache
        );
        // Classification alone writes nothing
        assert_eq!(
            registry.classify(&gc).await.unwrap(),
            Classification::NewCache
        );
        assert_eq!(store.mutations(), 0);

        let change = registry.stage_new_cache(&gc);
        assert!(registry.commit(&change).await.unwrap());

        let record = store.get_cache("GC123").await.unwrap().unwrap();
        assert_eq!(record.last_seen_at, gc.last_activity_at);
        assert_eq!(
            registry.classify(&gc).await.unwrap(),
            Classification::NoChange
        );
    }

    #[tokio::test]
    async fn test_strictly_later_activity_is_found_update() {
        let store = Arc::new(FakeStore::default());
        let registry = registry(&store, datetime!(2023-03-02 12:00 +10:00));
        let mut gc = listing("GC123", Some(datetime!(2023-03-02 09:00 +10:00)));
        registry
            .commit(&registry.stage_new_cache(&gc))
            .await
            .unwrap();

        gc.last_activity_at = Some(datetime!(2023-03-02 10:00 +10:00));
        let classification = registry.classify(&gc).await.unwrap();
        assert_eq!(
            classification,
            Classification::FoundUpdate {
                previous: Some(datetime!(2023-03-02 09:00 +10:00)),
                current: datetime!(2023-03-02 10:00 +10:00),
            }
        );

        let (change, count) = registry
            .stage_find(&gc, datetime!(2023-03-02 10:00 +10:00), &entry("Amy"))
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert!(registry.commit(&change).await.unwrap());

        let record = store.get_cache("GC123").await.unwrap().unwrap();
        assert_eq!(record.last_seen_at, Some(datetime!(2023-03-02 10:00 +10:00)));
        assert_eq!(registry.same_day_count("Amy").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_equal_or_earlier_activity_is_no_change() {
        let store = Arc::new(FakeStore::default());
        let registry = registry(&store, datetime!(2023-03-02 12:00 +10:00));
        let mut gc = listing("GC123", Some(datetime!(2023-03-02 09:00 +10:00)));
        registry
            .commit(&registry.stage_new_cache(&gc))
            .await
            .unwrap();
        let before = store.mutations();

        assert_eq!(
            registry.classify(&gc).await.unwrap(),
            Classification::NoChange
        );
        gc.last_activity_at = Some(datetime!(2023-03-01 09:00 +10:00));
        assert_eq!(
            registry.classify(&gc).await.unwrap(),
            Classification::NoChange
        );
        gc.last_activity_at = None;
        assert_eq!(
            registry.classify(&gc).await.unwrap(),
            Classification::NoChange
        );
        assert_eq!(store.mutations(), before);
    }

    #[tokio::test]
    async fn test_first_activity_on_never_found_item_is_update() {
        let store = Arc::new(FakeStore::default());
        let registry = registry(&store, datetime!(2023-03-02 12:00 +10:00));
        let mut gc = listing("GC777", None);
        registry
            .commit(&registry.stage_new_cache(&gc))
            .await
            .unwrap();

        gc.last_activity_at = Some(datetime!(2023-03-02 11:00 +10:00));
        assert!(matches!(
            registry.classify(&gc).await.unwrap(),
            Classification::FoundUpdate { previous: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_stale_commit_is_rejected() {
        let store = Arc::new(FakeStore::default());
        let registry = registry(&store, datetime!(2023-03-02 12:00 +10:00));
        let gc = listing("GC123", Some(datetime!(2023-03-02 10:00 +10:00)));
        registry
            .commit(&registry.stage_new_cache(&gc))
            .await
            .unwrap();

        let (change, _) = registry
            .stage_find(&gc, datetime!(2023-03-02 10:00 +10:00), &entry("Amy"))
            .await
            .unwrap();
        assert!(!registry.commit(&change).await.unwrap());
        assert_eq!(registry.same_day_count("Amy").await.unwrap(), 0);

        // A second insert of the same code is also a no-op
        assert!(
            !registry
                .commit(&registry.stage_new_cache(&gc))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_same_day_count_resets_after_midnight() {
        let store = Arc::new(FakeStore::default());
        let day_one = registry(&store, datetime!(2023-03-02 22:00 +10:00));
        let mut gc = listing("GC1", Some(datetime!(2023-03-02 08:00 +10:00)));
        day_one
            .commit(&day_one.stage_new_cache(&gc))
            .await
            .unwrap();

        for hour in [9, 10, 11] {
            let at = datetime!(2023-03-02 00:00 +10:00) + time::Duration::hours(hour);
            gc.last_activity_at = Some(at);
            let (change, count) = day_one.stage_find(&gc, at, &entry("Amy")).await.unwrap();
            assert_eq!(count, (hour - 8) as u32);
            day_one.commit(&change).await.unwrap();
        }
        assert_eq!(day_one.same_day_count("Amy").await.unwrap(), 3);

        let day_two = registry(&store, datetime!(2023-03-03 07:00 +10:00));
        assert_eq!(day_two.same_day_count("Amy").await.unwrap(), 0);

        let at = datetime!(2023-03-03 06:30 +10:00);
        let (_, count) = day_two.stage_find(&gc, at, &entry("Amy")).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_find_from_before_midnight_is_not_counted_today() {
        let store = Arc::new(FakeStore::default());
        let registry = registry(&store, datetime!(2023-03-03 01:00 +10:00));
        let gc = listing("GC1", Some(datetime!(2023-03-02 23:30 +10:00)));

        let (_, count) = registry
            .stage_find(&gc, datetime!(2023-03-02 23:30 +10:00), &entry("Amy"))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_cursor_defaults_and_only_moves_forward() {
        let store = Arc::new(FakeStore::default());
        let registry = registry(&store, datetime!(2023-03-02 12:00 +10:00));
        let default = datetime!(2023-03-01 00:00 +10:00);

        assert_eq!(registry.last_announced(default).await.unwrap(), default);
        // Stored default wins over a new default
        assert_eq!(
            registry
                .last_announced(datetime!(2024-01-01 00:00 UTC))
                .await
                .unwrap(),
            default
        );

        let mut gc = listing("GC1", Some(datetime!(2023-03-02 08:00 +10:00)));
        registry
            .commit(&registry.stage_new_cache(&gc))
            .await
            .unwrap();
        gc.last_activity_at = Some(datetime!(2023-03-02 09:00 +10:00));
        let (change, _) = registry
            .stage_find(&gc, datetime!(2023-03-02 09:00 +10:00), &entry("Amy"))
            .await
            .unwrap();
        registry.commit(&change).await.unwrap();
        assert_eq!(
            store.get_cursor().await.unwrap(),
            Some(datetime!(2023-03-02 09:00 +10:00))
        );

        store
            .set_cursor(datetime!(2023-03-05 00:00 +10:00))
            .await
            .unwrap();
        gc.last_activity_at = Some(datetime!(2023-03-02 10:00 +10:00));
        let (change, _) = registry
            .stage_find(&gc, datetime!(2023-03-02 10:00 +10:00), &entry("Amy"))
            .await
            .unwrap();
        registry.commit(&change).await.unwrap();
        assert_eq!(
            store.get_cursor().await.unwrap(),
            Some(datetime!(2023-03-05 00:00 +10:00))
        );
    }
}
