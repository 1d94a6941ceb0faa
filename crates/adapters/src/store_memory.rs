//! In-memory change store for testing and throwaway runs

use async_trait::async_trait;
use geofinds_domain::{CacheRecord, ChangeStore, FindEvent, PersistenceError};
use std::collections::HashMap;
use std::sync::RwLock;
use time::OffsetDateTime;

fn lock_err<T>(e: std::sync::PoisonError<T>) -> PersistenceError {
    PersistenceError::Database(e.to_string())
}

/// In-memory change store implementation
#[derive(Default)]
pub struct InMemoryChangeStore {
    caches: RwLock<HashMap<String, CacheRecord>>,
    finds: RwLock<Vec<FindEvent>>,
    cursor: RwLock<Option<OffsetDateTime>>,
}

impl InMemoryChangeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChangeStore for InMemoryChangeStore {
    async fn get_cache(&self, code: &str) -> Result<Option<CacheRecord>, PersistenceError> {
        let caches = self.caches.read().map_err(lock_err)?;
        Ok(caches.get(code).cloned())
    }

    async fn insert_cache(&self, record: &CacheRecord) -> Result<bool, PersistenceError> {
        let mut caches = self.caches.write().map_err(lock_err)?;
        if caches.contains_key(&record.code) {
            return Ok(false);
        }
        caches.insert(record.code.clone(), record.clone());
        Ok(true)
    }

    async fn record_find(
        &self,
        code: &str,
        last_seen_at: OffsetDateTime,
        event: &FindEvent,
    ) -> Result<bool, PersistenceError> {
        // Both locks are held so the record and journal move together
        let mut caches = self.caches.write().map_err(lock_err)?;
        let mut finds = self.finds.write().map_err(lock_err)?;

        let Some(record) = caches.get_mut(code) else {
            return Ok(false);
        };
        if record
            .last_seen_at
            .is_some_and(|stored| stored >= last_seen_at)
        {
            return Ok(false);
        }

        record.last_seen_at = Some(last_seen_at);
        finds.push(event.clone());
        Ok(true)
    }

    async fn count_finds_since(
        &self,
        actor: &str,
        since: OffsetDateTime,
    ) -> Result<u32, PersistenceError> {
        let finds = self.finds.read().map_err(lock_err)?;
        let count = finds
            .iter()
            .filter(|e| e.actor == actor && e.found_at >= since)
            .count();
        Ok(count as u32)
    }

    async fn get_cursor(&self) -> Result<Option<OffsetDateTime>, PersistenceError> {
        Ok(*self.cursor.read().map_err(lock_err)?)
    }

    async fn set_cursor(&self, at: OffsetDateTime) -> Result<(), PersistenceError> {
        *self.cursor.write().map_err(lock_err)? = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_memory_store_guards_record_find() {
        let store = InMemoryChangeStore::new();
        let t0 = datetime!(2023-03-02 09:00 UTC);
        let t1 = datetime!(2023-03-02 10:00 UTC);
        let record = CacheRecord {
            code: "GC1".to_string(),
            placed_at: None,
            last_seen_at: Some(t0),
        };
        let event = FindEvent {
            actor: "Amy".to_string(),
            found_at: t1,
            item_code: "GC1".to_string(),
            note: String::new(),
            entry_type: "Found it".to_string(),
        };

        assert!(store.insert_cache(&record).await.unwrap());
        assert!(!store.insert_cache(&record).await.unwrap());
        assert!(!store.record_find("GC1", t0, &event).await.unwrap());
        assert!(store.record_find("GC1", t1, &event).await.unwrap());
        assert!(!store.record_find("GC1", t1, &event).await.unwrap());

        assert_eq!(store.count_finds_since("Amy", t0).await.unwrap(), 1);
        assert_eq!(
            store.get_cache("GC1").await.unwrap().unwrap().last_seen_at,
            Some(t1)
        );
    }

    #[tokio::test]
    async fn test_memory_store_cursor() {
        let store = InMemoryChangeStore::new();
        assert!(store.get_cursor().await.unwrap().is_none());
        store.set_cursor(datetime!(2023-03-02 09:00 UTC)).await.unwrap();
        assert_eq!(
            store.get_cursor().await.unwrap(),
            Some(datetime!(2023-03-02 09:00 UTC))
        );
    }
}
