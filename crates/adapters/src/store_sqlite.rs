//! SQLite change store implementation
//!
//! Timestamps are stored as unix seconds so range comparisons happen in SQL.

use async_trait::async_trait;
use geofinds_domain::{CacheRecord, ChangeStore, FindEvent, PersistenceError};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use time::OffsetDateTime;
use uuid::Uuid;

/// Row counts reported by `doctor`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub caches: i64,
    pub finds: i64,
}

/// SQLite-backed change store
pub struct SqliteChangeStore {
    pool: SqlitePool,
}

fn db_err(e: sqlx::Error) -> PersistenceError {
    PersistenceError::Database(e.to_string())
}

fn to_unix(at: OffsetDateTime) -> i64 {
    at.unix_timestamp()
}

fn from_unix(secs: i64) -> Result<OffsetDateTime, PersistenceError> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| PersistenceError::Serialization(e.to_string()))
}

fn from_unix_opt(secs: Option<i64>) -> Result<Option<OffsetDateTime>, PersistenceError> {
    secs.map(from_unix).transpose()
}

impl SqliteChangeStore {
    /// Open (or create) the database at `db_path` and initialize the schema
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let db_path = db_path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PersistenceError::Database(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, PersistenceError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_records (
                code TEXT PRIMARY KEY,
                placed_at INTEGER,
                last_seen_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS find_events (
                id TEXT PRIMARY KEY,
                actor TEXT NOT NULL,
                found_at INTEGER NOT NULL,
                item_code TEXT NOT NULL,
                note TEXT NOT NULL,
                entry_type TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        // Same-day counts filter by actor and time
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_find_events_actor
            ON find_events(actor, found_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS announce_cursor (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_announced INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Number of known items and journaled finds
    pub async fn stats(&self) -> Result<StoreStats, PersistenceError> {
        let caches: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_records")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let finds: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM find_events")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(StoreStats {
            caches: caches.0,
            finds: finds.0,
        })
    }
}

#[async_trait]
impl ChangeStore for SqliteChangeStore {
    async fn get_cache(&self, code: &str) -> Result<Option<CacheRecord>, PersistenceError> {
        let row: Option<(String, Option<i64>, Option<i64>)> = sqlx::query_as(
            "SELECT code, placed_at, last_seen_at FROM cache_records WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some((code, placed_at, last_seen_at)) => Ok(Some(CacheRecord {
                code,
                placed_at: from_unix_opt(placed_at)?,
                last_seen_at: from_unix_opt(last_seen_at)?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_cache(&self, record: &CacheRecord) -> Result<bool, PersistenceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO cache_records (code, placed_at, last_seen_at)
            VALUES (?, ?, ?)
            ON CONFLICT(code) DO NOTHING
            "#,
        )
        .bind(&record.code)
        .bind(record.placed_at.map(to_unix))
        .bind(record.last_seen_at.map(to_unix))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_find(
        &self,
        code: &str,
        last_seen_at: OffsetDateTime,
        event: &FindEvent,
    ) -> Result<bool, PersistenceError> {
        let seen = to_unix(last_seen_at);
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let updated = sqlx::query(
            r#"
            UPDATE cache_records SET last_seen_at = ?
            WHERE code = ? AND (last_seen_at IS NULL OR last_seen_at < ?)
            "#,
        )
        .bind(seen)
        .bind(code)
        .bind(seen)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO find_events (id, actor, found_at, item_code, note, entry_type)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&event.actor)
        .bind(to_unix(event.found_at))
        .bind(&event.item_code)
        .bind(&event.note)
        .bind(&event.entry_type)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn count_finds_since(
        &self,
        actor: &str,
        since: OffsetDateTime,
    ) -> Result<u32, PersistenceError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM find_events WHERE actor = ? AND found_at >= ?")
                .bind(actor)
                .bind(to_unix(since))
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        u32::try_from(count.0).map_err(|e| PersistenceError::Serialization(e.to_string()))
    }

    async fn get_cursor(&self) -> Result<Option<OffsetDateTime>, PersistenceError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_announced FROM announce_cursor WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(|(secs,)| from_unix(secs)).transpose()
    }

    async fn set_cursor(&self, at: OffsetDateTime) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO announce_cursor (id, last_announced)
            VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE SET last_announced = excluded.last_announced
            "#,
        )
        .bind(to_unix(at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
