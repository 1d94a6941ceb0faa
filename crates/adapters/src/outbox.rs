//! Outbox publisher for require-approval mode.
//!
//! Announcements are appended as JSON lines for a human to review and post.

use async_trait::async_trait;
use geofinds_domain::model::Announcement;
use geofinds_domain::ports::{PublishError, PublishResult, Publisher};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct OutboxWriter {
    path: PathBuf,
    file: Arc<Mutex<tokio::fs::File>>,
}

impl OutboxWriter {
    pub async fn new(path: PathBuf) -> Result<Self, OutboxError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, entry: &OutboxEntry<'_>) -> Result<(), OutboxError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Publisher that queues announcements in a JSONL file instead of posting
#[derive(Debug, Clone)]
pub struct OutboxPublisher {
    writer: OutboxWriter,
    /// Platform the queued entries are intended for
    target: &'static str,
}

impl OutboxPublisher {
    pub fn new(writer: OutboxWriter, target: &'static str) -> Self {
        Self { writer, target }
    }
}

#[derive(Serialize)]
struct OutboxEntry<'a> {
    id: &'a str,
    target: &'a str,
    item_code: &'a str,
    item_url: &'a str,
    text: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    queued_at: OffsetDateTime,
}

#[async_trait]
impl Publisher for OutboxPublisher {
    async fn publish(&self, announcement: &Announcement) -> Result<PublishResult, PublishError> {
        let id = Uuid::new_v4().to_string();
        let entry = OutboxEntry {
            id: &id,
            target: self.target,
            item_code: &announcement.item_code,
            item_url: &announcement.item_url,
            text: &announcement.text,
            queued_at: OffsetDateTime::now_utc(),
        };

        self.writer
            .append(&entry)
            .await
            .map_err(|error| PublishError::Api(format!("Outbox write failed: {}", error)))?;

        tracing::info!(
            code = %announcement.item_code,
            path = %self.writer.path().display(),
            "Queued announcement in outbox"
        );

        Ok(PublishResult { id, url: None })
    }

    fn platform(&self) -> &'static str {
        "outbox"
    }
}
