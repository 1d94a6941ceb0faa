//! Mastodon publishing adapters

mod write;

pub use write::MastodonPublisher;

use async_trait::async_trait;
use geofinds_domain::{Announcement, PublishError, PublishResult, Publisher};
use std::sync::Mutex;

/// Stub publisher that records announcements instead of posting them
#[derive(Default)]
pub struct StubPublisher {
    published: Mutex<Vec<Announcement>>,
}

impl StubPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all announcements that were published
    pub fn get_published(&self) -> Vec<Announcement> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for StubPublisher {
    async fn publish(&self, announcement: &Announcement) -> Result<PublishResult, PublishError> {
        let mut published = self
            .published
            .lock()
            .map_err(|e| PublishError::Api(e.to_string()))?;
        published.push(announcement.clone());

        tracing::info!(code = %announcement.item_code, text = %announcement.text, "Stub publish");

        Ok(PublishResult {
            id: format!("stub_{}", published.len()),
            url: None,
        })
    }

    fn platform(&self) -> &'static str {
        "stub"
    }
}
