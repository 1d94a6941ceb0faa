//! Mastodon status publisher

use async_trait::async_trait;
use geofinds_domain::{Announcement, PublishError, PublishResult, Publisher};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Publishes announcements as public statuses on a Mastodon server
pub struct MastodonPublisher {
    client: Client,
    access_token: SecretString,
    server: String,
    max_chars: usize,
}

impl MastodonPublisher {
    pub fn new(
        access_token: SecretString,
        server: String,
        max_chars: usize,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PublishError::Api(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            access_token,
            server: server.trim_end_matches('/').to_string(),
            max_chars,
        })
    }
}

#[derive(Serialize)]
struct CreateStatusRequest<'a> {
    status: &'a str,
    visibility: &'a str,
}

#[derive(Deserialize)]
struct CreateStatusResponse {
    id: String,
    url: Option<String>,
}

#[async_trait]
impl Publisher for MastodonPublisher {
    async fn publish(&self, announcement: &Announcement) -> Result<PublishResult, PublishError> {
        let len = announcement.text.chars().count();
        if len > self.max_chars {
            return Err(PublishError::ContentTooLong {
                len,
                max: self.max_chars,
            });
        }

        let url = format!("{}/api/v1/statuses", self.server);
        let request = CreateStatusRequest {
            status: &announcement.text,
            visibility: "public",
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .header("Idempotency-Key", Uuid::new_v4().to_string())
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::Api(e.to_string()))?;

        if response.status() == 401 || response.status() == 403 {
            return Err(PublishError::Auth("Invalid access token".to_string()));
        }

        if response.status() == 429 {
            return Err(PublishError::RateLimited);
        }

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Api(format!(
                "Failed to create status: {}",
                body
            )));
        }

        let status: CreateStatusResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Api(e.to_string()))?;

        tracing::info!(code = %announcement.item_code, id = %status.id, "Published status");

        Ok(PublishResult {
            id: status.id,
            url: status.url,
        })
    }

    fn platform(&self) -> &'static str {
        "mastodon"
    }
}
