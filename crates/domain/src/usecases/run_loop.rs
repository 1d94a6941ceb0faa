//! Run loop use case - drives one poll cycle: search, classify, announce, persist

use std::sync::Arc;
use time::{OffsetDateTime, UtcOffset};

use crate::{
    model::{
        Announcement, Classification, FindDetails, Listing, PendingChange, ProcessResult,
        SearchQuery,
    },
    ports::{ChangeStore, Clock, ListingError, ListingService, Publisher},
    usecases::{
        compose::{ComposeConfig, PostComposer},
        registry::ChangeRegistry,
    },
};

/// Configuration for the run loop
#[derive(Debug, Clone)]
pub struct RunLoopConfig {
    /// Geography to poll
    pub query: SearchQuery,
    /// Dry run mode (compose and log, but neither post nor persist)
    pub dry_run: bool,
    /// Fixed offset used for same-day boundaries
    pub utc_offset: UtcOffset,
    /// Compose config
    pub compose_config: ComposeConfig,
}

impl Default for RunLoopConfig {
    fn default() -> Self {
        Self {
            query: SearchQuery {
                latitude: 0.0,
                longitude: 0.0,
                radius_meters: 16_000,
                area_name: String::new(),
                ignore_premium: false,
            },
            dry_run: true,
            utc_offset: UtcOffset::UTC,
            compose_config: ComposeConfig::default(),
        }
    }
}

/// Run loop orchestrator
pub struct RunLoop<L, P, St, Cl>
where
    L: ListingService + ?Sized,
    P: Publisher + ?Sized,
    St: ChangeStore + ?Sized,
    Cl: Clock + ?Sized,
{
    listing_service: Arc<L>,
    publisher: Arc<P>,
    registry: ChangeRegistry<St, Cl>,
    composer: PostComposer,
    config: RunLoopConfig,
}

impl<L, P, St, Cl> RunLoop<L, P, St, Cl>
where
    L: ListingService + ?Sized,
    P: Publisher + ?Sized,
    St: ChangeStore + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(
        listing_service: Arc<L>,
        publisher: Arc<P>,
        state_store: Arc<St>,
        clock: Arc<Cl>,
        config: RunLoopConfig,
    ) -> Self {
        let mut compose_config = config.compose_config.clone();
        if compose_config.area_name.is_empty() {
            compose_config.area_name = config.query.area_name.clone();
        }

        Self {
            listing_service,
            publisher,
            registry: ChangeRegistry::new(state_store, clock, config.utc_offset),
            composer: PostComposer::new(compose_config),
            config,
        }
    }

    pub fn registry(&self) -> &ChangeRegistry<St, Cl> {
        &self.registry
    }

    /// Sign in once; failure here is fatal to the process
    pub async fn authenticate(&self) -> Result<(), RunLoopError> {
        self.listing_service
            .authenticate()
            .await
            .map_err(RunLoopError::Authentication)?;
        tracing::info!("Authenticated to listing service");
        Ok(())
    }

    /// Run a single poll cycle. Unchanged listings produce no result entry.
    pub async fn poll_once(&self) -> Result<Vec<(String, ProcessResult)>, RunLoopError> {
        let listings = self
            .listing_service
            .search(&self.config.query)
            .await
            .map_err(RunLoopError::Search)?;

        tracing::info!(
            area = %self.config.query.area_name,
            count = listings.len(),
            "Fetched listings"
        );

        let mut results = Vec::new();
        let mut unchanged = 0usize;

        // Listings are handled strictly in search order
        for listing in listings {
            let code = listing.code.clone();
            match self.process_listing(listing).await {
                Some(result) => results.push((code, result)),
                None => unchanged += 1,
            }
        }

        tracing::debug!(unchanged, changed = results.len(), "Classified listings");

        Ok(results)
    }

    /// Process one listing; `None` means nothing changed
    async fn process_listing(&self, mut listing: Listing) -> Option<ProcessResult> {
        let classification = match self.registry.classify(&listing).await {
            Ok(c) => c,
            Err(e) => {
                return Some(ProcessResult::Failed {
                    error: format!("Classification failed: {}", e),
                });
            }
        };

        match classification {
            Classification::NoChange => None,
            Classification::NewCache => {
                tracing::info!(code = %listing.code, name = %listing.name, "New cache");
                let change = self.registry.stage_new_cache(&listing);
                let announcement = self.composer.compose_new_cache(&listing);
                Some(self.announce(classification, announcement, change).await)
            }
            Classification::FoundUpdate { current, .. } => {
                tracing::info!(
                    code = %listing.code,
                    name = %listing.name,
                    last_activity = %current,
                    "Updated cache"
                );
                Some(
                    self.process_update(&mut listing, classification, current)
                        .await,
                )
            }
        }
    }

    async fn process_update(
        &self,
        listing: &mut Listing,
        classification: Classification,
        current: OffsetDateTime,
    ) -> ProcessResult {
        let entries = match self.listing_service.fetch_log_entries(listing).await {
            Ok(entries) => entries,
            Err(e @ ListingError::ScrapeToken { .. }) => {
                tracing::warn!(code = %listing.code, error = %e, "Listing inaccessible, skipping");
                return ProcessResult::Skipped {
                    reason: format!("Inaccessible: {}", e),
                };
            }
            Err(e) => {
                return ProcessResult::Failed {
                    error: format!("Log fetch failed: {}", e),
                };
            }
        };

        // Only the newest entry is reported, even if several arrived since the last poll
        let Some(entry) = entries.first() else {
            return ProcessResult::Failed {
                error: "No activity entries returned".to_string(),
            };
        };

        tracing::debug!(
            code = %listing.code,
            actor = %entry.actor,
            entry_type = %entry.entry_type,
            visited = ?entry.visited,
            coordinates = ?entry.coordinates,
            "Newest activity entry"
        );

        let (change, same_day_count) =
            match self.registry.stage_find(listing, current, entry).await {
                Ok(staged) => staged,
                Err(e) => {
                    return ProcessResult::Failed {
                        error: format!("Failed to count finds: {}", e),
                    };
                }
            };

        let find = FindDetails {
            actor: entry.actor.clone(),
            note: entry.note.clone(),
            same_day_count,
        };
        let announcement = self.composer.compose_find(listing, &find);

        self.announce(classification, announcement, change).await
    }

    /// Hand the announcement to the publisher, persisting only on success
    async fn announce(
        &self,
        classification: Classification,
        announcement: Announcement,
        change: PendingChange,
    ) -> ProcessResult {
        if self.config.dry_run {
            tracing::info!(
                code = %announcement.item_code,
                text = %announcement.text,
                "[DRY RUN] Would publish"
            );
            return ProcessResult::Skipped {
                reason: "Dry run".to_string(),
            };
        }

        let published = match self.publisher.publish(&announcement).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    code = %announcement.item_code,
                    platform = self.publisher.platform(),
                    error = %e,
                    "Failed to publish"
                );
                return ProcessResult::Failed {
                    error: format!("Publish failed: {}", e),
                };
            }
        };

        match self.registry.commit(&change).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(code = %change.code(), "State already advanced, nothing persisted");
            }
            Err(e) => {
                tracing::error!(code = %change.code(), error = %e, "Failed to persist state");
            }
        }

        ProcessResult::Announced {
            classification,
            post_id: Some(published.id),
        }
    }
}

/// Errors from the run loop
#[derive(Debug, thiserror::Error)]
pub enum RunLoopError {
    #[error("Authentication error: {0}")]
    Authentication(ListingError),
    #[error("Search error: {0}")]
    Search(ListingError),
}

impl RunLoopError {
    /// Whether the process should stop rather than wait for the next cycle
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Authentication(_) => true,
            Self::Search(e) => e.is_fatal(),
        }
    }
}
