//! Paginated area search

use geofinds_domain::{Listing, ListingError, SearchQuery};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use super::session::Session;
use super::wire::{SearchResponse, SearchResult};

/// Results requested per page
pub const PAGE_SIZE: usize = 500;

/// Most follow-up pages a single search may issue
pub const MAX_EXTRA_PAGES: usize = 10;

/// Parse a site timestamp such as `2023-01-29T10:08:20`, which carries no
/// offset of its own. Fractional seconds are ignored.
pub fn parse_site_time(raw: &str, offset: UtcOffset) -> Option<OffsetDateTime> {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let trimmed = raw.trim();
    let seconds_precision = trimmed.get(..19).unwrap_or(trimmed);

    PrimitiveDateTime::parse(seconds_precision, format)
        .ok()
        .map(|dt| dt.assume_offset(offset))
}

fn to_listing(result: SearchResult, offset: UtcOffset) -> Listing {
    let parse = |raw: &Option<String>| raw.as_deref().and_then(|s| parse_site_time(s, offset));

    Listing {
        placed_at: parse(&result.placed_date),
        last_activity_at: parse(&result.last_found_date),
        code: result.code,
        name: result.name,
        owner: result.owner.username,
        premium_only: result.premium_only,
        detail_path: result.details_url,
        guid: None,
    }
}

/// Follow-up pages needed after the first one for `total` results
fn extra_pages(total: usize) -> usize {
    total.saturating_sub(PAGE_SIZE).div_ceil(PAGE_SIZE)
}

async fn fetch_page(
    session: &Session,
    query: &SearchQuery,
    skip: usize,
) -> Result<SearchResponse, ListingError> {
    let params = [
        ("skip", skip.to_string()),
        ("take", PAGE_SIZE.to_string()),
        ("asc", "true".to_string()),
        // Any other sort order is a premium feature
        ("sort", "distance".to_string()),
        ("properties", "callernote".to_string()),
        (
            "origin",
            format!("{:.6},{:.6}", query.latitude, query.longitude),
        ),
        ("rad", query.radius_meters.to_string()),
        ("oid", "3356".to_string()),
        ("ot", "city".to_string()),
    ];

    session
        .get_json(
            "search page",
            &session.url("/api/proxy/web/search/v2"),
            &params,
        )
        .await
}

/// Retrieve every listing matching `query`, in the order the site returned them
pub async fn search_all(
    session: &Session,
    query: &SearchQuery,
    offset: UtcOffset,
) -> Result<Vec<Listing>, ListingError> {
    let first = fetch_page(session, query, 0).await?;
    let total = first.total;

    let pages = extra_pages(total);
    if pages > MAX_EXTRA_PAGES {
        return Err(ListingError::SanityLimitExceeded {
            pages,
            limit: MAX_EXTRA_PAGES,
        });
    }

    let mut results = first.results;
    for page in 1..=pages {
        session.limiter().pause(2..=5).await;

        let next = fetch_page(session, query, page * PAGE_SIZE).await?;
        if next.results.is_empty() {
            break;
        }
        results.extend(next.results);
    }

    if results.len() != total {
        // Items move in and out of the radius between page requests
        tracing::warn!(total, fetched = results.len(), "Search total drifted while paging");
    } else {
        tracing::debug!(total, fetched = results.len(), "Search complete");
    }

    let listings = results
        .into_iter()
        .map(|r| to_listing(r, offset))
        .filter(|l| !(query.ignore_premium && l.premium_only))
        .collect();

    Ok(listings)
}
