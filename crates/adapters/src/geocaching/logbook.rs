//! Activity-log retrieval: detail page GUID, bootstrap user token, log data

use geofinds_domain::{Listing, ListingError, LogEntry, TokenKind};
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

use super::markers;
use super::sanitize::sanitize_note;
use super::session::Session;
use super::wire::{LogbookEntry, LogbookResponse};

/// Most recent entries requested per item
pub const LOG_PAGE_SIZE: u32 = 10;

/// Scrape the per-item GUID from the detail page
pub async fn resolve_guid(session: &Session, code: &str) -> Result<String, ListingError> {
    let page = session
        .get_text(
            "item detail",
            &session.url(&format!("/geocache/{}", code)),
            &[],
            "text/html",
        )
        .await?;

    let guid = markers::extract(TokenKind::ItemGuid, &page, code)?;
    Ok(guid.to_string())
}

async fn user_token(session: &Session, code: &str, guid: &str) -> Result<String, ListingError> {
    let page = session
        .get_text(
            "logbook bootstrap",
            &session.url("/seek/geocache_logs.aspx"),
            &[("guid", guid.to_string())],
            "text/html",
        )
        .await?;

    let token = markers::extract(TokenKind::UserToken, &page, code)?;
    Ok(token.to_string())
}

/// Parse a visit date into local midnight.
///
/// The site renders these in the account's date-format preference, so only
/// the default month-first form (`3/16/2023`) and ISO dates are recognised.
/// Anything else yields `None`.
pub fn parse_visit_date(raw: &str, offset: UtcOffset) -> Option<OffsetDateTime> {
    let month_first = format_description!("[month padding:none]/[day padding:none]/[year]");
    let iso = format_description!("[year]-[month]-[day]");
    let raw = raw.trim();

    Date::parse(raw, month_first)
        .or_else(|_| Date::parse(raw.get(..10).unwrap_or(raw), iso))
        .ok()
        .map(|date| date.midnight().assume_offset(offset))
}

fn to_entry(raw: LogbookEntry, offset: UtcOffset) -> LogEntry {
    LogEntry {
        coordinates: raw.coordinates(),
        visited: raw
            .visited
            .as_deref()
            .and_then(|v| parse_visit_date(v, offset)),
        actor: raw.user_name,
        note: sanitize_note(&raw.log_text),
        entry_type: raw.log_type,
    }
}

/// Fetch the newest entries for `listing`, resolving its GUID first if needed
pub async fn fetch_entries(
    session: &Session,
    listing: &mut Listing,
    offset: UtcOffset,
) -> Result<Vec<LogEntry>, ListingError> {
    session.limiter().pause(3..=7).await;

    let guid = match listing.guid.clone() {
        Some(guid) => guid,
        None => {
            let guid = resolve_guid(session, &listing.code).await?;
            listing.guid = Some(guid.clone());
            guid
        }
    };

    let token = user_token(session, &listing.code, &guid).await?;

    let params = [
        ("tkn", token),
        ("idx", "1".to_string()),
        ("num", LOG_PAGE_SIZE.to_string()),
        ("sp", "false".to_string()),
        ("sf", "false".to_string()),
        ("decrypt", "false".to_string()),
    ];
    let response: LogbookResponse = session
        .get_json(
            "logbook data",
            &session.url("/seek/geocache.logbook"),
            &params,
        )
        .await?;

    tracing::debug!(
        code = %listing.code,
        status = %response.status,
        entries = response.data.len(),
        newest_log_id = response.data.first().map(|e| e.log_id),
        "Fetched logbook"
    );

    Ok(response
        .data
        .into_iter()
        .map(|raw| to_entry(raw, offset))
        .collect())
}
