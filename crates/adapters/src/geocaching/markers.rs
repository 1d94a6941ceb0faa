//! Extraction of the tokens the site embeds in its HTML pages
//!
//! Page text goes in, a typed token or a `ScrapeToken` error comes out.

use geofinds_domain::{ListingError, TokenKind};
use regex::Regex;
use std::sync::LazyLock;

static REQUEST_VERIFICATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="__RequestVerificationToken"\s+type="hidden"\s+value="([^"]+)""#)
        .expect("valid regex")
});

static ITEM_GUID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"guid='([a-f0-9-]+)';").expect("valid regex"));

static USER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"userToken = '([A-Z0-9]+)';").expect("valid regex"));

/// Text the sign-in response contains when the anti-forgery token was refused
const AUTH_REJECTED_MARKER: &str = "It seems your Anti-Forgery Token is invalid";

/// Page state only a signed-in session is served
static LOGGED_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""isLoggedIn"\s*:\s*true"#).expect("valid regex"));

fn pattern(kind: TokenKind) -> &'static Regex {
    match kind {
        TokenKind::RequestVerification => &REQUEST_VERIFICATION,
        TokenKind::ItemGuid => &ITEM_GUID,
        TokenKind::UserToken => &USER_TOKEN,
    }
}

/// Find the token of `kind` in `page`. `context` names the page for the error.
pub fn extract<'a>(kind: TokenKind, page: &'a str, context: &str) -> Result<&'a str, ListingError> {
    pattern(kind)
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| ListingError::ScrapeToken {
            kind,
            context: context.to_string(),
        })
}

pub fn is_auth_rejected(page: &str) -> bool {
    page.contains(AUTH_REJECTED_MARKER)
}

pub fn is_logged_in(page: &str) -> bool {
    LOGGED_IN.is_match(page)
}
