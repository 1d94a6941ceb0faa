//! Wire payloads returned by the listing site
//!
//! Only the fields the poller reads are modelled; everything else is ignored.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub total: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResult {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub premium_only: bool,
    #[serde(default)]
    pub details_url: String,
    pub placed_date: Option<String>,
    pub last_found_date: Option<String>,
    #[serde(default)]
    pub owner: Owner,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Owner {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogbookResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub data: Vec<LogbookEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct LogbookEntry {
    #[serde(rename = "LogID", default)]
    pub log_id: i64,
    #[serde(default)]
    pub log_type: String,
    #[serde(default)]
    pub log_text: String,
    #[serde(default)]
    pub user_name: String,
    pub visited: Option<String>,
    #[serde(default)]
    pub latitude: Coordinate,
    #[serde(default)]
    pub longitude: Coordinate,
}

/// A coordinate field the site sends as a number, a string, or not at all
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Coordinate {
    Numeric(f64),
    Textual(String),
    #[default]
    Absent,
}

impl Coordinate {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => Some(*v),
            Self::Textual(s) => s.trim().parse().ok(),
            Self::Absent => None,
        }
    }
}

impl LogbookEntry {
    /// Both coordinates, if both are present and usable
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude.value()?, self.longitude.value()?))
    }
}
