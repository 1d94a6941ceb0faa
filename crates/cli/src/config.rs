//! Configuration loading and management

use anyhow::{Context, Result};
use geofinds_domain::usecases::ComposeConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::UtcOffset;
use time::macros::format_description;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub geocaching: GeocachingConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub post: PostConfig,

    #[serde(default)]
    pub mastodon: MastodonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// `sqlite` (default) or `memory`, which forgets everything on exit
    #[serde(default = "default_state_backend")]
    pub state_backend: String,

    #[serde(default = "default_state_db_path")]
    pub state_db_path: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_latitude")]
    pub latitude: f64,

    #[serde(default = "default_longitude")]
    pub longitude: f64,

    #[serde(default = "default_radius_meters")]
    pub radius_meters: u32,

    #[serde(default = "default_area_name")]
    pub area_name: String,

    #[serde(default)]
    pub ignore_premium: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocachingConfig {
    /// `site` (default) scrapes the website; `stub` serves `stub_fixture` offline
    #[serde(default = "default_provider")]
    pub provider: String,

    /// JSON file of listings and log entries for the `stub` provider
    #[serde(default)]
    pub stub_fixture: Option<PathBuf>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_username_env")]
    pub username_env: String,

    #[serde(default = "default_password_env")]
    pub password_env: String,

    #[serde(default)]
    pub unthrottle: bool,

    #[serde(default)]
    pub proxy_url: Option<String>,

    /// Fixed offset the site's timestamps and day boundaries are in
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_poll_jitter")]
    pub poll_jitter_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_hashtag")]
    pub hashtag: String,

    #[serde(default = "default_base_url")]
    pub site_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub server: String,

    #[serde(default = "default_mastodon_token_env")]
    pub access_token_env: String,
}

// Default value functions
fn default_state_backend() -> String {
    "sqlite".to_string()
}

fn default_provider() -> String {
    "site".to_string()
}

fn default_state_db_path() -> PathBuf {
    PathBuf::from("./geofinds.sqlite")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_latitude() -> f64 {
    -27.46794
}

fn default_longitude() -> f64 {
    153.02809
}

fn default_radius_meters() -> u32 {
    16_000
}

fn default_area_name() -> String {
    "Brisbane".to_string()
}

fn default_base_url() -> String {
    "https://www.geocaching.com".to_string()
}

fn default_username_env() -> String {
    "GEOCACHING_CLIENT_ID".to_string()
}

fn default_password_env() -> String {
    "GEOCACHING_CLIENT_SECRET".to_string()
}

fn default_utc_offset() -> String {
    "+10:00".to_string()
}

fn default_poll_interval() -> u64 {
    300
}

fn default_poll_jitter() -> u64 {
    60
}

fn default_max_chars() -> usize {
    500
}

fn default_hashtag() -> String {
    "#geocaching".to_string()
}

fn default_mastodon_token_env() -> String {
    "MASTODON_ACCESS_TOKEN".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            state_backend: default_state_backend(),
            state_db_path: default_state_db_path(),
            log_level: default_log_level(),
            dry_run: default_true(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
            radius_meters: default_radius_meters(),
            area_name: default_area_name(),
            ignore_premium: false,
        }
    }
}

impl Default for GeocachingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            stub_fixture: None,
            base_url: default_base_url(),
            username_env: default_username_env(),
            password_env: default_password_env(),
            unthrottle: false,
            proxy_url: None,
            utc_offset: default_utc_offset(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            poll_jitter_secs: default_poll_jitter(),
        }
    }
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            hashtag: default_hashtag(),
            site_url: default_base_url(),
        }
    }
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: String::new(),
            access_token_env: default_mastodon_token_env(),
        }
    }
}

impl GeocachingConfig {
    /// Parse `utc_offset`, e.g. `+10:00` or `-03:30`
    pub fn offset(&self) -> Result<UtcOffset> {
        let format = format_description!("[offset_hour sign:mandatory]:[offset_minute]");
        UtcOffset::parse(self.utc_offset.trim(), format)
            .with_context(|| format!("Invalid utc_offset: {}", self.utc_offset))
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            anyhow::bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("GEOFINDS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings that would break the run at its first announcement
    pub fn validate(&self) -> Result<()> {
        self.compose_config()
            .validate()
            .context("Invalid [post] settings")?;
        Ok(())
    }

    /// Composer settings for the configured area and post limits
    pub fn compose_config(&self) -> ComposeConfig {
        ComposeConfig {
            max_chars: self.post.max_chars,
            hashtag: self.post.hashtag.clone(),
            site_url: self.post.site_url.clone(),
            area_name: self.search.area_name.clone(),
        }
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r##"# geofinds configuration
#
# Credentials never go in this file: each *_env key names the environment
# variable holding the secret.

[general]
# "sqlite", or "memory" for throwaway runs
state_backend = "sqlite"
state_db_path = "./geofinds.sqlite"
log_level = "info"
# Compose and log announcements without posting or saving state
dry_run = true

[search]
latitude = -27.46794
longitude = 153.02809
radius_meters = 16000
area_name = "Brisbane"
# Premium-only listings cannot be read by basic members
ignore_premium = false

[geocaching]
# "site" scrapes the website; "stub" serves stub_fixture without network access
provider = "site"
# stub_fixture = "./fixture.json"
base_url = "https://www.geocaching.com"
username_env = "GEOCACHING_CLIENT_ID"
password_env = "GEOCACHING_CLIENT_SECRET"
# Disables the one-request-per-second limit and randomized pauses
unthrottle = false
# proxy_url = "http://127.0.0.1:8080"
utc_offset = "+10:00"

[watch]
poll_interval_secs = 300
# Up to this many extra seconds are added to each interval
poll_jitter_secs = 60

[post]
max_chars = 500
hashtag = "#geocaching"
site_url = "https://www.geocaching.com"

[mastodon]
enabled = false
server = "https://mastodon.social"
access_token_env = "MASTODON_ACCESS_TOKEN"
"##
        .to_string()
    }
}
