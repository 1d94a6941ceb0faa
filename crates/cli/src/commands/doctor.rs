//! Doctor command - validate configuration and show status

use anyhow::Result;
use geofinds_adapters::store::SqliteChangeStore;
use geofinds_domain::ChangeStore;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::args::DoctorArgs;
use crate::commands::env_is_set;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    search: CheckResult,
    geocaching: CheckResult,
    store: CheckResult,
    publisher: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        search: CheckResult::error("Not checked"),
        geocaching: CheckResult::error("Not checked"),
        store: CheckResult::error("Not checked"),
        publisher: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    // Check config
    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.search = check_search(config);
        report.geocaching = check_geocaching(config);
        report.store = check_state(config).await;
        report.publisher = check_publisher(config);
    }

    // Determine overall status
    let checks = [
        &report.config,
        &report.search,
        &report.geocaching,
        &report.store,
        &report.publisher,
    ];

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    // Output report
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

fn check_search(config: &AppConfig) -> CheckResult {
    let search = &config.search;

    if !(-90.0..=90.0).contains(&search.latitude) || !(-180.0..=180.0).contains(&search.longitude)
    {
        return CheckResult::error(format!(
            "Coordinates out of range: {}, {}",
            search.latitude, search.longitude
        ));
    }

    if search.radius_meters == 0 {
        return CheckResult::error("radius_meters must be greater than zero");
    }

    if search.area_name.trim().is_empty() {
        return CheckResult::warn("area_name is empty; announcements will read \"In ,\"");
    }

    CheckResult::ok(format!(
        "{} ({:.5}, {:.5}), radius {} m{}",
        search.area_name,
        search.latitude,
        search.longitude,
        search.radius_meters,
        if search.ignore_premium {
            ", premium excluded"
        } else {
            ""
        }
    ))
}

fn check_geocaching(config: &AppConfig) -> CheckResult {
    let geocaching = &config.geocaching;

    if let Err(e) = geocaching.offset() {
        return CheckResult::error(format!("{:#}", e));
    }

    match geocaching.provider.as_str() {
        "site" => {}
        "stub" => {
            return match &geocaching.stub_fixture {
                Some(path) if !path.exists() => {
                    CheckResult::error(format!("Stub fixture not found: {}", path.display()))
                }
                Some(path) => CheckResult::warn(format!(
                    "Stub provider serving {} (no network access)",
                    path.display()
                )),
                None => CheckResult::warn("Stub provider with no fixture: searches return nothing"),
            };
        }
        other => {
            return CheckResult::error(format!(
                "Unknown provider: {} (expected site or stub)",
                other
            ));
        }
    }

    let username_set = env_is_set(&geocaching.username_env);
    let password_set = env_is_set(&geocaching.password_env);
    let details = serde_json::json!({
        "base_url": geocaching.base_url,
        "proxy": geocaching.proxy_url.is_some(),
        "unthrottle": geocaching.unthrottle,
        "utc_offset": geocaching.utc_offset,
    });

    let describe = |env: &str, set: bool| format!("{} ({})", env, if set { "set" } else { "not set" });
    let message = format!(
        "Username: {}, Password: {}",
        describe(&geocaching.username_env, username_set),
        describe(&geocaching.password_env, password_set)
    );

    if username_set && password_set {
        CheckResult::ok(message).with_details(details)
    } else {
        CheckResult::warn(message).with_details(details)
    }
}

async fn check_state(config: &AppConfig) -> CheckResult {
    match config.general.state_backend.as_str() {
        "sqlite" => check_store(&config.general.state_db_path).await,
        "memory" => CheckResult::warn("In-memory state store: nothing survives a restart"),
        other => CheckResult::error(format!(
            "Unknown state backend: {} (expected sqlite or memory)",
            other
        )),
    }
}

async fn check_store(path: &Path) -> CheckResult {
    if !path.exists() {
        return CheckResult::warn(format!(
            "State database will be created on first run: {}",
            path.display()
        ));
    }

    let store = match SqliteChangeStore::new(path).await {
        Ok(s) => s,
        Err(e) => return CheckResult::error(format!("Failed to open state database: {}", e)),
    };

    let stats = match store.stats().await {
        Ok(s) => s,
        Err(e) => return CheckResult::error(format!("Failed to read state database: {}", e)),
    };

    let cursor = match store.get_cursor().await {
        Ok(c) => c,
        Err(e) => return CheckResult::error(format!("Failed to read cursor: {}", e)),
    };

    CheckResult::ok(format!(
        "{} caches known, {} finds recorded",
        stats.caches, stats.finds
    ))
    .with_details(serde_json::json!({
        "path": path.display().to_string(),
        "caches": stats.caches,
        "finds": stats.finds,
        "last_announced": cursor.map(|c| c.to_string()),
    }))
}

fn check_publisher(config: &AppConfig) -> CheckResult {
    let mastodon = &config.mastodon;

    if !mastodon.enabled {
        return if config.general.dry_run {
            CheckResult::ok("Mastodon disabled (dry run)")
        } else {
            CheckResult::warn("Mastodon disabled; only --require-approval runs can publish")
        };
    }

    if mastodon.server.trim().is_empty() {
        return CheckResult::error("Mastodon enabled but no server configured");
    }

    if mastodon.access_token_env.is_empty() {
        return CheckResult::error("No access token env var configured");
    }

    if env_is_set(&mastodon.access_token_env) {
        CheckResult::ok(format!(
            "Server: {}, Access token: {} (set)",
            mastodon.server, mastodon.access_token_env
        ))
    } else {
        CheckResult::warn(format!(
            "Server: {}, Access token: {} (not set)",
            mastodon.server, mastodon.access_token_env
        ))
    }
}

fn print_report(report: &DoctorReport) {
    println!("geofinds Doctor Report");
    println!("======================");
    println!();

    print_check("Config", &report.config);
    print_check("Search", &report.search);
    print_check("Geocaching", &report.geocaching);
    print_check("State store", &report.store);
    print_check("Publisher", &report.publisher);

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());

    if report.overall == "ok" {
        println!();
        println!("Ready to run! Try: geofinds run --dry-run --once");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    let symbol = match result.status.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} {}: {}", symbol, name, result.message);
}
