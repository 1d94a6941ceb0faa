//! Run command - poll, announce, and record loop

use anyhow::{Context, Result, bail};
use geofinds_adapters::{
    geocaching::{Credentials, GeocachingClient, SessionConfig, StubListingService},
    mastodon::{MastodonPublisher, StubPublisher},
    outbox::{OutboxPublisher, OutboxWriter},
    store::{InMemoryChangeStore, SqliteChangeStore},
};
use geofinds_domain::{
    ChangeStore, ListingService, ProcessResult, Publisher, SearchQuery, SystemClock,
    usecases::{RunLoop, RunLoopConfig},
};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

use crate::args::RunArgs;
use crate::commands::load_secret;
use crate::config::AppConfig;

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let require_approval = args.require_approval;
    let outbox_path = if require_approval {
        Some(args.outbox.clone().unwrap_or_else(default_outbox_path))
    } else {
        None
    };

    if args.outbox.is_some() && !require_approval {
        tracing::warn!("--outbox is ignored without --require-approval");
    }

    let mut dry_run = args.dry_run || config.general.dry_run;
    if require_approval && dry_run {
        tracing::info!("--require-approval overrides dry-run");
        dry_run = false;
    }

    let utc_offset = config.geocaching.offset()?;

    tracing::info!(
        dry_run = dry_run,
        once = args.once,
        require_approval = require_approval,
        outbox = ?outbox_path,
        area = %config.search.area_name,
        radius_meters = config.search.radius_meters,
        "Starting geofinds run"
    );

    // Build dependencies
    let listing_service = build_listing_service(&config, utc_offset)?;
    let state_store = build_state_store(&config).await?;

    let publisher = build_publisher(&config, dry_run, outbox_path).await?;
    tracing::info!(platform = publisher.platform(), "Publisher ready");

    let clock = Arc::new(SystemClock);

    let loop_config = RunLoopConfig {
        query: SearchQuery {
            latitude: config.search.latitude,
            longitude: config.search.longitude,
            radius_meters: config.search.radius_meters,
            area_name: config.search.area_name.clone(),
            ignore_premium: config.search.ignore_premium,
        },
        dry_run,
        utc_offset,
        compose_config: config.compose_config(),
    };

    let run_loop = RunLoop::new(
        listing_service,
        publisher,
        state_store,
        clock,
        loop_config,
    );

    run_loop
        .authenticate()
        .await
        .context("Failed to authenticate to the listing site")?;

    let last_announced = run_loop
        .registry()
        .last_announced(OffsetDateTime::now_utc())
        .await
        .context("Failed to read announcement cursor")?;
    tracing::info!(last_announced = %last_announced, "Loaded announcement cursor");

    // Execute
    if args.once {
        tracing::info!("Running single poll cycle");
        let results = run_loop.poll_once().await?;
        log_results(&results);
        tracing::info!(changed = results.len(), "Poll cycle complete");
    } else {
        // Set up graceful shutdown
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        };

        tokio::pin!(shutdown);

        loop {
            match run_loop.poll_once().await {
                Ok(results) => {
                    log_results(&results);
                    tracing::info!(changed = results.len(), "Poll cycle complete");
                }
                Err(e) if e.is_fatal() => {
                    return Err(e).context("Poll cycle failed");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Poll cycle failed, retrying next cycle");
                }
            }

            let delay = next_delay(config.watch.poll_interval_secs, config.watch.poll_jitter_secs);
            tracing::debug!(delay_secs = delay.as_secs(), "Sleeping until next cycle");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => {
                    tracing::info!("Shutting down gracefully");
                    break;
                }
            }
        }
    }

    tracing::info!("geofinds run completed");
    Ok(())
}

fn build_listing_service(
    config: &AppConfig,
    utc_offset: time::UtcOffset,
) -> Result<Arc<dyn ListingService>> {
    match config.geocaching.provider.as_str() {
        "site" => Ok(Arc::new(build_site_client(config, utc_offset)?)),
        "stub" => {
            let stub = match &config.geocaching.stub_fixture {
                Some(path) => StubListingService::from_fixture_file(path)
                    .with_context(|| format!("Failed to load stub fixture {}", path.display()))?,
                None => StubListingService::empty(),
            };
            tracing::info!(fixture = ?config.geocaching.stub_fixture, "Using stub listing service");
            Ok(Arc::new(stub))
        }
        other => bail!("Unknown geocaching provider: {} (expected site or stub)", other),
    }
}

async fn build_state_store(config: &AppConfig) -> Result<Arc<dyn ChangeStore>> {
    match config.general.state_backend.as_str() {
        "sqlite" => {
            let store = SqliteChangeStore::new(&config.general.state_db_path)
                .await
                .context("Failed to initialize SQLite state store")?;
            Ok(Arc::new(store))
        }
        "memory" => {
            tracing::warn!("Using in-memory state; everything is forgotten on exit");
            Ok(Arc::new(InMemoryChangeStore::new()))
        }
        other => bail!("Unknown state backend: {} (expected sqlite or memory)", other),
    }
}

fn build_site_client(config: &AppConfig, utc_offset: time::UtcOffset) -> Result<GeocachingClient> {
    let credentials = Credentials {
        username: load_secret(&config.geocaching.username_env, "geocaching username")?,
        password: load_secret(&config.geocaching.password_env, "geocaching password")?,
    };

    let session_config = SessionConfig {
        base_url: config.geocaching.base_url.clone(),
        unthrottle: config.geocaching.unthrottle,
        proxy_url: config.geocaching.proxy_url.clone(),
        ..Default::default()
    };

    GeocachingClient::new(&session_config, credentials, utc_offset)
        .context("Failed to build geocaching client")
}

async fn build_publisher(
    config: &AppConfig,
    dry_run: bool,
    outbox_path: Option<PathBuf>,
) -> Result<Arc<dyn Publisher>> {
    if let Some(outbox_path) = outbox_path {
        let writer = OutboxWriter::new(outbox_path.clone())
            .await
            .context("Failed to initialize outbox writer")?;

        tracing::info!(
            outbox = %outbox_path.display(),
            "Writing approvals to outbox"
        );
        return Ok(Arc::new(OutboxPublisher::new(writer, "mastodon")));
    }

    if dry_run {
        return Ok(Arc::new(StubPublisher::new()));
    }

    if !config.mastodon.enabled {
        bail!("No publisher configured: enable [mastodon], or use --require-approval or --dry-run");
    }

    if config.mastodon.server.trim().is_empty() {
        bail!("Mastodon enabled but no server configured");
    }

    let token = load_secret(&config.mastodon.access_token_env, "mastodon")?;
    let publisher = MastodonPublisher::new(
        token,
        config.mastodon.server.clone(),
        config.post.max_chars,
    )?;
    Ok(Arc::new(publisher))
}

fn next_delay(interval_secs: u64, jitter_secs: u64) -> Duration {
    let jitter = if jitter_secs == 0 {
        0
    } else {
        rand::rng().random_range(0..=jitter_secs)
    };
    Duration::from_secs(interval_secs + jitter)
}

fn log_results(results: &[(String, ProcessResult)]) {
    for (code, result) in results {
        match result {
            ProcessResult::Announced {
                classification,
                post_id,
            } => {
                tracing::info!(
                    code = %code,
                    kind = classification.label(),
                    post_id = ?post_id,
                    "Announced"
                );
            }
            ProcessResult::Skipped { reason } => {
                tracing::info!(code = %code, reason = %reason, "Skipped");
            }
            ProcessResult::Failed { error } => {
                tracing::error!(code = %code, error = %error, "Failed");
            }
        }
    }
}

fn default_outbox_path() -> PathBuf {
    PathBuf::from("./outbox.jsonl")
}
