//! Config command - write an example file or print the effective settings

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::args::{ConfigArgs, ConfigCommands};
use crate::commands::env_is_set;
use crate::config::AppConfig;

pub async fn execute(args: ConfigArgs, config_path: Option<PathBuf>) -> Result<()> {
    match args.command {
        ConfigCommands::Init { path, force } => init_config(&path, force),
        ConfigCommands::Show => show_config(config_path.as_deref()),
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(path, AppConfig::example_toml())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    println!("Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set [search] to the area you want to watch");
    println!("  2. Export GEOCACHING_CLIENT_ID and GEOCACHING_CLIENT_SECRET");
    println!("  3. Run 'geofinds doctor' to validate your setup");
    println!("  4. Run 'geofinds run --dry-run --once' to test");

    Ok(())
}

/// Print the merged file and `GEOFINDS__*` settings as TOML
fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;

    print!("{}", rendered);
    println!();
    for env_var in [
        &config.geocaching.username_env,
        &config.geocaching.password_env,
        &config.mastodon.access_token_env,
    ] {
        let state = if env_is_set(env_var) { "set" } else { "not set" };
        println!("# {} is {}", env_var, state);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_parseable_example_and_respects_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init_config(&path, false).unwrap();
        let written: AppConfig = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.search.area_name, AppConfig::default().search.area_name);

        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();
    }

    #[test]
    fn test_effective_config_renders_as_toml() {
        let rendered = toml::to_string_pretty(&AppConfig::default()).unwrap();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.watch.poll_interval_secs, 300);
        assert!(rendered.contains("[mastodon]"));
    }
}
