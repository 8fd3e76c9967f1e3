//! Ambient [`Settings`] persistence, built on the same layered
//! file-plus-environment pattern as `configuration.rs`/`config_repository.rs`:
//! loading falls back to `Settings::default()` when nothing is on disk, a
//! TOML file under the platform config directory is the primary source, and
//! environment variables (`STACKPATCH__<FIELD>`) take precedence over it.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use stackpatch_core::config::Settings;
use tokio::fs;
use tracing::{debug, instrument};

fn default_config_dir() -> PathBuf {
    ProjectDirs::from("com", "stackpatch", "stackpatch")
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("config"))
}

/// Loads settings from `<config_dir>/settings.toml`, overridden by
/// `STACKPATCH__*` environment variables, falling back to
/// [`Settings::default`] entirely when neither is present.
#[instrument]
pub fn load_settings_from(config_dir: Option<PathBuf>) -> Result<Settings, config::ConfigError> {
    let config_dir = config_dir.unwrap_or_else(default_config_dir);

    let settings = Config::builder()
        .set_default("log_level", "info")?
        .set_default("download_concurrency", 4)?
        .set_default("request_timeout_secs", 30)?
        .add_source(File::from(config_dir.join("settings.toml")).required(false))
        .add_source(
            Environment::with_prefix("STACKPATCH")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}

pub fn load_settings() -> Result<Settings, config::ConfigError> {
    load_settings_from(None)
}

/// Persists `settings` to `<config_dir>/settings.toml`, creating the
/// directory if needed.
#[instrument(skip(settings))]
pub async fn save_settings(
    config_dir: &PathBuf,
    settings: &Settings,
) -> Result<(), stackpatch_core::Error> {
    fs::create_dir_all(config_dir).await?;
    let path = config_dir.join("settings.toml");
    let text = toml::to_string_pretty(settings)
        .map_err(|e| stackpatch_core::Error::Other(format!("failed to serialize settings: {e}")))?;
    debug!(path = %path.display(), "saving settings");
    fs::write(&path, text).await?;
    Ok(())
}
