//! Hook settings loading from settings.toml
//!
//! Settings describe where things live on the unit: the service name, its
//! base directory, the systemd unit directory, the charm directory and the
//! unit state database. Every field has a production default, so a missing
//! default settings file is not an error.

use crate::config::database::{DEFAULT_DATABASE_URL, database_url_from_env};
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings file looked up when no path is given.
pub const DEFAULT_SETTINGS_PATH: &str = "settings.toml";

/// Settings for a hook invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the systemd service and of the service user
    pub service_name: String,
    /// Root of the service's code and log directories
    pub base_dir: PathBuf,
    /// Directory the systemd unit is written to
    pub systemd_dir: PathBuf,
    /// Directory the charm is unpacked in (bundled `files/` live here)
    pub charm_dir: PathBuf,
    /// `SeaORM` URL of the unit state database
    pub database_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_name: "snap-build".to_string(),
            base_dir: PathBuf::from("/srv/snap-build"),
            systemd_dir: PathBuf::from("/lib/systemd/system"),
            charm_dir: PathBuf::from("."),
            database_url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

/// Parses settings from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    debug!("Attempting to load settings from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read settings file {}: {e}", path_ref.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse settings file {}: {e}", path_ref.display()),
    })
}

/// Loads settings from `path`, or from `settings.toml` when it exists, then
/// applies the `DATABASE_URL` and `CHARM_DIR` environment overrides.
///
/// An explicit path that cannot be read is an error; a missing default file
/// falls back to the built-in defaults.
pub fn load_app_settings(path: Option<&Path>) -> Result<Settings> {
    let mut settings = match path {
        Some(path) => load_settings(path)?,
        None if Path::new(DEFAULT_SETTINGS_PATH).exists() => {
            load_settings(DEFAULT_SETTINGS_PATH)?
        }
        None => {
            debug!("No settings file found, using defaults");
            Settings::default()
        }
    };

    if let Some(url) = database_url_from_env() {
        settings.database_url = url;
    }
    if let Ok(charm_dir) = std::env::var("CHARM_DIR") {
        if !charm_dir.is_empty() {
            settings.charm_dir = PathBuf::from(charm_dir);
        }
    }

    Ok(settings)
}
