//! Filesystem layout of the deployed service.

use crate::config::Settings;
use std::path::{Path, PathBuf};

/// Where the service's code, logs, rendered files and bundled artifacts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    service_name: String,
    base_dir: PathBuf,
    systemd_dir: PathBuf,
    charm_dir: PathBuf,
}

impl Layout {
    /// Layout for `service_name` rooted at the given directories.
    #[must_use]
    pub fn new(service_name: &str, base_dir: &Path, systemd_dir: &Path, charm_dir: &Path) -> Self {
        Self {
            service_name: service_name.to_string(),
            base_dir: base_dir.to_path_buf(),
            systemd_dir: systemd_dir.to_path_buf(),
            charm_dir: charm_dir.to_path_buf(),
        }
    }

    /// Layout described by the loaded settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.service_name,
            &settings.base_dir,
            &settings.systemd_dir,
            &settings.charm_dir,
        )
    }

    /// Name of the systemd service.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The service runs as a user named after it.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.service_name
    }

    /// Checked-out application code.
    #[must_use]
    pub fn code_dir(&self) -> PathBuf {
        self.base_dir.join("code")
    }

    /// Directory receiving the service's output.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Knex configuration used by the running service.
    #[must_use]
    pub fn knexfile_normal(&self) -> PathBuf {
        self.code_dir().join("knexfile-normal.js")
    }

    /// Knex configuration with admin credentials, used for migrations.
    #[must_use]
    pub fn knexfile_admin(&self) -> PathBuf {
        self.code_dir().join("knexfile-admin.js")
    }

    /// File name of the systemd unit, e.g. `snap-build.service`.
    #[must_use]
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service_name)
    }

    /// Full path of the rendered systemd unit.
    #[must_use]
    pub fn systemd_unit(&self) -> PathBuf {
        self.systemd_dir.join(self.unit_name())
    }

    /// Glob matching a bundled Node.js package.
    #[must_use]
    pub fn bundled_nodejs_pattern(&self) -> PathBuf {
        self.charm_dir.join("files").join("nodejs*.deb")
    }

    /// Name of the port check registered for the web frontend.
    #[must_use]
    pub fn port_check_name(&self) -> String {
        format!("ols.{}.express", self.service_name)
    }
}
