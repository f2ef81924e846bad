//! Template rendering for the files the hooks write.
//!
//! Both templates are compiled into the binary. Rendered files are written to
//! a `.new` sibling that is created with its final mode and then renamed into
//! place, so a reader never sees a half-written unit or knexfile and
//! credentials are never readable with wider permissions.

use crate::errors::Result;
use minijinja::{AutoEscape, Environment};
use serde::Serialize;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Knex connection configuration template.
pub const KNEXFILE_TEMPLATE: &str = "knexfile.js.j2";
/// systemd unit template.
pub const SYSTEMD_TEMPLATE: &str = "snap-build_systemd.j2";

/// Mode for files carrying database credentials.
pub const CREDENTIALS_MODE: u32 = 0o640;
/// Mode for the systemd unit.
pub const UNIT_MODE: u32 = 0o644;

/// The hook templates, parsed once per invocation.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Loads the built-in templates.
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_template(
            KNEXFILE_TEMPLATE,
            include_str!("../../templates/knexfile.js.j2"),
        )?;
        env.add_template(
            SYSTEMD_TEMPLATE,
            include_str!("../../templates/snap-build_systemd.j2"),
        )?;
        Ok(Self { env })
    }

    /// Renders `name` with `context` into a string.
    pub fn render<S: Serialize>(&self, name: &str, context: S) -> Result<String> {
        let template = self.env.get_template(name)?;
        Ok(template.render(context)?)
    }

    /// Renders `name` with `context` and writes the result to `target` with
    /// the given permission bits.
    pub async fn render_to_file<S: Serialize>(
        &self,
        name: &str,
        target: &Path,
        context: S,
        mode: u32,
    ) -> Result<()> {
        let mut content = self.render(name, context)?;
        if !content.ends_with('\n') {
            content.push('\n');
        }
        debug!("Rendering {} to {}", name, target.display());
        write_atomic(target, content.as_bytes(), mode).await
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let mut staging = target.as_os_str().to_owned();
    staging.push(".new");
    PathBuf::from(staging)
}

/// Creates `staging` with `mode` already applied.
///
/// A leftover staging file is removed first; its mode would otherwise be kept.
async fn create_staging(staging: &Path, mode: u32) -> Result<File> {
    match tokio::fs::remove_file(staging).await {
        Ok(()) => debug!("Removed stale {}", staging.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(staging)
        .await?;
    // The umask may have narrowed the mode at creation.
    file.set_permissions(std::fs::Permissions::from_mode(mode))
        .await?;
    Ok(file)
}

async fn write_staged(staging: &Path, target: &Path, content: &[u8], mode: u32) -> Result<()> {
    let mut file = create_staging(staging, mode).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(staging, target).await?;
    Ok(())
}

async fn write_atomic(target: &Path, content: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let staging = staging_path(target);
    let result = write_staged(&staging, target, content, mode).await;
    if result.is_err() {
        match tokio::fs::remove_file(&staging).await {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                warn!("Failed to remove {}: {}", staging.display(), e);
            }
            _ => {}
        }
    }
    result
}
