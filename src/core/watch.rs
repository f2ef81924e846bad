//! Restart-on-change detection.
//!
//! A [`FileWatch`] records the SHA-256 of a set of files before a handler
//! body runs. Afterwards [`FileWatch::changed`] reports the files whose
//! content differs, and [`restart_services`] bounces the services that depend
//! on them. A file that does not exist hashes as "absent", so creating it
//! counts as a change.

use crate::core::command::{CommandRunner, CommandSpec, check_call};
use crate::errors::Result;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// Content hashes of watched files taken at one point in time.
#[derive(Debug, Clone)]
pub struct FileWatch {
    before: Vec<(PathBuf, Option<Vec<u8>>)>,
}

impl FileWatch {
    /// Hashes every path in `paths`.
    pub async fn snapshot(paths: &[PathBuf]) -> Result<Self> {
        let mut before = Vec::with_capacity(paths.len());
        for path in paths {
            before.push((path.clone(), file_hash(path).await?));
        }
        Ok(Self { before })
    }

    /// Paths whose content changed since the snapshot.
    pub async fn changed(&self) -> Result<Vec<PathBuf>> {
        let mut changed = Vec::new();
        for (path, hash) in &self.before {
            if file_hash(path).await? != *hash {
                changed.push(path.clone());
            }
        }
        Ok(changed)
    }
}

async fn file_hash(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(content) => Ok(Some(Sha256::digest(&content).to_vec())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Stops and then starts each service once.
pub async fn restart_services(runner: &dyn CommandRunner, services: &[&str]) -> Result<()> {
    for service in services {
        info!(service, "Restarting service after configuration change");
        check_call(runner, &CommandSpec::new("systemctl", ["stop", *service])).await?;
        check_call(runner, &CommandSpec::new("systemctl", ["start", *service])).await?;
    }
    Ok(())
}
