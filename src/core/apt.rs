//! Archive package install queue.
//!
//! Handlers ask for archive packages through
//! [`HookOutcome::queue_install`](crate::core::hooks::HookOutcome::queue_install).
//! The dispatcher records the request as the value of `apt.queued_installs`
//! and installs the whole queue with `apt-get` at the start of its next pass.
//! Every package installed that way is remembered as `apt.installed.<name>`
//! and is not queued again.

use crate::core::command::{CommandRunner, CommandSpec, check_call};
use crate::core::hook_tools::{WorkloadState, status_set};
use crate::core::states::{self, APT_QUEUED_INSTALLS};
use crate::errors::Result;
use sea_orm::DatabaseConnection;
use tracing::{debug, info, instrument};

/// State recording that `package` was installed from the archive.
#[must_use]
pub fn installed_state(package: &str) -> String {
    format!("apt.installed.{package}")
}

/// Packages waiting to be installed, in the order they were queued.
pub async fn queued_packages(db: &DatabaseConnection) -> Result<Vec<String>> {
    Ok(states::get_state(db, APT_QUEUED_INSTALLS)
        .await?
        .and_then(|state| state.value)
        .map(|value| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default())
}

/// Adds `packages` to the install queue and returns the resulting queue.
///
/// Packages already queued or already installed from the archive are
/// skipped. `apt.queued_installs` is only written when the queue is not
/// empty.
pub async fn queue_install(db: &DatabaseConnection, packages: &[String]) -> Result<Vec<String>> {
    let mut queued = queued_packages(db).await?;

    for package in packages {
        if queued.contains(package) {
            continue;
        }
        if states::get_state(db, &installed_state(package)).await?.is_some() {
            debug!(package = %package, "Already installed; not queueing");
            continue;
        }
        queued.push(package.clone());
    }

    if !queued.is_empty() {
        states::set_state(db, APT_QUEUED_INSTALLS, Some(queued.join(" "))).await?;
    }
    Ok(queued)
}

/// Installs every queued package and clears the queue.
///
/// Returns the packages installed. A failing `apt-get` is fatal and leaves
/// the queue in place for the next attempt.
#[instrument(skip_all)]
pub async fn install_queued(
    runner: &dyn CommandRunner,
    db: &DatabaseConnection,
) -> Result<Vec<String>> {
    let queued = queued_packages(db).await?;
    if queued.is_empty() {
        states::remove_state(db, APT_QUEUED_INSTALLS).await?;
        return Ok(queued);
    }

    status_set(
        runner,
        WorkloadState::Maintenance,
        &format!("Installing {}", queued.join(",")),
    )
    .await?;

    let args = ["install", "-y"]
        .into_iter()
        .map(str::to_string)
        .chain(queued.iter().cloned());
    check_call(runner, &CommandSpec::new("apt-get", args)).await?;

    for package in &queued {
        states::set_state(db, &installed_state(package), None).await?;
    }
    states::remove_state(db, APT_QUEUED_INSTALLS).await?;

    info!(packages = ?queued, "Installed queued packages");
    Ok(queued)
}
