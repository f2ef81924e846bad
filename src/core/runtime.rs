//! Node.js runtime installation.
//!
//! The charm may bundle a `nodejs*.deb` built for the service. When it does,
//! that exact version is installed (downgrading if needed); otherwise the
//! distribution packages are queued and the dispatcher installs them with
//! `apt-get` at the start of its next pass.

use crate::core::command::{CommandRunner, CommandSpec, check_call, check_output};
use crate::core::context::HookContext;
use crate::core::hook_tools::{WorkloadState, status_set};
use crate::core::hooks::{HookEnv, HookOutcome};
use crate::core::states::APT_QUEUED_INSTALLS;
use crate::errors::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, instrument};

/// Packages installed from the archive when no bundled package exists.
pub const FALLBACK_PACKAGES: [&str; 3] = ["npm", "nodejs", "nodejs-legacy"];

/// Runs whenever no apt installs are pending.
pub const WHEN: &[&str] = &[];
/// States that keep the installer from running.
pub const WHEN_NOT: &[&str] = &[APT_QUEUED_INSTALLS];

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"Version: (.*)").unwrap()
});

/// Extracts the first `Version:` field from dpkg output.
#[must_use]
pub fn parse_version(output: &str) -> Option<String> {
    VERSION_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// First bundled Node.js package matching the layout's pattern, if any.
pub fn find_bundled_package(pattern: &Path) -> Result<Option<PathBuf>> {
    let pattern = pattern.to_string_lossy();
    let mut matches: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(std::result::Result::ok)
        .collect();
    matches.sort();
    Ok(matches.into_iter().next())
}

/// Version of the installed `nodejs` package, or an empty string when it is
/// not installed.
async fn installed_version(runner: &dyn CommandRunner) -> Result<String> {
    let output = runner
        .output(&CommandSpec::new("dpkg", ["-s", "nodejs"]))
        .await?;
    if !output.success {
        return Ok(String::new());
    }
    Ok(parse_version(&output.stdout).unwrap_or_default())
}

/// Installs the bundled Node.js package if its version differs from the
/// installed one, or queues the archive packages when nothing is bundled.
#[instrument(skip_all)]
pub async fn install_runtime(ctx: &HookContext, env: &HookEnv<'_>) -> Result<HookOutcome> {
    if !ctx.states.satisfies(WHEN, WHEN_NOT) {
        debug!("apt installs pending; skipping runtime installation");
        return Ok(HookOutcome::skipped());
    }

    let Some(deb_path) = find_bundled_package(&env.layout.bundled_nodejs_pattern())? else {
        // Packages already installed from the archive are dropped when queued.
        info!("No bundled Node.js package; queueing archive packages");
        return Ok(HookOutcome::completed().queue_install(FALLBACK_PACKAGES));
    };
    let deb = deb_path.to_string_lossy().into_owned();

    let info_output =
        check_output(env.runner, &CommandSpec::new("dpkg-deb", ["-I", deb.as_str()])).await?;
    let bundled = parse_version(&info_output).ok_or_else(|| Error::Package {
        message: format!("{deb} has no Version field"),
    })?;
    let installed = installed_version(env.runner).await?;

    if installed == bundled {
        debug!(version = %installed, "Bundled Node.js already installed");
        return Ok(HookOutcome::completed());
    }

    info!("Installed NodeJS {} != {}, installing from custom deb", installed, bundled);
    status_set(env.runner, WorkloadState::Maintenance, &format!("Installing {deb}")).await?;
    check_call(
        env.runner,
        &CommandSpec::new("apt", ["install", "-y", "--allow-downgrades", deb.as_str()]),
    )
    .await?;
    status_set(env.runner, WorkloadState::Active, "Custom NodeJs package installed").await?;

    Ok(HookOutcome::completed())
}
