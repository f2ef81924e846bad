//! Trigger table and dispatch.
//!
//! Each handler is listed with the states that must be set (`when`) and the
//! states that must not be (`when_not`). A dispatch pass walks the table in
//! order, runs every handler whose trigger holds and applies its effects
//! before moving on, so the migration and the configuration that depends on
//! it can both happen in one pass. Archive packages queued by an earlier pass
//! are installed before any handler runs.

use crate::core::context::HookContext;
use crate::core::hook_tools::leader_set;
use crate::core::hooks::{Disposition, HookEnv, HookOutcome};
use crate::core::states::{self, APT_QUEUED_INSTALLS, Scope};
use crate::core::{apt, configure, migrate, runtime};
use crate::errors::Result;
use sea_orm::DatabaseConnection;
use std::fmt;
use tracing::{debug, info, instrument};

/// The handlers this charm provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// Node.js runtime installer
    InstallRuntime,
    /// Leader-only database migration
    Migrate,
    /// Per-unit service configuration
    Configure,
}

impl Hook {
    /// Name used in logs and on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::InstallRuntime => "install-runtime",
            Self::Migrate => "migrate",
            Self::Configure => "configure",
        }
    }

    /// Runs the handler. Each handler re-checks its own trigger.
    pub async fn run(self, ctx: &HookContext, env: &HookEnv<'_>) -> Result<HookOutcome> {
        match self {
            Self::InstallRuntime => runtime::install_runtime(ctx, env).await,
            Self::Migrate => migrate::migrate(ctx, env).await,
            Self::Configure => configure::configure(ctx, env).await,
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A handler and the states that gate it.
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    /// The gated handler
    pub hook: Hook,
    /// States that must all be set
    pub when: &'static [&'static str],
    /// States that must all be unset
    pub when_not: &'static [&'static str],
}

/// Handlers in the order a dispatch pass considers them.
pub const TRIGGERS: &[Trigger] = &[
    Trigger {
        hook: Hook::InstallRuntime,
        when: runtime::WHEN,
        when_not: runtime::WHEN_NOT,
    },
    Trigger {
        hook: Hook::Migrate,
        when: migrate::WHEN,
        when_not: migrate::WHEN_NOT,
    },
    Trigger {
        hook: Hook::Configure,
        when: configure::WHEN,
        when_not: configure::WHEN_NOT,
    },
];

/// Applies a handler's flag changes and queued installs.
///
/// Local flags go to the unit state store, leader flags are published with
/// `leader-set`. Every applied change is mirrored into `ctx.states`.
pub async fn apply_outcome(
    outcome: &HookOutcome,
    ctx: &mut HookContext,
    env: &HookEnv<'_>,
    db: &DatabaseConnection,
) -> Result<()> {
    for flag in &outcome.flags {
        match flag.scope {
            Scope::Local => states::set_state(db, &flag.name, None).await?,
            Scope::Leader => {
                leader_set(env.runner, &flag.name, "true").await?;
                ctx.leader_settings
                    .insert(flag.name.clone(), "true".to_string());
            }
        }
        ctx.states.set(&flag.state_name());
    }

    if !outcome.queued_installs.is_empty() {
        let queued = apt::queue_install(db, &outcome.queued_installs).await?;
        if queued.is_empty() {
            debug!("Requested packages already installed");
        } else {
            info!(packages = ?queued, "Queued packages for installation");
            ctx.states.set(APT_QUEUED_INSTALLS);
        }
    }
    Ok(())
}

/// Installs the packages queued by an earlier pass, if any.
///
/// Clears `apt.queued_installs` so the handlers it gates can run again.
pub async fn install_queued(
    ctx: &mut HookContext,
    env: &HookEnv<'_>,
    db: &DatabaseConnection,
) -> Result<()> {
    if !ctx.states.is_set(APT_QUEUED_INSTALLS) {
        return Ok(());
    }
    for package in apt::install_queued(env.runner, db).await? {
        ctx.states.set(&apt::installed_state(&package));
    }
    ctx.states.unset(APT_QUEUED_INSTALLS);
    Ok(())
}

/// Runs one handler and applies its outcome.
pub async fn run_hook(
    hook: Hook,
    ctx: &mut HookContext,
    env: &HookEnv<'_>,
    db: &DatabaseConnection,
) -> Result<HookOutcome> {
    let outcome = hook.run(ctx, env).await?;
    apply_outcome(&outcome, ctx, env, db).await?;
    Ok(outcome)
}

/// Installs queued packages, then runs every handler whose trigger holds,
/// in table order.
///
/// Returns the disposition of each handler that ran. The first fatal error
/// aborts the pass; effects already applied stay applied.
#[instrument(skip_all)]
pub async fn dispatch(
    ctx: &mut HookContext,
    env: &HookEnv<'_>,
    db: &DatabaseConnection,
) -> Result<Vec<(Hook, Disposition)>> {
    install_queued(ctx, env, db).await?;

    let mut ran = Vec::new();
    for trigger in TRIGGERS {
        if !ctx.states.satisfies(trigger.when, trigger.when_not) {
            debug!(hook = %trigger.hook, "Trigger not satisfied");
            continue;
        }
        info!(hook = %trigger.hook, "Running handler");
        let outcome = run_hook(trigger.hook, ctx, env, db).await?;
        ran.push((trigger.hook, outcome.disposition));
    }
    Ok(ran)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::migrate::OLS_CONFIGURED;
    use crate::core::runtime::FALLBACK_PACKAGES;
    use crate::core::states::{MIGRATED_STATE, SERVICE_CONFIGURED};
    use crate::test_utils::{
        RecordingGranter, RecordingRunner, TestHarness, init_test_tracing, setup_test_db,
    };

    /// Records the archive runtime packages as already installed.
    async fn mark_runtime_installed(db: &DatabaseConnection) -> Result<()> {
        for package in FALLBACK_PACKAGES {
            states::set_state(db, &apt::installed_state(package), None).await?;
        }
        Ok(())
    }

    #[test]
    fn test_trigger_table_order() {
        let hooks: Vec<Hook> = TRIGGERS.iter().map(|t| t.hook).collect();
        assert_eq!(hooks, vec![Hook::InstallRuntime, Hook::Migrate, Hook::Configure]);
    }

    #[tokio::test]
    async fn test_dispatch_migrates_then_configures() -> Result<()> {
        init_test_tracing();
        let db = setup_test_db().await?;
        mark_runtime_installed(&db).await?;
        let mut harness = TestHarness::new()?;
        harness.configure_ready();
        harness.event.leader_settings.clear();
        harness.event.is_leader = true;
        harness.with_admin_db("snap-build", "postgresql://admin@db/snap-build");
        harness.local_states.push(OLS_CONFIGURED.to_string());
        let runner = RecordingRunner::new();
        let granter = RecordingGranter::new();

        let mut ctx = harness.context();
        let ran = dispatch(&mut ctx, &harness.env_with(&runner, &granter), &db).await?;

        assert_eq!(
            ran,
            vec![
                (Hook::InstallRuntime, Disposition::Completed),
                (Hook::Migrate, Disposition::Completed),
                (Hook::Configure, Disposition::Completed),
            ]
        );
        assert!(ctx.states.is_set(MIGRATED_STATE));
        assert!(ctx.states.is_set(SERVICE_CONFIGURED));
        assert!(!ctx.states.is_set(APT_QUEUED_INSTALLS));
        assert!(runner.calls().contains(&"leader-set migrated=true".to_string()));
        assert!(states::get_state(&db, SERVICE_CONFIGURED).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_second_dispatch_does_not_migrate_again() -> Result<()> {
        let db = setup_test_db().await?;
        mark_runtime_installed(&db).await?;
        let mut harness = TestHarness::new()?;
        harness.configure_ready();
        harness.event.is_leader = true;
        harness.with_admin_db("snap-build", "postgresql://admin@db/snap-build");
        harness.local_states.push(OLS_CONFIGURED.to_string());
        let runner = RecordingRunner::new();
        let granter = RecordingGranter::new();

        let mut ctx = harness.context();
        let ran = dispatch(&mut ctx, &harness.env_with(&runner, &granter), &db).await?;

        assert_eq!(
            ran,
            vec![
                (Hook::InstallRuntime, Disposition::Completed),
                (Hook::Configure, Disposition::Completed),
            ]
        );
        assert!(granter.executions().is_empty());
        assert!(!runner.calls().iter().any(|call| call.starts_with("npm")));
        Ok(())
    }

    #[tokio::test]
    async fn test_queued_installs_are_installed_on_next_pass() -> Result<()> {
        let db = setup_test_db().await?;
        let harness = TestHarness::new()?;

        // First pass: nothing bundled, so the archive packages are queued.
        let runner = RecordingRunner::new();
        let mut ctx = harness.context();
        let ran = dispatch(&mut ctx, &harness.env(&runner), &db).await?;
        assert_eq!(ran, vec![(Hook::InstallRuntime, Disposition::Completed)]);
        assert!(ctx.states.is_set(APT_QUEUED_INSTALLS));
        assert!(runner.calls().is_empty());
        let queued = states::get_state(&db, APT_QUEUED_INSTALLS).await?.unwrap();
        assert_eq!(queued.value.as_deref(), Some("npm nodejs nodejs-legacy"));

        // Next event: the queue is installed and the installer runs again.
        let runner = RecordingRunner::new();
        let local_states = states::load_local_states(&db).await?;
        let mut ctx = HookContext::new(
            harness.event.clone(),
            local_states.into_iter().map(|state| state.name),
        );
        let ran = dispatch(&mut ctx, &harness.env(&runner), &db).await?;

        assert_eq!(ran, vec![(Hook::InstallRuntime, Disposition::Completed)]);
        assert_eq!(
            runner.calls(),
            vec![
                "status-set maintenance Installing npm,nodejs,nodejs-legacy",
                "apt-get install -y npm nodejs nodejs-legacy",
            ]
        );
        assert!(!ctx.states.is_set(APT_QUEUED_INSTALLS));
        assert!(ctx.states.is_set("apt.installed.nodejs"));
        assert!(states::get_state(&db, APT_QUEUED_INSTALLS).await?.is_none());

        // Installed packages are not queued again.
        let runner = RecordingRunner::new();
        let ran = dispatch(&mut ctx, &harness.env(&runner), &db).await?;
        assert_eq!(ran, vec![(Hook::InstallRuntime, Disposition::Completed)]);
        assert!(runner.calls().is_empty());
        assert!(!ctx.states.is_set(APT_QUEUED_INSTALLS));
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_installs_gate_the_installer() -> Result<()> {
        let db = setup_test_db().await?;
        let harness = TestHarness::new()?;
        let runner = RecordingRunner::new();
        let mut ctx = harness.context();

        let outcome = run_hook(Hook::InstallRuntime, &mut ctx, &harness.env(&runner), &db).await?;
        assert!(ctx.states.is_set(APT_QUEUED_INSTALLS));

        let again = run_hook(Hook::InstallRuntime, &mut ctx, &harness.env(&runner), &db).await?;
        assert_eq!(outcome.disposition, Disposition::Completed);
        assert_eq!(again.disposition, Disposition::Skipped);
        Ok(())
    }

    #[tokio::test]
    async fn test_blocked_configuration_sets_no_flag() -> Result<()> {
        let db = setup_test_db().await?;
        mark_runtime_installed(&db).await?;
        let mut harness = TestHarness::new()?;
        harness.configure_ready();
        harness.event.config.session_secret = None;
        let runner = RecordingRunner::new();

        let mut ctx = harness.context();
        let ran = dispatch(&mut ctx, &harness.env(&runner), &db).await?;

        assert!(matches!(
            ran[..],
            [
                (Hook::InstallRuntime, Disposition::Completed),
                (Hook::Configure, Disposition::Blocked(_)),
            ]
        ));
        assert!(!ctx.states.is_set(SERVICE_CONFIGURED));
        assert!(states::get_state(&db, SERVICE_CONFIGURED).await?.is_none());
        Ok(())
    }
}
