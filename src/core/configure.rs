//! Per-unit service configuration.
//!
//! Once the application is migrated every unit renders its own knexfile and
//! systemd unit from the current configuration, enables the unit and
//! registers the service port. The service is bounced only when the rendered
//! unit or knexfile actually changed.

use crate::config::charm::or_empty;
use crate::core::command::{CommandSpec, check_call};
use crate::core::context::{CACHE_AVAILABLE, DB_MASTER_AVAILABLE, HookContext};
use crate::core::hook_tools::{WorkloadState, check_port, status_set};
use crate::core::hooks::{HookEnv, HookOutcome};
use crate::core::states::{FlagChange, MIGRATED_STATE, SERVICE_CONFIGURED};
use crate::core::templates::{CREDENTIALS_MODE, KNEXFILE_TEMPLATE, SYSTEMD_TEMPLATE, UNIT_MODE};
use crate::core::watch::{FileWatch, restart_services};
use crate::errors::Result;
use serde::Serialize;
use tracing::{debug, info, instrument};

/// Set by the base layer once PostgreSQL client tooling is in place.
pub const OLS_PG_CONFIGURED: &str = "ols.pg.configured";
/// Set by the base layer once the service code is deployed.
pub const OLS_SERVICE_INSTALLED: &str = "ols.service.installed";

/// Required states for the configuration trigger.
pub const WHEN: &[&str] = &[
    MIGRATED_STATE,
    CACHE_AVAILABLE,
    DB_MASTER_AVAILABLE,
    OLS_PG_CONFIGURED,
    OLS_SERVICE_INSTALLED,
];
/// The configurator re-runs on every event; nothing forbids it.
pub const WHEN_NOT: &[&str] = &[];

/// Status message when required secrets are missing.
pub const MISSING_SECRETS_MESSAGE: &str =
    "Service requires session_secret and memcache_session_secret to be set";

#[derive(Serialize)]
struct KnexfileContext<'a> {
    node_env: &'a str,
    db_conn: &'a str,
}

#[derive(Serialize)]
struct UnitContext {
    working_dir: String,
    user: String,
    node_env: &'static str,
    session_secret: String,
    logs_path: String,
    environment: String,
    cache_hosts: Vec<String>,
    memcache_session_secret: String,
    sentry_dsn: String,
    lp_api_username: String,
    lp_api_consumer_key: String,
    lp_api_token: String,
    lp_api_token_secret: String,
    github_auth_client_id: String,
    github_auth_client_secret: String,
    github_webhook_secret: String,
    knex_config_path: String,
    http_proxy: String,
    trusted_networks: Vec<String>,
    port: u16,
}

/// Configures the service on this unit and restarts it if its rendered
/// configuration changed.
#[instrument(skip_all)]
pub async fn configure(ctx: &HookContext, env: &HookEnv<'_>) -> Result<HookOutcome> {
    if !ctx.states.satisfies(WHEN, WHEN_NOT) {
        debug!("Configuration trigger not satisfied; skipping");
        return Ok(HookOutcome::skipped());
    }

    let watched = [env.layout.systemd_unit(), env.layout.knexfile_normal()];
    let watch = FileWatch::snapshot(&watched).await?;

    let outcome = configure_service(ctx, env).await?;

    let changed = watch.changed().await?;
    if !changed.is_empty() {
        debug!(files = ?changed, "Rendered configuration changed");
        restart_services(env.runner, &[env.layout.service_name()]).await?;
    }

    Ok(outcome)
}

async fn configure_service(ctx: &HookContext, env: &HookEnv<'_>) -> Result<HookOutcome> {
    let db_name = ctx.config.db_name();
    let Some(master) = ctx.db.as_ref().and_then(|db| db.master_for(db_name)) else {
        info!("Database context not available yet; skipping");
        return Ok(HookOutcome::deferred("Database context not available yet"));
    };

    let config = &ctx.config;
    let session_secret = or_empty(config.session_secret.as_ref());
    let memcache_session_secret = or_empty(config.memcache_session_secret.as_ref());
    if session_secret.is_empty() || memcache_session_secret.is_empty() {
        status_set(env.runner, WorkloadState::Blocked, MISSING_SECRETS_MESSAGE).await?;
        return Ok(HookOutcome::blocked(MISSING_SECRETS_MESSAGE));
    }

    let node_env = ctx.node_env().as_str();
    let layout = env.layout;
    let knexfile = layout.knexfile_normal();
    env.templates
        .render_to_file(
            KNEXFILE_TEMPLATE,
            &knexfile,
            KnexfileContext {
                node_env,
                db_conn: &master.uri,
            },
            CREDENTIALS_MODE,
        )
        .await?;

    let unit = UnitContext {
        working_dir: layout.code_dir().display().to_string(),
        user: layout.user().to_string(),
        node_env,
        session_secret,
        logs_path: layout.logs_dir().display().to_string(),
        environment: config.environment().to_string(),
        cache_hosts: ctx
            .cache
            .as_ref()
            .map(|cache| cache.sorted_hosts())
            .unwrap_or_default(),
        memcache_session_secret,
        sentry_dsn: or_empty(config.sentry_dsn.as_ref()),
        lp_api_username: or_empty(config.lp_api_username.as_ref()),
        lp_api_consumer_key: or_empty(config.lp_api_consumer_key.as_ref()),
        lp_api_token: or_empty(config.lp_api_token.as_ref()),
        lp_api_token_secret: or_empty(config.lp_api_token_secret.as_ref()),
        github_auth_client_id: or_empty(config.github_auth_client_id.as_ref()),
        github_auth_client_secret: or_empty(config.github_auth_client_secret.as_ref()),
        github_webhook_secret: or_empty(config.github_webhook_secret.as_ref()),
        knex_config_path: knexfile.display().to_string(),
        http_proxy: or_empty(config.http_proxy.as_ref()),
        trusted_networks: config.trusted_networks(),
        port: config.port(),
    };
    env.templates
        .render_to_file(SYSTEMD_TEMPLATE, &layout.systemd_unit(), unit, UNIT_MODE)
        .await?;

    let unit_name = layout.unit_name();
    check_call(env.runner, &CommandSpec::new("systemctl", ["enable", unit_name.as_str()])).await?;
    check_call(env.runner, &CommandSpec::new("systemctl", ["daemon-reload"])).await?;
    check_port(env.runner, &layout.port_check_name(), config.port()).await?;

    status_set(env.runner, WorkloadState::Active, "systemd unit configured").await?;
    Ok(HookOutcome::completed().set_flag(FlagChange::local(SERVICE_CONFIGURED)))
}
