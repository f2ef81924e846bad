//! Leader-only database migration.
//!
//! The elected leader renders an admin knexfile, grants the service roles
//! default privileges on everything the migrations create, runs the knex
//! migrations and finally publishes the `migrated` leader setting. That
//! setting removes the trigger on every unit, so the sequence runs at most
//! once per application. A failed run is simply repeated from the start:
//! grants and migrations are both safe to reapply.

use crate::core::command::{CommandSpec, check_call};
use crate::core::context::{DB_ADMIN_MASTER_AVAILABLE, HookContext, IS_LEADER};
use crate::core::hooks::{HookEnv, HookOutcome};
use crate::core::states::{FlagChange, MIGRATED, MIGRATED_STATE};
use crate::core::templates::{CREDENTIALS_MODE, KNEXFILE_TEMPLATE};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, Database};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// Set by the base layer once the unit's service scaffolding exists.
pub const OLS_CONFIGURED: &str = "ols.configured";

/// Required states for the migration trigger.
pub const WHEN: &[&str] = &[DB_ADMIN_MASTER_AVAILABLE, OLS_CONFIGURED, IS_LEADER];

/// States that must be absent for the migration trigger.
pub const WHEN_NOT: &[&str] = &[MIGRATED_STATE];

/// Quotes a PostgreSQL identifier.
///
/// The identifier must be pure ASCII; embedded double quotes are doubled.
pub fn quote_identifier(identifier: &str) -> Result<String> {
    if !identifier.is_ascii() {
        return Err(Error::NonAsciiIdentifier {
            identifier: identifier.to_string(),
        });
    }
    Ok(format!("\"{}\"", identifier.replace('"', "\"\"")))
}

/// Builds the default-privilege grants for `roles`: full access to tables
/// and sequences created in `public`, but no schema changes.
pub fn default_privilege_statements(roles: &[String]) -> Result<Vec<String>> {
    let quoted = roles
        .iter()
        .map(|role| quote_identifier(role))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    Ok(["TABLES", "SEQUENCES"]
        .iter()
        .map(|objects| {
            format!(
                "ALTER DEFAULT PRIVILEGES IN SCHEMA public\nGRANT ALL PRIVILEGES ON {objects} TO {quoted}\n"
            )
        })
        .collect())
}

/// Executes privilege grants against a database.
#[async_trait]
pub trait PrivilegeGranter: Send + Sync {
    /// Runs `statements` in order over a connection to `uri`.
    async fn execute(&self, uri: &str, statements: &[String]) -> Result<()>;
}

/// Runs grants over a direct `SeaORM` PostgreSQL connection, outside any
/// transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresGranter;

#[async_trait]
impl PrivilegeGranter for PostgresGranter {
    async fn execute(&self, uri: &str, statements: &[String]) -> Result<()> {
        let db = Database::connect(uri).await?;
        for statement in statements {
            debug!("Executing: {}", statement.trim());
            db.execute_unprepared(statement).await?;
        }
        db.close().await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct KnexfileContext<'a> {
    node_env: &'a str,
    db_conn: &'a str,
}

/// Runs the database migrations on the leader, once per application.
#[instrument(skip_all)]
pub async fn migrate(ctx: &HookContext, env: &HookEnv<'_>) -> Result<HookOutcome> {
    if !ctx.states.satisfies(WHEN, WHEN_NOT) {
        debug!("Migration trigger not satisfied; skipping");
        return Ok(HookOutcome::skipped());
    }

    let db_name = ctx.config.db_name();
    let Some(master) = ctx.db_admin.as_ref().and_then(|db| db.master_for(db_name)) else {
        info!("Database context not available yet; skipping");
        return Ok(HookOutcome::deferred("Database context not available yet"));
    };

    let node_env = ctx.node_env().as_str();
    let knexfile = env.layout.knexfile_admin();
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

    // Knex migrations do not manage privileges. General query and
    // manipulation access (no schema modification) is enough for the roles.
    let roles = ctx.config.db_roles();
    if roles.is_empty() {
        warn!("No db_roles configured; not granting default privileges");
    } else {
        let statements = default_privilege_statements(&roles)?;
        env.granter.execute(&master.uri, &statements).await?;
        info!(roles = ?roles, "Granted default privileges");
    }

    let knexfile_arg = knexfile.to_string_lossy().into_owned();
    let migrate_cmd = CommandSpec::new(
        "npm",
        [
            "run",
            "migrate:latest",
            "--",
            "--knexfile",
            knexfile_arg.as_str(),
            "--env",
            node_env,
        ],
    )
    .current_dir(&env.layout.code_dir());
    check_call(env.runner, &migrate_cmd).await?;

    info!("Database migrated");
    Ok(HookOutcome::completed().set_flag(FlagChange::leader(MIGRATED)))
}
