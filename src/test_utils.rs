//! Shared test utilities.
//!
//! Provides an in-memory unit state database, fakes for the command runner
//! and the privilege granter, and a [`TestHarness`] that lays the service
//! out under a temporary directory.

use crate::{
    config::CharmConfig,
    core::{
        command::{CommandOutput, CommandRunner, CommandSpec},
        context::{CacheRelation, EventData, HookContext, PgMaster, PgRelation},
        hooks::HookEnv,
        layout::Layout,
        migrate::PrivilegeGranter,
        states::MIGRATED,
        templates::Templates,
    },
    errors::Result,
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    crate::config::database::create_connection("sqlite::memory:").await
}

/// Installs a test-writer subscriber; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Records every command and answers with scripted output.
///
/// Commands without a scripted response succeed with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    responses: Vec<(String, CommandOutput)>,
    specs: Mutex<Vec<CommandSpec>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every invocation of `program` with `output`.
    pub fn respond(mut self, program: &str, output: CommandOutput) -> Self {
        self.responses.push((program.to_string(), output));
        self
    }

    /// Commands run so far, rendered as command lines.
    pub fn calls(&self) -> Vec<String> {
        self.specs().iter().map(ToString::to_string).collect()
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.specs
            .lock()
            .map(|specs| specs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        if let Ok(mut specs) = self.specs.lock() {
            specs.push(spec.clone());
        }
        Ok(self
            .responses
            .iter()
            .find(|(program, _)| *program == spec.program)
            .map_or_else(|| CommandOutput::ok(""), |(_, output)| output.clone()))
    }
}

/// Records grant executions instead of talking to PostgreSQL.
#[derive(Default)]
pub struct RecordingGranter {
    executions: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingGranter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(uri, statements)` for every execution so far.
    pub fn executions(&self) -> Vec<(String, Vec<String>)> {
        self.executions
            .lock()
            .map(|executions| executions.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PrivilegeGranter for RecordingGranter {
    async fn execute(&self, uri: &str, statements: &[String]) -> Result<()> {
        if let Ok(mut executions) = self.executions.lock() {
            executions.push((uri.to_string(), statements.to_vec()));
        }
        Ok(())
    }
}

/// A service layout rooted in a temporary directory plus a mutable event.
pub struct TestHarness {
    dir: TempDir,
    pub layout: Layout,
    pub templates: Templates,
    pub granter: RecordingGranter,
    pub event: EventData,
    pub local_states: Vec<String>,
}

impl TestHarness {
    /// Fresh layout under a temporary directory, with `db_name` set to
    /// `snap-build` and nothing else configured.
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        let layout = Layout::new(
            "snap-build",
            &root.join("srv"),
            &root.join("systemd"),
            &root.join("charm"),
        );
        std::fs::create_dir_all(root.join("charm"))?;

        Ok(Self {
            dir,
            layout,
            templates: Templates::new()?,
            granter: RecordingGranter::new(),
            event: EventData {
                config: CharmConfig {
                    db_name: Some("snap-build".to_string()),
                    ..CharmConfig::default()
                },
                ..EventData::default()
            },
            local_states: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn charm_dir(&self) -> PathBuf {
        self.root().join("charm")
    }

    /// Builds the hook context for the current event and local states.
    pub fn context(&self) -> HookContext {
        HookContext::new(self.event.clone(), self.local_states.clone())
    }

    /// Collaborators using `runner` and the harness's own granter.
    pub fn env<'a>(&'a self, runner: &'a dyn CommandRunner) -> HookEnv<'a> {
        self.env_with(runner, &self.granter)
    }

    pub fn env_with<'a>(
        &'a self,
        runner: &'a dyn CommandRunner,
        granter: &'a dyn PrivilegeGranter,
    ) -> HookEnv<'a> {
        HookEnv {
            runner,
            granter,
            templates: &self.templates,
            layout: &self.layout,
        }
    }

    pub fn with_db(&mut self, dbname: &str, uri: &str) {
        self.event.db = Some(pg_relation(dbname, uri));
    }

    pub fn with_admin_db(&mut self, dbname: &str, uri: &str) {
        self.event.db_admin = Some(pg_relation(dbname, uri));
    }

    pub fn with_cache(&mut self, hosts: &[&str]) {
        self.event.cache = Some(CacheRelation {
            memcache_hosts: hosts.iter().map(ToString::to_string).collect(),
        });
    }

    /// Satisfies every precondition of the configuration handler.
    pub fn configure_ready(&mut self) {
        self.event.config.environment = Some("production".to_string());
        self.event.config.session_secret = Some("session".to_string());
        self.event.config.memcache_session_secret = Some("memcache".to_string());
        self.event
            .leader_settings
            .insert(MIGRATED.to_string(), "true".to_string());
        self.with_db("snap-build", "postgresql://app@db/snap-build");
        self.with_cache(&["10.0.0.1:11211"]);
        self.local_states.push("ols.pg.configured".to_string());
        self.local_states.push("ols.service.installed".to_string());
    }
}

fn pg_relation(dbname: &str, uri: &str) -> PgRelation {
    PgRelation {
        master: Some(PgMaster {
            dbname: dbname.to_string(),
            uri: uri.to_string(),
        }),
    }
}
