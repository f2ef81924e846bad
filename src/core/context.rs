//! Per-event hook context.
//!
//! The orchestrator describes each event with a TOML document: the current
//! charm configuration, leadership, leader settings and the data published on
//! the database and cache relations. Together with the unit's persisted
//! states this forms the [`HookContext`] handed to every handler.

use crate::config::CharmConfig;
use crate::core::states::{StateSet, leader_state};
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Set when the `db` relation has a master connection.
pub const DB_MASTER_AVAILABLE: &str = "db.master.available";
/// Set when the `db-admin` relation has a master connection.
pub const DB_ADMIN_MASTER_AVAILABLE: &str = "db-admin.master.available";
/// Set when at least one memcache host is known.
pub const CACHE_AVAILABLE: &str = "cache.available";
/// Set on the elected leader.
pub const IS_LEADER: &str = "leadership.is_leader";

/// Master connection published on a PostgreSQL relation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PgMaster {
    /// Database the provider granted access to
    pub dbname: String,
    /// libpq connection URI
    pub uri: String,
}

/// A PostgreSQL relation. `master` is absent until the provider is ready.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PgRelation {
    /// Primary connection details
    pub master: Option<PgMaster>,
}

impl PgRelation {
    /// The master connection, if it points at `db_name`.
    #[must_use]
    pub fn master_for(&self, db_name: &str) -> Option<&PgMaster> {
        self.master.as_ref().filter(|master| master.dbname == db_name)
    }
}

/// The memcache relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheRelation {
    /// `host:port` entries, in whatever order the relation reports them
    pub memcache_hosts: Vec<String>,
}

impl CacheRelation {
    /// Hosts sorted so rendered files do not depend on relation order.
    #[must_use]
    pub fn sorted_hosts(&self) -> Vec<String> {
        let mut hosts = self.memcache_hosts.clone();
        hosts.sort();
        hosts
    }
}

/// Runtime mode of the Node.js service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEnv {
    /// `NODE_ENV=production`
    Production,
    /// `NODE_ENV=development`
    Development,
}

impl NodeEnv {
    /// Staging and production deployments run in production mode.
    #[must_use]
    pub fn for_environment(environment: &str) -> Self {
        match environment {
            "staging" | "production" => Self::Production,
            _ => Self::Development,
        }
    }

    /// Value for `NODE_ENV` and the knexfile environment key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

/// Event description as supplied by the orchestrator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventData {
    /// Current option values
    pub config: CharmConfig,
    /// Whether this unit is the elected leader
    pub is_leader: bool,
    /// Leader settings; empty values count as unset
    pub leader_settings: BTreeMap<String, String>,
    /// Data on the `db` relation, if joined
    pub db: Option<PgRelation>,
    /// Data on the `db-admin` relation, if joined
    pub db_admin: Option<PgRelation>,
    /// Data on the memcache relation, if joined
    pub cache: Option<CacheRelation>,
}

/// Everything a handler may look at.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    /// Charm configuration for this event
    pub config: CharmConfig,
    /// Leader settings, including any published during this dispatch
    pub leader_settings: BTreeMap<String, String>,
    /// The `db` relation
    pub db: Option<PgRelation>,
    /// The `db-admin` relation
    pub db_admin: Option<PgRelation>,
    /// The memcache relation
    pub cache: Option<CacheRelation>,
    /// Active states; leadership is visible as `leadership.is_leader`
    pub states: StateSet,
}

impl HookContext {
    /// Combines event data with the unit's persisted local states.
    ///
    /// Relation, leadership and leader-setting states are derived from the
    /// event data and added to `local_states`.
    #[must_use]
    pub fn new<I, S>(event: EventData, local_states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut states: StateSet = local_states.into_iter().collect();

        if event.db.as_ref().is_some_and(|db| db.master.is_some()) {
            states.set(DB_MASTER_AVAILABLE);
        }
        if event.db_admin.as_ref().is_some_and(|db| db.master.is_some()) {
            states.set(DB_ADMIN_MASTER_AVAILABLE);
        }
        if event
            .cache
            .as_ref()
            .is_some_and(|cache| !cache.memcache_hosts.is_empty())
        {
            states.set(CACHE_AVAILABLE);
        }
        if event.is_leader {
            states.set(IS_LEADER);
        }
        for (key, value) in &event.leader_settings {
            if !value.is_empty() {
                states.set(&leader_state(key));
            }
        }

        Self {
            config: event.config,
            leader_settings: event.leader_settings,
            db: event.db,
            db_admin: event.db_admin,
            cache: event.cache,
            states,
        }
    }

    /// Node.js runtime mode derived from the `environment` option.
    #[must_use]
    pub fn node_env(&self) -> NodeEnv {
        NodeEnv::for_environment(self.config.environment())
    }
}

/// Parses event data from TOML.
pub fn parse_event(contents: &str) -> Result<EventData> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse hook context: {e}"),
    })
}

/// Reads event data from a TOML file.
pub fn load_event<P: AsRef<Path>>(path: P) -> Result<EventData> {
    let path_ref = path.as_ref();
    debug!("Loading hook context from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read hook context {}: {e}", path_ref.display()),
    })?;
    parse_event(&contents)
}
