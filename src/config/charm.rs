//! Charm configuration bag.
//!
//! The orchestrator hands the hooks a fresh set of option values on every
//! event. Every option is optional here; handlers decide what a missing value
//! means for them.

use serde::Deserialize;

/// Listening port used when the `port` option is not set.
pub const DEFAULT_PORT: u16 = 8000;

/// Option values supplied by the operator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CharmConfig {
    /// Database the service expects its relations to point at
    pub db_name: Option<String>,
    /// Roles that receive default privileges on migrated tables
    pub db_roles: Option<DbRoles>,
    /// Deployment environment (`development`, `staging`, `production`, ...)
    pub environment: Option<String>,
    /// Express session secret; required
    pub session_secret: Option<String>,
    /// Secret for sessions stored in memcache; required
    pub memcache_session_secret: Option<String>,
    /// Sentry DSN for error reporting
    pub sentry_dsn: Option<String>,
    /// Launchpad API username
    pub lp_api_username: Option<String>,
    /// Launchpad API consumer key
    pub lp_api_consumer_key: Option<String>,
    /// Launchpad API token
    pub lp_api_token: Option<String>,
    /// Launchpad API token secret
    pub lp_api_token_secret: Option<String>,
    /// GitHub OAuth client id
    pub github_auth_client_id: Option<String>,
    /// GitHub OAuth client secret
    pub github_auth_client_secret: Option<String>,
    /// Secret used to verify GitHub webhooks
    pub github_webhook_secret: Option<String>,
    /// Outbound HTTP proxy for the service
    pub http_proxy: Option<String>,
    /// Whitespace-separated list of trusted networks
    pub trusted_networks: Option<String>,
    /// Port the web service listens on
    pub port: Option<u16>,
}

/// `db_roles` may be given either as a single role or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DbRoles {
    /// A single role name
    One(String),
    /// Several role names
    Many(Vec<String>),
}

impl DbRoles {
    /// Flattens the option into a list of role names.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(role) => vec![role.clone()],
            Self::Many(roles) => roles.clone(),
        }
    }
}

impl CharmConfig {
    /// The configured database name, or an empty string.
    #[must_use]
    pub fn db_name(&self) -> &str {
        self.db_name.as_deref().unwrap_or_default()
    }

    /// The deployment environment, or an empty string.
    #[must_use]
    pub fn environment(&self) -> &str {
        self.environment.as_deref().unwrap_or_default()
    }

    /// Roles to grant privileges to; empty when none are configured.
    #[must_use]
    pub fn db_roles(&self) -> Vec<String> {
        self.db_roles.as_ref().map(DbRoles::to_vec).unwrap_or_default()
    }

    /// Trusted networks split on whitespace.
    #[must_use]
    pub fn trusted_networks(&self) -> Vec<String> {
        self.trusted_networks
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Listening port, [`DEFAULT_PORT`] when unset.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

/// Returns the value of an optional string option, treating unset as empty.
#[must_use]
pub fn or_empty(value: Option<&String>) -> String {
    value.cloned().unwrap_or_default()
}
