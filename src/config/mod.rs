/// Charm option values supplied by the orchestrator
pub mod charm;

/// Unit state database connection and table creation
pub mod database;

/// Hook settings loading from settings.toml and the environment
pub mod settings;

pub use charm::{CharmConfig, DbRoles};
pub use settings::{Settings, load_app_settings};
