//! Unit state database configuration.
//!
//! The hooks keep their local states in a small `SQLite` database next to the
//! charm. Tables are generated from the entity definitions with `SeaORM`'s
//! `Schema::create_table_from_entity`, guarded with `IF NOT EXISTS` because
//! every hook invocation opens the database afresh.

use crate::entities::UnitState;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::debug;

/// Default location of the unit state database, relative to the charm directory.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://.unit-state.db?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable, if set.
#[must_use]
pub fn database_url_from_env() -> Option<String> {
    std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())
}

/// Connects to the unit state database and makes sure its tables exist.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Opening unit state database at {}", database_url);
    let db = Database::connect(database_url).await?;
    create_tables(&db).await?;
    Ok(db)
}

/// Creates the `unit_state` table if it is missing.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut unit_state_table = schema.create_table_from_entity(UnitState);
    unit_state_table.if_not_exists();

    db.execute(builder.build(&unit_state_table)).await?;
    Ok(())
}
