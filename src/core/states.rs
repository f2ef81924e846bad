//! Reactive states and their persistence.
//!
//! A state is a named boolean that is either set or not. Handlers never set
//! states themselves; they return [`FlagChange`]s and the dispatcher applies
//! them. Local states live in the `unit_state` table; cluster-wide flags are
//! published as leader settings and show up as `leadership.set.<key>`.

use crate::{
    entities::{UnitState, unit_state},
    errors::Result,
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Set once the leader has run the database migrations.
pub const MIGRATED: &str = "migrated";
/// State under which other units observe [`MIGRATED`].
pub const MIGRATED_STATE: &str = "leadership.set.migrated";
/// Set on every unit once its systemd unit has been configured.
pub const SERVICE_CONFIGURED: &str = "service.configured";
/// Set while packages are waiting for the apt layer to install them.
pub const APT_QUEUED_INSTALLS: &str = "apt.queued_installs";

/// Where a flag is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// This unit only
    Local,
    /// Replicated to every unit through leader settings
    Leader,
}

/// A flag a handler asks the dispatcher to set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagChange {
    /// State name for local flags, leader-setting key for leader flags
    pub name: String,
    /// Where the flag is recorded
    pub scope: Scope,
}

impl FlagChange {
    /// A flag stored in this unit's state table.
    #[must_use]
    pub fn local(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scope: Scope::Local,
        }
    }

    /// A flag published to every unit as a leader setting.
    #[must_use]
    pub fn leader(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scope: Scope::Leader,
        }
    }

    /// The state name other handlers observe once this change is applied.
    #[must_use]
    pub fn state_name(&self) -> String {
        match self.scope {
            Scope::Local => self.name.clone(),
            Scope::Leader => leader_state(&self.name),
        }
    }
}

/// State name under which a leader setting is visible.
#[must_use]
pub fn leader_state(key: &str) -> String {
    format!("leadership.set.{key}")
}

/// The set of states active for one hook invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSet {
    states: BTreeSet<String>,
}

impl StateSet {
    /// Marks `name` as set.
    pub fn set(&mut self, name: &str) {
        self.states.insert(name.to_string());
    }

    /// Marks `name` as not set.
    pub fn unset(&mut self, name: &str) {
        self.states.remove(name);
    }

    /// Whether `name` is set.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.states.contains(name)
    }

    /// True if every state in `when` is set and none in `when_not` is.
    #[must_use]
    pub fn satisfies(&self, when: &[&str], when_not: &[&str]) -> bool {
        when.iter().all(|name| self.is_set(name)) && !when_not.iter().any(|name| self.is_set(name))
    }
}

impl<S: Into<String>> FromIterator<S> for StateSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            states: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Loads every persisted local state, ordered by name.
pub async fn load_local_states(db: &DatabaseConnection) -> Result<Vec<unit_state::Model>> {
    UnitState::find()
        .order_by_asc(unit_state::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Returns the stored row for `name`, if the state is set.
pub async fn get_state(db: &DatabaseConnection, name: &str) -> Result<Option<unit_state::Model>> {
    UnitState::find()
        .filter(unit_state::Column::Name.eq(name))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Sets the local state `name`, replacing any value it carried.
pub async fn set_state<C>(db: &C, name: &str, value: Option<String>) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now().naive_utc();

    let existing = UnitState::find()
        .filter(unit_state::Column::Name.eq(name))
        .one(db)
        .await?;

    if let Some(state) = existing {
        let mut active_model: unit_state::ActiveModel = state.into();
        active_model.value = Set(value);
        active_model.updated_at = Set(now);
        active_model.update(db).await?;
    } else {
        let new_state = unit_state::ActiveModel {
            name: Set(name.to_string()),
            value: Set(value),
            updated_at: Set(now),
            ..Default::default()
        };
        new_state.insert(db).await?;
    }

    info!("Set state: {}", name);
    Ok(())
}

/// Removes the local state `name`. Returns whether it was set.
pub async fn remove_state<C>(db: &C, name: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = UnitState::delete_many()
        .filter(unit_state::Column::Name.eq(name))
        .exec(db)
        .await?;
    debug!("Removed state {} ({} rows)", name, result.rows_affected);
    Ok(result.rows_affected > 0)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::setup_test_db;

    #[test]
    fn test_satisfies_requires_all_and_forbids_any() {
        let states: StateSet = ["db.master.available", "cache.available"].into_iter().collect();

        assert!(states.satisfies(&["db.master.available"], &[]));
        assert!(states.satisfies(&["db.master.available", "cache.available"], &["migrated"]));
        assert!(!states.satisfies(&["db.master.available", "ols.configured"], &[]));
        assert!(!states.satisfies(&["db.master.available"], &["cache.available"]));
        assert!(states.satisfies(&[], &[]));
    }

    #[test]
    fn test_flag_change_state_names() {
        assert_eq!(FlagChange::leader(MIGRATED).state_name(), MIGRATED_STATE);
        assert_eq!(
            FlagChange::local(SERVICE_CONFIGURED).state_name(),
            "service.configured"
        );
    }

    #[tokio::test]
    async fn test_set_and_get_state() -> Result<()> {
        let db = setup_test_db().await?;

        assert!(get_state(&db, SERVICE_CONFIGURED).await?.is_none());
        set_state(&db, SERVICE_CONFIGURED, None).await?;

        let state = get_state(&db, SERVICE_CONFIGURED).await?.unwrap();
        assert_eq!(state.name, SERVICE_CONFIGURED);
        assert!(state.value.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_set_state_updates_existing() -> Result<()> {
        let db = setup_test_db().await?;

        set_state(&db, "ols.configured", Some("first".to_string())).await?;
        set_state(&db, "ols.configured", Some("second".to_string())).await?;

        let count = UnitState::find()
            .filter(unit_state::Column::Name.eq("ols.configured"))
            .count(&db)
            .await?;
        assert_eq!(count, 1);
        let state = get_state(&db, "ols.configured").await?.unwrap();
        assert_eq!(state.value.as_deref(), Some("second"));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_and_remove_states() -> Result<()> {
        let db = setup_test_db().await?;
        set_state(&db, "ols.service.installed", None).await?;
        set_state(&db, "ols.configured", None).await?;

        let names: Vec<String> = load_local_states(&db)
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["ols.configured", "ols.service.installed"]);

        assert!(remove_state(&db, "ols.configured").await?);
        assert!(!remove_state(&db, "ols.configured").await?);
        assert_eq!(load_local_states(&db).await?.len(), 1);
        Ok(())
    }
}
