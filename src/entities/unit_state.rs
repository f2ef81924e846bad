//! Unit state entity - Persists the reactive states that belong to this unit.
//! A row's presence means the state is set; `value` carries optional data
//! such as the package list behind `apt.queued_installs`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Unit state database model - one row per active state
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "unit_state")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// State name (e.g., `"service.configured"`)
    #[sea_orm(unique)]
    pub name: String,
    /// Optional payload attached to the state
    pub value: Option<String>,
    /// When this state was last written
    pub updated_at: DateTime,
}

/// `UnitState` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
