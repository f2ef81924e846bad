//! Entity module - SeaORM entity definitions for the local unit database.

pub mod unit_state;

pub use unit_state::{Entity as UnitState, Model as UnitStateModel};
