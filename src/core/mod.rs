//! Hook logic - handlers, their collaborators and the dispatcher.
//!
//! Handlers take a [`context::HookContext`] and a [`hooks::HookEnv`] and
//! return a [`hooks::HookOutcome`] describing the flags to set. Nothing here
//! knows how the orchestrator delivers events.

pub mod apt;
pub mod command;
pub mod configure;
pub mod context;
pub mod dispatch;
pub mod hook_tools;
pub mod hooks;
pub mod layout;
pub mod migrate;
pub mod runtime;
pub mod states;
pub mod templates;
pub mod watch;
