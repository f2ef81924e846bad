//! Orchestrator hook tools.
//!
//! Status reports, leader settings and port registration are all done by
//! invoking the orchestrator's command-line tools.

use crate::core::command::{CommandRunner, CommandSpec, check_call};
use crate::errors::Result;
use std::fmt;
use tracing::info;

/// Workload status shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadState {
    /// Work in progress
    Maintenance,
    /// Service ready
    Active,
    /// Waiting on the operator
    Blocked,
}

impl WorkloadState {
    /// Name accepted by `status-set`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Maintenance => "maintenance",
            Self::Active => "active",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for WorkloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reports `state` with a human readable `message`.
pub async fn status_set(
    runner: &dyn CommandRunner,
    state: WorkloadState,
    message: &str,
) -> Result<()> {
    info!(status = %state, "{}", message);
    check_call(runner, &CommandSpec::new("status-set", [state.as_str(), message])).await
}

/// Publishes a leader setting to every unit of the application.
pub async fn leader_set(runner: &dyn CommandRunner, key: &str, value: &str) -> Result<()> {
    check_call(runner, &CommandSpec::new("leader-set", [format!("{key}={value}")])).await
}

/// Opens `port` so the service is reachable.
///
/// Registration is `open-port` only. `check_name` identifies the check in
/// logs and is not passed to any tool.
pub async fn check_port(runner: &dyn CommandRunner, check_name: &str, port: u16) -> Result<()> {
    info!(check = check_name, port, "Registering service port");
    check_call(runner, &CommandSpec::new("open-port", [format!("{port}/tcp")])).await
}
