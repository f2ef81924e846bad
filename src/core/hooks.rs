//! Shared handler plumbing: the collaborators a handler may use and the
//! description of what it did.

use crate::core::command::CommandRunner;
use crate::core::layout::Layout;
use crate::core::migrate::PrivilegeGranter;
use crate::core::states::FlagChange;
use crate::core::templates::Templates;

/// External collaborators handed to every handler.
pub struct HookEnv<'a> {
    /// Runs external tools
    pub runner: &'a dyn CommandRunner,
    /// Issues privilege grants on the admin database
    pub granter: &'a dyn PrivilegeGranter,
    /// Built-in templates
    pub templates: &'a Templates,
    /// Where the service lives on disk
    pub layout: &'a Layout,
}

/// How a handler invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Preconditions did not hold; nothing was touched
    Skipped,
    /// A precondition outside the trigger was not met yet; retried on the next event
    Deferred(String),
    /// Operator action is required
    Blocked(String),
    /// The handler ran to completion
    Completed,
}

/// Result of a handler: its disposition plus the effects the dispatcher
/// must apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutcome {
    /// How the invocation ended
    pub disposition: Disposition,
    /// Flags to set
    pub flags: Vec<FlagChange>,
    /// Archive packages to install
    pub queued_installs: Vec<String>,
}

impl HookOutcome {
    /// Nothing ran.
    #[must_use]
    pub const fn skipped() -> Self {
        Self::with(Disposition::Skipped)
    }

    /// Retry on a later event because of `reason`.
    #[must_use]
    pub fn deferred(reason: &str) -> Self {
        Self::with(Disposition::Deferred(reason.to_string()))
    }

    /// Operator action needed, as described by `message`.
    #[must_use]
    pub fn blocked(message: &str) -> Self {
        Self::with(Disposition::Blocked(message.to_string()))
    }

    /// Ran to completion with no effects yet.
    #[must_use]
    pub const fn completed() -> Self {
        Self::with(Disposition::Completed)
    }

    /// Adds a flag to set once the outcome is applied.
    #[must_use]
    pub fn set_flag(mut self, flag: FlagChange) -> Self {
        self.flags.push(flag);
        self
    }

    /// Asks for `packages` to be installed from the upstream archive.
    #[must_use]
    pub fn queue_install<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queued_installs
            .extend(packages.into_iter().map(Into::into));
        self
    }

    const fn with(disposition: Disposition) -> Self {
        Self {
            disposition,
            flags: Vec::new(),
            queued_installs: Vec::new(),
        }
    }
}
