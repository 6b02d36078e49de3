//! Tracker configuration.
//!
//! Installed once at startup via [`crate::tracker::install`]; the defaults
//! match the behavior native collaborators are written against.

use core::fmt;
use std::rc::Rc;

/// Hook invoked with the exit code when an error callback itself fails and
/// the process must terminate.
pub type ExitFn = Rc<dyn Fn(i32)>;

/// Policy for a create phase entered while the active context has no
/// listeners.
///
/// The native collaborator contract requires consulting the status word
/// before invoking the create phase, so an empty queue signals a
/// collaborator bug. Embedders that have proven the invariant unreachable
/// may downgrade the response to a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyCreatePolicy {
    /// Treat as a fatal programming error (panic).
    #[default]
    Abort,
    /// Return without touching the new context.
    Ignore,
}

/// Configuration for the execution-context tracker.
#[derive(Clone, Default)]
pub struct TrackerConfig {
    /// Response to a create phase with an empty active queue.
    pub empty_create: EmptyCreatePolicy,
    exit_hook: Option<ExitFn>,
}

impl TrackerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the empty-create policy.
    #[must_use]
    pub fn with_empty_create(mut self, policy: EmptyCreatePolicy) -> Self {
        self.empty_create = policy;
        self
    }

    /// Installs the exit-notification hook.
    #[must_use]
    pub fn with_exit_hook(mut self, hook: impl Fn(i32) + 'static) -> Self {
        self.exit_hook = Some(Rc::new(hook));
        self
    }

    pub(crate) fn exit_hook(&self) -> Option<ExitFn> {
        self.exit_hook.clone()
    }
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("empty_create", &self.empty_create)
            .field("exit_hook", &self.exit_hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_aborts() {
        assert_eq!(TrackerConfig::new().empty_create, EmptyCreatePolicy::Abort);
    }

    #[test]
    fn builder_sets_fields() {
        let config = TrackerConfig::new()
            .with_empty_create(EmptyCreatePolicy::Ignore)
            .with_exit_hook(|_code| {});
        assert_eq!(config.empty_create, EmptyCreatePolicy::Ignore);
        assert!(config.exit_hook().is_some());
        let dbg = format!("{config:?}");
        assert!(dbg.contains("exit_hook: true"), "{dbg}");
    }
}
