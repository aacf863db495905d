//! Lifecycle status of the managed guest.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the controller is in the load/start/stop cycle.
///
/// The ordering (`Unloaded < Loaded < Starting < Started < Halting < Error`)
/// exists so consumers can gate actions with comparisons, e.g. a "load"
/// button enabled while `status <= Loaded`. It is not a linear progression:
/// `Error` is entered from `Starting` and left only by a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    /// No profile loaded yet.
    Unloaded,
    /// A profile is held and no guest is running.
    Loaded,
    /// Start requested, waiting for the platform.
    Starting,
    /// Guest is running.
    Started,
    /// Stop requested, waiting for the platform.
    Halting,
    /// Start failed. Terminal until the next successful load.
    Error,
}

impl LifecycleStatus {
    /// A new profile may be selected.
    pub fn can_load(&self) -> bool {
        *self <= LifecycleStatus::Loaded
    }

    /// A start request would be accepted (status-wise).
    pub fn can_start(&self) -> bool {
        matches!(self, LifecycleStatus::Loaded)
    }

    /// A stop request would be accepted. While `Starting` the stop is queued
    /// until the platform answers.
    ///
    /// A controller reloaded over a running guest also accepts a stop from
    /// `Loaded`; check `has_vm` for that case.
    pub fn can_stop(&self) -> bool {
        matches!(self, LifecycleStatus::Starting | LifecycleStatus::Started)
    }

    /// Platform work is in flight or a guest is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            LifecycleStatus::Starting | LifecycleStatus::Started | LifecycleStatus::Halting
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Unloaded => "unloaded",
            LifecycleStatus::Loaded => "loaded",
            LifecycleStatus::Starting => "starting",
            LifecycleStatus::Started => "started",
            LifecycleStatus::Halting => "halting",
            LifecycleStatus::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleStatus::*;

    #[test]
    fn test_ordering() {
        assert!(Unloaded < Loaded);
        assert!(Loaded < Starting);
        assert!(Starting < Started);
        assert!(Started < Halting);
        assert!(Halting < Error);
    }

    #[test]
    fn test_action_gates() {
        assert!(Unloaded.can_load() && Loaded.can_load());
        assert!(!Started.can_load() && !Error.can_load());

        assert!(Loaded.can_start());
        assert!(!Unloaded.can_start() && !Starting.can_start() && !Error.can_start());

        assert!(Started.can_stop() && Starting.can_stop());
        assert!(!Halting.can_stop() && !Loaded.can_stop() && !Error.can_stop());

        assert!(Starting.is_active() && Started.is_active() && Halting.is_active());
        assert!(!Error.is_active() && !Loaded.is_active());
    }

    #[test]
    fn test_display() {
        assert_eq!(Halting.to_string(), "halting");
    }
}
