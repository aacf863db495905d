//! Observable status and log state.
//!
//! The reporter holds exactly one current log line and one current
//! [`LifecycleStatus`]. Both live in `tokio::sync::watch` channels: any
//! number of observers can subscribe, the last write wins, and a new
//! observer sees only the current value, never earlier ones.

use crate::lifecycle::LifecycleStatus;
use std::sync::Arc;
use tokio::sync::watch;

const INITIAL_LOG: &str = "info: load a profile to begin";

/// Publishes the controller's status and most recent log message.
///
/// Cheap to clone; all clones share the same channels.
#[derive(Clone, Debug)]
pub struct StatusReporter {
    log: Arc<watch::Sender<String>>,
    status: Arc<watch::Sender<LifecycleStatus>>,
}

impl StatusReporter {
    pub fn new() -> Self {
        let (log, _) = watch::channel(INITIAL_LOG.to_string());
        let (status, _) = watch::channel(LifecycleStatus::Unloaded);
        Self {
            log: Arc::new(log),
            status: Arc::new(status),
        }
    }

    /// Current status.
    pub fn status(&self) -> LifecycleStatus {
        *self.status.borrow()
    }

    /// Current log message.
    pub fn log(&self) -> String {
        self.log.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<LifecycleStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_log(&self) -> watch::Receiver<String> {
        self.log.subscribe()
    }

    pub(crate) fn set_status(&self, status: LifecycleStatus) {
        let old = self.status.send_replace(status);
        tracing::debug!(old_status = %old, new_status = %status, "Lifecycle status changed");
    }

    /// Replace the log message with an informational line.
    pub(crate) fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{}", message);
        self.log.send_replace(format!("info: {}", message));
    }

    /// Replace the log message with an error line.
    pub(crate) fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!("{}", message);
        self.log.send_replace(format!("error: {}", message));
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}
