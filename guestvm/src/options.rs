//! Controller options.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const ENV_LOG_DIR: &str = "GUESTVM_LOG_DIR";
const ENV_NO_CHDIR: &str = "GUESTVM_NO_CHDIR";

/// Options for a [`LifecycleController`](crate::LifecycleController).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestVmOptions {
    /// After a successful load, change the working directory to the
    /// profile's parent so relative paths in it resolve against the profile.
    pub follow_profile_directory: bool,
    /// Switch the host terminal to raw mode while a guest owns the console.
    pub raw_terminal: bool,
    pub logging: LoggingOptions,
}

impl Default for GuestVmOptions {
    fn default() -> Self {
        Self {
            follow_profile_directory: true,
            raw_terminal: true,
            logging: LoggingOptions::default(),
        }
    }
}

impl GuestVmOptions {
    /// Defaults with environment overrides applied.
    ///
    /// - `GUESTVM_LOG_DIR`: directory for `guestvm.log`
    /// - `GUESTVM_NO_CHDIR`: any non-empty value other than `0` keeps the
    ///   working directory fixed across loads
    pub fn from_env() -> Self {
        let mut options = Self::default();
        options.apply_env(|key| std::env::var(key).ok());
        options
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|v| !v.is_empty()) {
            self.logging.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = lookup(ENV_NO_CHDIR) {
            if !value.is_empty() && value != "0" {
                self.follow_profile_directory = false;
            }
        }
    }
}

/// Where and how much to log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for the log file. No file logging when unset.
    pub log_dir: Option<PathBuf>,
    /// Filter for the file layer when `RUST_LOG` is unset.
    pub file_filter: String,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            log_dir: None,
            file_filter: "info".to_string(),
        }
    }
}
