//! Error types for guestvm.

use thiserror::Error;

/// Result alias used throughout guestvm.
pub type GuestVmResult<T> = Result<T, GuestVmError>;

/// Every failure guestvm can report.
///
/// The first six variants are the lifecycle taxonomy: each one maps to a
/// single human-readable log line when it reaches the lifecycle controller.
#[derive(Error, Debug)]
pub enum GuestVmError {
    /// Profile document (or another host file) could not be read.
    #[error("I/O error: {0}")]
    Io(String),

    /// Profile bytes are not well-formed or a field is missing/mistyped.
    #[error("malformed profile: {0}")]
    Decode(String),

    /// The assembled configuration was rejected.
    #[error("configuration rejected: {0}")]
    Validation(String),

    /// Missing or unusable render target at start time.
    #[error("render target unavailable: {0}")]
    Capability(String),

    /// Platform refused or failed to boot the guest.
    #[error("failed to start virtual machine: {0}")]
    Start(String),

    /// Platform failed to cleanly halt the guest.
    #[error("failed to stop virtual machine: {0}")]
    Stop(String),

    /// Operation is not allowed in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Backend plumbing failure (missing binary, spawn error, ...).
    #[error("platform error: {0}")]
    Platform(String),

    /// Invalid options or logging setup.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for GuestVmError {
    fn from(err: std::io::Error) -> Self {
        GuestVmError::Io(err.to_string())
    }
}
