//! Reads profile documents from disk.

use super::Profile;
use guestvm_shared::errors::{GuestVmError, GuestVmResult};
use std::path::Path;

/// Loads [`Profile`]s from JSON documents.
///
/// Loading is all-or-nothing: the caller only ever receives a fully decoded
/// profile, so whatever profile it held before survives a failed load.
pub struct ProfileLoader;

impl ProfileLoader {
    /// Read and decode the profile at `path`.
    ///
    /// # Errors
    ///
    /// - [`GuestVmError::Io`] if the file cannot be read
    /// - [`GuestVmError::Decode`] if the bytes are not a valid profile
    pub fn load(path: &Path) -> GuestVmResult<Profile> {
        let bytes = std::fs::read(path)
            .map_err(|e| GuestVmError::Io(format!("{}: {}", path.display(), e)))?;

        let profile = Profile::from_slice(&bytes).map_err(|e| match e {
            GuestVmError::Decode(msg) => {
                GuestVmError::Decode(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;

        tracing::debug!(
            path = %path.display(),
            cpus = profile.cpu_count,
            memory_mb = profile.memory_megabytes,
            uefi = profile.uefi_enabled,
            disks = profile.storage_paths.len(),
            shares = profile.shared_paths.len(),
            network = profile.network_enabled,
            "Decoded profile"
        );

        Ok(profile)
    }
}
