//! vfkit backend.
//!
//! Drives the `vfkit` command-line VMM (a front end for Apple's
//! Virtualization.framework) as a child process. The configuration is
//! translated into vfkit arguments, the guest console is the child's
//! inherited stdio, and the child exiting on its own is the guest halt.

mod args;
mod machine;

pub use machine::VfkitMachine;

use crate::config::{BootLoader, EfiVariableStore, PlatformConfiguration};
use crate::platform::{RenderSurface, RenderTarget, VirtualMachine, VirtualizationPlatform};
use guestvm_shared::errors::{GuestVmError, GuestVmResult};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Common install locations (Homebrew on Apple Silicon and Intel).
const VFKIT_CANDIDATES: &[&str] = &["/opt/homebrew/bin/vfkit", "/usr/local/bin/vfkit"];

/// How vfkit presents the guest display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfkitDisplay {
    /// Open a vfkit window bound to the guest GPU.
    Window,
    /// Keep the GPU device but show no window.
    Headless,
}

impl RenderSurface for VfkitDisplay {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VfkitOptions {
    /// Explicit vfkit binary. Looked up on `PATH` and in Homebrew
    /// locations when unset.
    pub binary: Option<PathBuf>,
    /// How long the child must stay alive before the guest counts as started.
    pub boot_grace: Duration,
    /// How long a stop waits after SIGTERM before sending SIGKILL.
    pub stop_timeout: Duration,
}

impl Default for VfkitOptions {
    fn default() -> Self {
        Self {
            binary: None,
            boot_grace: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(30),
        }
    }
}

/// [`VirtualizationPlatform`] backed by the vfkit binary.
///
/// vfkit covers less than the profile can describe:
///
/// - A sharing device mounts exactly one directory, so a profile sharing
///   several directories fails validation.
/// - There is no SPICE agent port. The device is dropped with a warning and
///   clipboard sharing is unavailable.
#[derive(Debug)]
pub struct VfkitPlatform {
    binary: PathBuf,
    options: VfkitOptions,
}

impl VfkitPlatform {
    /// Resolve the vfkit binary and build the platform.
    ///
    /// # Errors
    ///
    /// Returns [`GuestVmError::Platform`] if no vfkit binary can be found.
    pub fn new(options: VfkitOptions) -> GuestVmResult<Self> {
        let binary = match &options.binary {
            Some(path) if path.is_file() => path.clone(),
            Some(path) => {
                return Err(GuestVmError::Platform(format!(
                    "vfkit binary not found at {}",
                    path.display()
                )));
            }
            None => find_vfkit()?,
        };
        tracing::debug!(binary = %binary.display(), "Using vfkit");
        Ok(Self { binary, options })
    }
}

fn find_vfkit() -> GuestVmResult<PathBuf> {
    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join("vfkit");
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    VFKIT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            GuestVmError::Platform(
                "vfkit binary not found. Install it with: brew install vfkit".into(),
            )
        })
}

fn require_file(config: &PlatformConfiguration, what: &str, path: &Path) -> GuestVmResult<()> {
    if config.resolve(path).is_file() {
        Ok(())
    } else {
        Err(GuestVmError::Validation(format!(
            "{} not found: {}",
            what,
            path.display()
        )))
    }
}

#[async_trait::async_trait]
impl VirtualizationPlatform for VfkitPlatform {
    fn name(&self) -> &str {
        "vfkit"
    }

    fn create_efi_variable_store(
        &self,
        path: &Path,
        allow_overwrite: bool,
    ) -> GuestVmResult<EfiVariableStore> {
        if path.exists() {
            if !allow_overwrite {
                return Ok(EfiVariableStore::new(path, false));
            }
            std::fs::remove_file(path).map_err(|e| {
                GuestVmError::Io(format!(
                    "cannot replace EFI variable store {}: {}",
                    path.display(),
                    e
                ))
            })?;
            tracing::debug!(path = %path.display(), "Removed previous EFI variable store");
        }
        // vfkit creates the store itself when asked to.
        Ok(EfiVariableStore::new(path, true))
    }

    fn validate(&self, config: &PlatformConfiguration) -> GuestVmResult<()> {
        if let BootLoader::LinuxKernel { kernel, initrd, .. } = config.boot_loader() {
            require_file(config, "kernel", kernel)?;
            if let Some(initrd) = initrd {
                require_file(config, "initrd", initrd)?;
            }
        }

        for disk in config.storage_devices() {
            require_file(config, "disk image", &disk.image_path)?;
        }

        for gpu in config.graphics_devices() {
            if gpu
                .scanouts
                .iter()
                .any(|s| s.width_in_pixels == 0 || s.height_in_pixels == 0)
            {
                return Err(GuestVmError::Validation(
                    "display scanout has a zero dimension".into(),
                ));
            }
        }

        if config.network_devices().len() > 1 {
            return Err(GuestVmError::Validation(
                "vfkit supports a single NAT network device".into(),
            ));
        }

        for fs in config.directory_sharing_devices() {
            let mut count = 0;
            for (_, dir) in fs.share.directories() {
                if !config.resolve(&dir.path).is_dir() {
                    return Err(GuestVmError::Validation(format!(
                        "shared directory not found: {}",
                        dir.path.display()
                    )));
                }
                count += 1;
            }
            // One virtio-fs device per tag, one directory per device.
            if count > 1 {
                return Err(GuestVmError::Validation(format!(
                    "vfkit shares one directory per mount tag, {} given for tag {}",
                    count, fs.tag
                )));
            }
        }

        Ok(())
    }

    async fn start(
        &self,
        config: PlatformConfiguration,
        target: RenderTarget,
    ) -> GuestVmResult<Arc<dyn VirtualMachine>> {
        let display = *target.as_any().downcast_ref::<VfkitDisplay>().ok_or_else(|| {
            GuestVmError::Capability(format!(
                "vfkit cannot draw onto render target {:?}",
                target
            ))
        })?;

        let args = args::build_vfkit_args(&config, display);
        tracing::info!(
            binary = %self.binary.display(),
            cwd = %config.working_directory().display(),
            args = ?args,
            "Spawning vfkit"
        );

        // Relative paths were validated against the build-time directory.
        let mut child = Command::new(&self.binary)
            .args(&args)
            .current_dir(config.working_directory())
            .spawn()
            .map_err(|e| GuestVmError::Start(format!("failed to spawn vfkit: {}", e)))?;

        let pid = child
            .id()
            .ok_or_else(|| GuestVmError::Start("vfkit exited before reporting a pid".into()))?;

        match tokio::time::timeout(self.options.boot_grace, child.wait()).await {
            Ok(Ok(status)) => {
                return Err(GuestVmError::Start(format!(
                    "vfkit exited during boot with {}",
                    status
                )));
            }
            Ok(Err(e)) => {
                return Err(GuestVmError::Start(format!(
                    "failed to wait for vfkit: {}",
                    e
                )));
            }
            Err(_) => {}
        }

        tracing::info!(pid, "vfkit guest running");
        Ok(Arc::new(VfkitMachine::monitor(
            child,
            pid,
            self.options.stop_timeout,
        )))
    }
}
