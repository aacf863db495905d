//! Virtualization platform seam.
//!
//! The lifecycle controller never touches emulation internals. Everything it
//! needs from a hypervisor goes through these traits:
//!
//! - [`VirtualizationPlatform`]: spawning side (variable stores, validation, boot)
//! - [`VirtualMachine`]: runtime side of one booted guest (stop, halt events)
//! - [`RenderSurface`]: the host surface guest graphics are drawn onto
//!
//! The split mirrors spawn vs runtime: a platform boots a configuration and
//! hands back a machine, and the machine is all the controller keeps.

pub mod vfkit;

use crate::config::{EfiVariableStore, PlatformConfiguration};
use guestvm_shared::errors::GuestVmResult;
use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Host surface for guest graphics, supplied by the UI layer.
pub type RenderTarget = Arc<dyn RenderSurface>;

/// Opaque render surface.
///
/// The core only checks that a surface is present and available; binding it
/// to a configuration is the platform's job.
pub trait RenderSurface: Send + Sync + std::fmt::Debug {
    /// Whether the surface can currently receive guest output.
    fn is_available(&self) -> bool {
        true
    }

    /// Downcast hook for platforms that need their concrete surface type.
    fn as_any(&self) -> &dyn Any;
}

/// Spawning side of a hypervisor backend.
#[async_trait::async_trait]
pub trait VirtualizationPlatform: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Create (or, with `allow_overwrite`, replace) a UEFI variable store.
    fn create_efi_variable_store(
        &self,
        path: &Path,
        allow_overwrite: bool,
    ) -> GuestVmResult<EfiVariableStore>;

    /// Structural validation of an assembled configuration.
    fn validate(&self, config: &PlatformConfiguration) -> GuestVmResult<()>;

    /// Boot a guest from `config`, drawing its display onto `target`.
    ///
    /// Resolves once the platform knows whether the guest started.
    async fn start(
        &self,
        config: PlatformConfiguration,
        target: RenderTarget,
    ) -> GuestVmResult<Arc<dyn VirtualMachine>>;
}

/// Runtime side of one booted guest.
#[async_trait::async_trait]
pub trait VirtualMachine: Send + Sync {
    /// Register for the guest-initiated halt notification.
    ///
    /// The receiver fires if the guest shuts itself down without a host stop
    /// request. It errors (sender dropped) once the machine is gone for any
    /// other reason. A later subscription replaces an earlier one.
    fn subscribe_guest_halt(&self) -> oneshot::Receiver<()>;

    /// Request an orderly stop and wait for it to finish.
    async fn stop(&self) -> GuestVmResult<()>;
}
