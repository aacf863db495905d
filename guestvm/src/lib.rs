//! guestvm: lifecycle management for a single profile-driven guest VM.
//!
//! A JSON profile describes the guest's hardware. [`ProfileLoader`] decodes
//! it, [`ConfigurationBuilder`] turns it into a [`PlatformConfiguration`]
//! and [`LifecycleController`] boots and stops the guest through a
//! [`VirtualizationPlatform`], publishing progress on a [`StatusReporter`].

pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod options;
pub mod platform;
pub mod profile;
pub mod status;
pub mod util;

pub use config::{ConfigurationBuilder, PlatformConfiguration};
pub use guestvm_shared::errors::{GuestVmError, GuestVmResult};
pub use lifecycle::{LifecycleController, LifecycleStatus};
pub use logging::{LogGuard, init_logging};
pub use options::{GuestVmOptions, LoggingOptions};
pub use platform::{
    RenderSurface, RenderTarget, VirtualMachine, VirtualizationPlatform,
    vfkit::{VfkitDisplay, VfkitOptions, VfkitPlatform},
};
pub use profile::{Profile, ProfileLoader};
pub use status::StatusReporter;
