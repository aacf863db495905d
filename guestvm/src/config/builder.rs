//! Profile → platform configuration translation.

use super::{
    BootLoader, ConsoleDeviceConfiguration, ConsolePortAttachment, ConsolePortConfiguration,
    DirectoryShare, DirectorySharingDeviceConfiguration, GraphicsDeviceConfiguration,
    KeyboardConfiguration, NetworkAttachment, NetworkDeviceConfiguration, PlatformConfiguration,
    PointingDeviceConfiguration, ScanoutConfiguration, SerialAttachment, SerialPortConfiguration,
    SharedDirectory, StorageDeviceConfiguration,
};
use crate::platform::VirtualizationPlatform;
use crate::profile::Profile;
use guestvm_shared::constants::{
    EFI_VARIABLE_STORE_PATH, MIB, console_ports, display, mount_tags,
};
use guestvm_shared::errors::{GuestVmError, GuestVmResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Builds a [`PlatformConfiguration`] from a [`Profile`].
///
/// The translation is deterministic: the same profile always yields an
/// equivalent configuration. The only platform calls are the UEFI variable
/// store request and the final structural validation, and the result is
/// either fully valid or an error.
pub struct ConfigurationBuilder<'a> {
    platform: &'a dyn VirtualizationPlatform,
}

impl<'a> ConfigurationBuilder<'a> {
    pub fn new(platform: &'a dyn VirtualizationPlatform) -> Self {
        Self { platform }
    }

    /// Assemble and validate the configuration for `profile`.
    ///
    /// # Errors
    ///
    /// Returns [`GuestVmError::Validation`] if the profile has no bootable
    /// target, zero resources, or the platform rejects the assembled devices.
    pub fn build(&self, profile: &Profile) -> GuestVmResult<PlatformConfiguration> {
        if profile.cpu_count == 0 {
            return Err(GuestVmError::Validation(
                "cpu count must be greater than zero".into(),
            ));
        }
        let memory_bytes = match profile.memory_megabytes.checked_mul(MIB) {
            Some(0) => {
                return Err(GuestVmError::Validation(
                    "memory size must be greater than zero".into(),
                ));
            }
            Some(bytes) => bytes,
            None => {
                return Err(GuestVmError::Validation(format!(
                    "memory size of {} MB is out of range",
                    profile.memory_megabytes
                )));
            }
        };

        let working_directory = std::env::current_dir().map_err(|e| {
            GuestVmError::Validation(format!("cannot resolve working directory: {}", e))
        })?;

        let config = PlatformConfiguration {
            cpu_count: profile.cpu_count,
            memory_bytes,
            boot_loader: self.boot_loader(profile)?,
            serial_ports: vec![stdio_serial_port()],
            console_devices: vec![agent_console_device()],
            graphics_devices: vec![graphics_device()],
            keyboards: vec![KeyboardConfiguration::Generic],
            pointing_devices: vec![PointingDeviceConfiguration::AbsoluteCoordinates],
            storage_devices: storage_devices(&profile.storage_paths),
            network_devices: network_devices(profile.network_enabled),
            directory_sharing_devices: directory_sharing_devices(
                profile.shared_paths.iter().map(String::as_str),
            ),
            working_directory,
        };

        self.platform.validate(&config).map_err(|e| match e {
            GuestVmError::Validation(_) => e,
            other => GuestVmError::Validation(other.to_string()),
        })?;

        tracing::debug!(
            platform = self.platform.name(),
            cpus = config.cpu_count,
            memory_bytes = config.memory_bytes,
            disks = config.storage_devices.len(),
            network = !config.network_devices.is_empty(),
            shares = config.directory_sharing_devices.len(),
            "Built platform configuration"
        );

        Ok(config)
    }

    fn boot_loader(&self, profile: &Profile) -> GuestVmResult<BootLoader> {
        if profile.uefi_enabled {
            // Overwrite: a stale store from an earlier guest is replaced.
            let variable_store = self
                .platform
                .create_efi_variable_store(Path::new(EFI_VARIABLE_STORE_PATH), true)
                .map_err(|e| {
                    GuestVmError::Validation(format!(
                        "cannot create EFI variable store at {}: {}",
                        EFI_VARIABLE_STORE_PATH, e
                    ))
                })?;
            return Ok(BootLoader::Efi { variable_store });
        }

        if profile.kernel_path.is_empty() {
            return Err(GuestVmError::Validation(
                "no kernel configured and UEFI boot is disabled".into(),
            ));
        }

        Ok(BootLoader::LinuxKernel {
            kernel: PathBuf::from(&profile.kernel_path),
            initrd: profile.initrd().map(PathBuf::from),
            command_line: profile.command_line.clone(),
        })
    }
}

fn stdio_serial_port() -> SerialPortConfiguration {
    SerialPortConfiguration {
        attachment: SerialAttachment::Stdio { raw_terminal: true },
    }
}

fn agent_console_device() -> ConsoleDeviceConfiguration {
    ConsoleDeviceConfiguration {
        ports: vec![ConsolePortConfiguration {
            name: console_ports::SPICE_AGENT.to_string(),
            attachment: ConsolePortAttachment::SpiceAgent,
        }],
    }
}

fn graphics_device() -> GraphicsDeviceConfiguration {
    GraphicsDeviceConfiguration {
        scanouts: vec![ScanoutConfiguration {
            width_in_pixels: display::WIDTH,
            height_in_pixels: display::HEIGHT,
        }],
    }
}

fn storage_devices(paths: &[String]) -> Vec<StorageDeviceConfiguration> {
    paths
        .iter()
        .map(|path| StorageDeviceConfiguration {
            image_path: PathBuf::from(path),
            read_only: false,
        })
        .collect()
}

fn network_devices(enabled: bool) -> Vec<NetworkDeviceConfiguration> {
    if enabled {
        vec![NetworkDeviceConfiguration {
            attachment: NetworkAttachment::Nat,
        }]
    } else {
        Vec::new()
    }
}

fn directory_sharing_devices<'p>(
    paths: impl Iterator<Item = &'p str>,
) -> Vec<DirectorySharingDeviceConfiguration> {
    let directories: BTreeMap<String, SharedDirectory> = paths
        .map(|path| {
            (
                path.to_string(),
                SharedDirectory {
                    path: PathBuf::from(path),
                    read_only: false,
                },
            )
        })
        .collect();

    if directories.is_empty() {
        return Vec::new();
    }

    vec![DirectorySharingDeviceConfiguration {
        tag: mount_tags::SHARED.to_string(),
        share: DirectoryShare::Multiple { directories },
    }]
}
