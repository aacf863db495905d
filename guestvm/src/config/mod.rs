//! Platform configuration: the device topology handed to a backend.
//!
//! A [`PlatformConfiguration`] is built fresh from the current profile on
//! every start attempt by [`ConfigurationBuilder`] and moved into the
//! platform. It is not `Clone`: one configuration boots at most one guest.

mod builder;

pub use builder::ConfigurationBuilder;

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Complete, validated device topology for one guest.
#[derive(Debug, Serialize)]
pub struct PlatformConfiguration {
    pub(crate) cpu_count: u32,
    pub(crate) memory_bytes: u64,
    pub(crate) boot_loader: BootLoader,
    pub(crate) serial_ports: Vec<SerialPortConfiguration>,
    pub(crate) console_devices: Vec<ConsoleDeviceConfiguration>,
    pub(crate) graphics_devices: Vec<GraphicsDeviceConfiguration>,
    pub(crate) keyboards: Vec<KeyboardConfiguration>,
    pub(crate) pointing_devices: Vec<PointingDeviceConfiguration>,
    pub(crate) storage_devices: Vec<StorageDeviceConfiguration>,
    pub(crate) network_devices: Vec<NetworkDeviceConfiguration>,
    pub(crate) directory_sharing_devices: Vec<DirectorySharingDeviceConfiguration>,
    /// Working directory at build time. Relative paths above were validated
    /// against it.
    pub(crate) working_directory: PathBuf,
}

impl PlatformConfiguration {
    pub fn cpu_count(&self) -> u32 {
        self.cpu_count
    }

    pub fn memory_bytes(&self) -> u64 {
        self.memory_bytes
    }

    pub fn boot_loader(&self) -> &BootLoader {
        &self.boot_loader
    }

    pub fn serial_ports(&self) -> &[SerialPortConfiguration] {
        &self.serial_ports
    }

    pub fn console_devices(&self) -> &[ConsoleDeviceConfiguration] {
        &self.console_devices
    }

    pub fn graphics_devices(&self) -> &[GraphicsDeviceConfiguration] {
        &self.graphics_devices
    }

    pub fn keyboards(&self) -> &[KeyboardConfiguration] {
        &self.keyboards
    }

    pub fn pointing_devices(&self) -> &[PointingDeviceConfiguration] {
        &self.pointing_devices
    }

    /// Block devices in profile order (the first entry is the boot disk).
    pub fn storage_devices(&self) -> &[StorageDeviceConfiguration] {
        &self.storage_devices
    }

    pub fn network_devices(&self) -> &[NetworkDeviceConfiguration] {
        &self.network_devices
    }

    pub fn directory_sharing_devices(&self) -> &[DirectorySharingDeviceConfiguration] {
        &self.directory_sharing_devices
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// `path` as seen from the build-time working directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.working_directory.join(path)
    }

    /// Whether any serial port wants the host terminal switched to raw mode.
    pub fn requests_raw_terminal(&self) -> bool {
        self.serial_ports.iter().any(|port| {
            matches!(
                port.attachment,
                SerialAttachment::Stdio { raw_terminal: true }
            )
        })
    }
}

/// How the guest firmware or kernel is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BootLoader {
    /// UEFI firmware with a persistent variable store.
    Efi { variable_store: EfiVariableStore },
    /// Direct kernel boot.
    LinuxKernel {
        kernel: PathBuf,
        initrd: Option<PathBuf>,
        command_line: String,
    },
}

/// UEFI variable store handed out by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EfiVariableStore {
    path: PathBuf,
    /// The backend must (re)create the store when the guest boots.
    create: bool,
}

impl EfiVariableStore {
    pub fn new(path: impl Into<PathBuf>, create: bool) -> Self {
        Self {
            path: path.into(),
            create,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create(&self) -> bool {
        self.create
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerialPortConfiguration {
    pub attachment: SerialAttachment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerialAttachment {
    /// Host stdin/stdout. With `raw_terminal` the host tty forwards every
    /// keystroke unbuffered and unechoed.
    Stdio { raw_terminal: bool },
}

/// Virtio console device with named ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleDeviceConfiguration {
    pub ports: Vec<ConsolePortConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolePortConfiguration {
    pub name: String,
    pub attachment: ConsolePortAttachment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolePortAttachment {
    SpiceAgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphicsDeviceConfiguration {
    pub scanouts: Vec<ScanoutConfiguration>,
}

/// A single display output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanoutConfiguration {
    pub width_in_pixels: u32,
    pub height_in_pixels: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyboardConfiguration {
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointingDeviceConfiguration {
    /// Reports absolute screen coordinates.
    AbsoluteCoordinates,
}

/// Virtio block device backed by a disk image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageDeviceConfiguration {
    pub image_path: PathBuf,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkDeviceConfiguration {
    pub attachment: NetworkAttachment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkAttachment {
    Nat,
}

/// Virtio filesystem device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectorySharingDeviceConfiguration {
    pub tag: String,
    pub share: DirectoryShare,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectoryShare {
    /// Several directories under one tag, keyed by name.
    Multiple {
        directories: BTreeMap<String, SharedDirectory>,
    },
}

impl DirectoryShare {
    pub fn directories(&self) -> impl Iterator<Item = (&str, &SharedDirectory)> {
        match self {
            DirectoryShare::Multiple { directories } => {
                directories.iter().map(|(k, v)| (k.as_str(), v))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedDirectory {
    pub path: PathBuf,
    pub read_only: bool,
}
