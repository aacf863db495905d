//! Fixed device policy.
//!
//! These values are not configurable per profile. Backends may rely on them
//! when translating a configuration into their own terms.

/// Bytes per megabyte of guest memory.
pub const MIB: u64 = 1024 * 1024;

/// UEFI variable store location, relative to the current working directory.
pub const EFI_VARIABLE_STORE_PATH: &str = "./efistore";

/// Display output policy.
pub mod display {
    /// Scanout width in pixels.
    pub const WIDTH: u32 = 1280;

    /// Scanout height in pixels.
    pub const HEIGHT: u32 = 720;
}

/// Virtio filesystem tags.
pub mod mount_tags {
    /// Tag of the single device multiplexing every shared directory.
    pub const SHARED: &str = "shared";
}

/// Console port names.
pub mod console_ports {
    /// Well-known SPICE guest agent port.
    pub const SPICE_AGENT: &str = "com.redhat.spice.0";
}
