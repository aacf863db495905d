//! Translation of a platform configuration into vfkit arguments.
//!
//! vfkit CLI reference:
//!   --bootloader efi,variable-store=<path>[,create]
//!   --bootloader linux,kernel=<path>[,initrd=<path>],cmdline="<args>"
//!   --device virtio-serial,stdio
//!   --device virtio-gpu,width=<w>,height=<h>
//!   --device virtio-input,keyboard | virtio-input,pointing
//!   --device virtio-blk,path=<image>
//!   --device virtio-net,nat
//!   --device virtio-fs,sharedDir=<dir>,mountTag=<tag>

use super::VfkitDisplay;
use crate::config::{
    BootLoader, ConsolePortAttachment, KeyboardConfiguration, NetworkAttachment,
    PlatformConfiguration, PointingDeviceConfiguration, SerialAttachment,
};
use guestvm_shared::constants::MIB;

/// Build the full vfkit argument vector for `config`.
pub(crate) fn build_vfkit_args(config: &PlatformConfiguration, display: VfkitDisplay) -> Vec<String> {
    let mut args = vec![
        "--cpus".to_string(),
        config.cpu_count().to_string(),
        "--memory".to_string(),
        (config.memory_bytes() / MIB).to_string(),
        "--bootloader".to_string(),
        bootloader_arg(config.boot_loader()),
    ];

    let mut device = |value: String| {
        args.push("--device".to_string());
        args.push(value);
    };

    for port in config.serial_ports() {
        match port.attachment {
            SerialAttachment::Stdio { .. } => device("virtio-serial,stdio".to_string()),
        }
    }

    for console in config.console_devices() {
        for port in &console.ports {
            match port.attachment {
                ConsolePortAttachment::SpiceAgent => {
                    tracing::warn!(port = %port.name, "vfkit has no SPICE agent port, skipping");
                }
            }
        }
    }

    for gpu in config.graphics_devices() {
        for scanout in &gpu.scanouts {
            device(format!(
                "virtio-gpu,width={},height={}",
                scanout.width_in_pixels, scanout.height_in_pixels
            ));
        }
    }

    for keyboard in config.keyboards() {
        match keyboard {
            KeyboardConfiguration::Generic => device("virtio-input,keyboard".to_string()),
        }
    }

    for pointer in config.pointing_devices() {
        match pointer {
            PointingDeviceConfiguration::AbsoluteCoordinates => {
                device("virtio-input,pointing".to_string())
            }
        }
    }

    for disk in config.storage_devices() {
        device(format!("virtio-blk,path={}", disk.image_path.display()));
    }

    for net in config.network_devices() {
        match net.attachment {
            NetworkAttachment::Nat => device("virtio-net,nat".to_string()),
        }
    }

    for fs in config.directory_sharing_devices() {
        for (_, dir) in fs.share.directories() {
            device(format!(
                "virtio-fs,sharedDir={},mountTag={}",
                dir.path.display(),
                fs.tag
            ));
        }
    }

    if display == VfkitDisplay::Window {
        args.push("--gui".to_string());
    }

    args
}

fn bootloader_arg(boot_loader: &BootLoader) -> String {
    match boot_loader {
        BootLoader::Efi { variable_store } => {
            let mut arg = format!("efi,variable-store={}", variable_store.path().display());
            if variable_store.create() {
                arg.push_str(",create");
            }
            arg
        }
        BootLoader::LinuxKernel {
            kernel,
            initrd,
            command_line,
        } => {
            let mut arg = format!("linux,kernel={}", kernel.display());
            if let Some(initrd) = initrd {
                arg.push_str(&format!(",initrd={}", initrd.display()));
            }
            // Quoted: the command line usually contains spaces and may contain commas.
            arg.push_str(&format!(",cmdline=\"{}\"", command_line));
            arg
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EfiVariableStore;
    use std::path::PathBuf;

    #[test]
    fn test_linux_bootloader_with_initrd() {
        let arg = bootloader_arg(&BootLoader::LinuxKernel {
            kernel: PathBuf::from("vmlinuz"),
            initrd: Some(PathBuf::from("initrd.img")),
            command_line: "console=hvc0 root=/dev/vda rw".into(),
        });
        assert_eq!(
            arg,
            "linux,kernel=vmlinuz,initrd=initrd.img,cmdline=\"console=hvc0 root=/dev/vda rw\""
        );
    }

    #[test]
    fn test_linux_bootloader_without_initrd() {
        let arg = bootloader_arg(&BootLoader::LinuxKernel {
            kernel: PathBuf::from("/k/Image"),
            initrd: None,
            command_line: String::new(),
        });
        assert_eq!(arg, "linux,kernel=/k/Image,cmdline=\"\"");
    }

    #[test]
    fn test_efi_bootloader() {
        let create = bootloader_arg(&BootLoader::Efi {
            variable_store: EfiVariableStore::new("./efistore", true),
        });
        assert_eq!(create, "efi,variable-store=./efistore,create");

        let reuse = bootloader_arg(&BootLoader::Efi {
            variable_store: EfiVariableStore::new("./efistore", false),
        });
        assert_eq!(reuse, "efi,variable-store=./efistore");
    }
}
