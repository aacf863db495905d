//! Guest profile: the declarative description of the VM's hardware.
//!
//! A profile is decoded from a JSON document and never changes afterwards.
//! Loading a new document replaces the whole profile; nothing is merged.

mod loader;

pub use loader::ProfileLoader;

use guestvm_shared::errors::{GuestVmError, GuestVmResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Hardware and boot description of the guest.
///
/// Field names on the wire are the short document keys (`cpus`, `memory`,
/// `kernel`, ...). Every key is required; an empty `initrd` means "none".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Number of virtual CPUs.
    #[serde(rename = "cpus")]
    pub cpu_count: u32,

    /// Guest memory in megabytes.
    #[serde(rename = "memory")]
    pub memory_megabytes: u64,

    /// Kernel image for direct boot. Ignored when `uefi_enabled`.
    #[serde(rename = "kernel")]
    pub kernel_path: String,

    /// Initial ramdisk. Empty when absent.
    #[serde(rename = "initrd")]
    pub initrd_path: String,

    /// Disk images, attached in this order.
    #[serde(rename = "storage")]
    pub storage_paths: Vec<String>,

    /// Kernel command line for direct boot.
    #[serde(rename = "cmdline")]
    pub command_line: String,

    #[serde(rename = "network")]
    pub network_enabled: bool,

    #[serde(rename = "uefi")]
    pub uefi_enabled: bool,

    /// Host directories exposed to the guest.
    #[serde(rename = "shared")]
    pub shared_paths: BTreeSet<String>,
}

impl Profile {
    /// Decode a profile from raw document bytes.
    pub fn from_slice(bytes: &[u8]) -> GuestVmResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| GuestVmError::Decode(e.to_string()))
    }

    /// Encode the profile as a pretty-printed document.
    pub fn to_json_pretty(&self) -> GuestVmResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| GuestVmError::Internal(e.to_string()))
    }

    /// Initrd path, if one is configured.
    pub fn initrd(&self) -> Option<&str> {
        if self.initrd_path.is_empty() {
            None
        } else {
            Some(&self.initrd_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Profile {
        Profile {
            cpu_count: 4,
            memory_megabytes: 4096,
            kernel_path: "vmlinuz".to_string(),
            initrd_path: "initrd.img".to_string(),
            storage_paths: vec!["root.img".to_string(), "data.img".to_string()],
            command_line: "console=hvc0 root=/dev/vda rw".to_string(),
            network_enabled: true,
            uefi_enabled: false,
            shared_paths: ["/Users/me/src".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn test_encode_decode_preserves_fields() {
        let profile = sample();
        let json = profile.to_json_pretty().unwrap();
        let decoded = Profile::from_slice(json.as_bytes()).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    fn test_uses_document_keys() {
        let json = sample().to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let keys: BTreeSet<_> = value.as_object().unwrap().keys().cloned().collect();
        let expected: BTreeSet<_> = [
            "cpus", "memory", "kernel", "initrd", "storage", "cmdline", "network", "uefi",
            "shared",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_missing_field_is_decode_error() {
        let doc = br#"{"cpus": 2, "memory": 1024, "kernel": "k", "initrd": "",
            "storage": [], "cmdline": "", "network": false, "uefi": false}"#;
        let err = Profile::from_slice(doc).unwrap_err();
        assert!(matches!(err, GuestVmError::Decode(ref m) if m.contains("shared")));
    }

    #[test]
    fn test_mistyped_field_is_decode_error() {
        let doc = br#"{"cpus": "two", "memory": 1024, "kernel": "k", "initrd": "",
            "storage": [], "cmdline": "", "network": false, "uefi": false, "shared": []}"#;
        assert!(matches!(
            Profile::from_slice(doc),
            Err(GuestVmError::Decode(_))
        ));
    }

    #[test]
    fn test_negative_memory_is_decode_error() {
        let doc = br#"{"cpus": 1, "memory": -1, "kernel": "k", "initrd": "",
            "storage": [], "cmdline": "", "network": false, "uefi": false, "shared": []}"#;
        assert!(matches!(
            Profile::from_slice(doc),
            Err(GuestVmError::Decode(_))
        ));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let doc = br#"{"cpus": 1, "memory": 512, "kernel": "", "initrd": "",
            "storage": [], "cmdline": "", "network": false, "uefi": true, "shared": [],
            "comment": "efi guest"}"#;
        let profile = Profile::from_slice(doc).unwrap();
        assert!(profile.uefi_enabled);
        assert!(profile.kernel_path.is_empty());
    }

    #[test]
    fn test_empty_initrd_is_absent() {
        let mut profile = sample();
        assert_eq!(profile.initrd(), Some("initrd.img"));
        profile.initrd_path.clear();
        assert_eq!(profile.initrd(), None);
    }
}
