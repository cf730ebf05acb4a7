//! Device session and storage types

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a device session was established
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Found by the scanner on the first connect attempt
    Device,
    /// Found by the scanner on the delayed retry
    Usb,
    /// A folder mounted as a device
    Folder,
    /// An iTunes library mounted as a device
    Itunes,
    Other(String),
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Device => write!(f, "device"),
            DeviceKind::Usb => write!(f, "usb"),
            DeviceKind::Folder => write!(f, "folder"),
            DeviceKind::Itunes => write!(f, "itunes"),
            DeviceKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// Opaque handle the scanner hands to a driver's `reset`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetectedDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bcd: u16,
    pub serial: Option<String>,
    pub mount_path: Option<PathBuf>,
}

/// Mount prefixes of the storage cards, `None` when no card is inserted
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CardPrefix {
    pub card_a: Option<String>,
    pub card_b: Option<String>,
}

impl CardPrefix {
    pub fn has_card(&self) -> bool {
        self.card_a.is_some() || self.card_b.is_some()
    }
}

/// Free bytes per storage area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FreeSpace {
    pub main: u64,
    pub card_a: u64,
    pub card_b: u64,
}

/// Card layout and free space, refreshed after every metadata sync
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageStatus {
    pub card_prefix: CardPrefix,
    pub free_space: FreeSpace,
}

/// Result of the device information job
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInformation {
    /// Driver-reported description strings (model, version, ...)
    pub info: Vec<String>,
    pub card_prefix: CardPrefix,
    pub free_space: FreeSpace,
}

impl DeviceInformation {
    /// Build from raw driver strings, dropping the NUL and SOH bytes some
    /// firmwares pad them with
    pub fn from_raw(info: Vec<String>, card_prefix: CardPrefix, free_space: FreeSpace) -> Self {
        let info = info
            .into_iter()
            .map(|s| s.replace(['\u{0}', '\u{1}'], ""))
            .collect();
        Self {
            info,
            card_prefix,
            free_space,
        }
    }

    /// Model name shown in the status bar
    pub fn model(&self) -> Option<&str> {
        self.info.first().map(String::as_str)
    }
}

/// Optional capabilities a driver declares up front
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverCapabilities {
    pub supports_annotations: bool,
    pub can_set_metadata: bool,
    /// Driver can eject the device from the bus
    pub hard_eject: bool,
    /// Driver can be told to let go of a mounted source (folders, iTunes)
    pub supports_unmount: bool,
}

/// Descriptive constants of a driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverProfile {
    pub display_name: String,
    pub thumbnail_height: u32,
    /// Message to show while the driver opens (some devices take a while)
    pub open_feedback: Option<String>,
    /// Book formats the device accepts, in order of preference
    pub format_map: Vec<String>,
    pub capabilities: DriverCapabilities,
}

impl DriverProfile {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            thumbnail_height: 60,
            open_feedback: None,
            format_map: vec!["epub".to_string()],
            capabilities: DriverCapabilities::default(),
        }
    }
}

/// Snapshot of the open device session, published on every connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub kind: DeviceKind,
    pub driver_name: String,
    pub profile: DriverProfile,
    /// Increments on every successful connect
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_information_strips_control_bytes() {
        let info = DeviceInformation::from_raw(
            vec!["Reader\u{0}\u{1}".to_string(), "1.0".to_string()],
            CardPrefix::default(),
            FreeSpace::default(),
        );
        assert_eq!(info.model(), Some("Reader"));
    }

    #[test]
    fn test_has_card() {
        assert!(!CardPrefix::default().has_card());
        let prefix = CardPrefix {
            card_a: Some("/media/card".into()),
            card_b: None,
        };
        assert!(prefix.has_card());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(DeviceKind::Device.to_string(), "device");
        assert_eq!(DeviceKind::Other("mtp".into()).to_string(), "mtp");
    }
}
