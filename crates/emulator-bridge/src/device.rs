//! Connected Device Types
//!
//! Devices reported by `adb devices -l` (physical and emulated).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Device state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Device is online and ready
    Online,
    /// Device is offline
    Offline,
    /// Device is not authorized (need to accept on device)
    Unauthorized,
    /// Device is in bootloader mode
    Bootloader,
    /// Device is in recovery mode
    Recovery,
    /// Device is in sideload mode
    Sideload,
    /// Unknown state
    Unknown,
}

impl DeviceState {
    pub fn from_adb(state: &str) -> Self {
        match state {
            "device" => DeviceState::Online,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            "bootloader" => DeviceState::Bootloader,
            "recovery" => DeviceState::Recovery,
            "sideload" => DeviceState::Sideload,
            _ => DeviceState::Unknown,
        }
    }
}

/// A device known to the adb server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedDevice {
    /// Device serial number (`emulator-5554` for emulators)
    pub serial: String,
    /// Device state
    pub state: DeviceState,
    /// Extended `key:value` metadata (`product`, `model`, `device`, `transport_id`)
    pub tags: BTreeMap<String, String>,
}

impl ConnectedDevice {
    pub fn new(serial: impl Into<String>, state: DeviceState) -> Self {
        Self {
            serial: serial.into(),
            state,
            tags: BTreeMap::new(),
        }
    }

    /// Builder-style tag setter
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Product tag; for an emulator this names the running AVD
    pub fn product(&self) -> Option<&str> {
        self.tag("product")
    }

    /// Emulator instances are listed as `emulator-<console port>`
    pub fn is_emulator(&self) -> bool {
        self.serial.starts_with(crate::EMULATOR_SERIAL_PREFIX)
    }
}

/// Parse the output of `adb devices [-l]`
pub fn parse_devices(output: &str) -> Vec<ConnectedDevice> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*')
        })
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = DeviceState::from_adb(parts.next()?);

            let mut device = ConnectedDevice::new(serial, state);
            for part in parts {
                if let Some((key, value)) = part.split_once(':') {
                    device.tags.insert(key.to_string(), value.to_string());
                }
            }
            Some(device)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICES_L: &str = "\
* daemon not running; starting now at tcp:5037
* daemon started successfully
List of devices attached
emulator-5554          device product:Pixel_4_API_34 model:sdk_gphone64_x86_64 device:emu64xa transport_id:1
0A1B2C3D               unauthorized usb:1-1 transport_id:2

";

    #[test]
    fn test_parse_devices_extended() {
        let devices = parse_devices(DEVICES_L);
        assert_eq!(devices.len(), 2);

        let emu = &devices[0];
        assert_eq!(emu.serial, "emulator-5554");
        assert_eq!(emu.state, DeviceState::Online);
        assert_eq!(emu.product(), Some("Pixel_4_API_34"));
        assert_eq!(emu.tag("transport_id"), Some("1"));
        assert!(emu.is_emulator());
        assert_eq!(emu.tag("model"), Some("sdk_gphone64_x86_64"));

        assert_eq!(devices[1].state, DeviceState::Unauthorized);
        assert!(!devices[1].is_emulator());
    }

    #[test]
    fn test_parse_devices_plain() {
        let devices = parse_devices("List of devices attached\nemulator-5556\toffline\n");
        assert_eq!(devices, vec![ConnectedDevice::new("emulator-5556", DeviceState::Offline)]);
    }
}
