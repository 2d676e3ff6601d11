use std::collections::HashMap;
use std::convert::TryFrom;

use crate::error::AppError;

/// Connection state of a device as reported by `adb devices -l`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Online,
    Unauthorized,
    Offline,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Online => "online",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Offline => "offline",
        }
    }
}

impl TryFrom<&str> for DeviceState {
    type Error = AppError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "device" => Ok(DeviceState::Online),
            "unauthorized" => Ok(DeviceState::Unauthorized),
            "offline" => Ok(DeviceState::Offline),
            other => Err(AppError::ProtocolViolation(format!(
                "unrecognized adb device state {other:?}"
            ))),
        }
    }
}

/// A device as enumerated by `adb devices -l`, plus per-device values this
/// gateway caches after the first session so later lookups don't re-shell.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub state: DeviceState,
    pub properties: HashMap<String, String>,
    pub cached_android_major_version: Option<u32>,
    pub cached_max_media_volume: Option<u32>,
}

impl Device {
    pub fn is_usable(&self) -> bool {
        matches!(self.state, DeviceState::Online)
    }
}

/// Parses one line of `adb devices -l` output, e.g.:
/// `emulator-5554  device product:sdk_gphone64_x86_64 model:sdk_gphone64_x86_64 device:emu64a transport_id:1`
impl TryFrom<&str> for Device {
    type Error = AppError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let mut parts = line.split_whitespace();
        let id = parts
            .next()
            .ok_or_else(|| AppError::ProtocolViolation("empty adb devices line".to_string()))?
            .to_string();
        let state_token = parts.next().ok_or_else(|| {
            AppError::ProtocolViolation(format!("missing state for device {id:?}"))
        })?;
        let state = DeviceState::try_from(state_token)?;

        let mut properties = HashMap::new();
        for token in parts {
            if let Some((key, value)) = token.split_once(':') {
                properties.insert(key.to_string(), value.to_string());
            }
        }

        Ok(Device {
            id,
            state,
            properties,
            cached_android_major_version: None,
            cached_max_media_volume: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_online_device_with_properties() {
        let device = Device::try_from(
            "emulator-5554  device product:sdk_gphone64_x86_64 model:Pixel_4 transport_id:1",
        )
        .unwrap();
        assert_eq!(device.id, "emulator-5554");
        assert_eq!(device.state, DeviceState::Online);
        assert!(device.is_usable());
        assert_eq!(device.properties.get("model"), Some(&"Pixel_4".to_string()));
    }

    #[test]
    fn parses_unauthorized_device() {
        let device = Device::try_from("R3CN90ABCDE  unauthorized").unwrap();
        assert_eq!(device.state, DeviceState::Unauthorized);
        assert!(!device.is_usable());
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(Device::try_from("emulator-5554").is_err());
        assert!(Device::try_from("emulator-5554 weird-state").is_err());
    }
}
