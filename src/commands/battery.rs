//! `getBatteryLevel`: parses the `level` field out of `dumpsys battery`.

use crate::adb::DeviceBus;
use crate::error::{AppError, Result};

/// Parses a `dumpsys battery` dump's `level: <0-100>` line.
pub fn parse_battery_level(dumpsys_battery: &str) -> Option<u8> {
    dumpsys_battery.lines().find_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        if key.trim() != "level" {
            return None;
        }
        let level: u8 = value.trim().parse().ok()?;
        (level <= 100).then_some(level)
    })
}

pub async fn get_battery_level(device_bus: &DeviceBus, device_id: &str) -> Result<u8> {
    let output = device_bus.shell(device_id, &["dumpsys", "battery"]).await?;
    parse_battery_level(&output)
        .ok_or_else(|| AppError::Internal("dumpsys battery did not report a level".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_line() {
        let output = "Current Battery Service state:\n  AC powered: false\n  level: 87\n  scale: 100\n";
        assert_eq!(parse_battery_level(output), Some(87));
    }

    #[test]
    fn out_of_range_level_is_rejected() {
        let output = "level: 250\n";
        assert_eq!(parse_battery_level(output), None);
    }

    #[test]
    fn missing_level_is_none() {
        assert_eq!(parse_battery_level("nothing useful"), None);
    }
}
