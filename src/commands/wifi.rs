//! `wifiToggle`/`getWifiStatus`: toggles Wi-Fi via `svc wifi` and polls
//! `dumpsys wifi` until the radio and, on enable, an SSID association
//! settle or the poll budget runs out.

use std::time::Duration;

use tokio::time::sleep;

use crate::adb::DeviceBus;
use crate::error::{AppError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const RADIO_POLL_ATTEMPTS: u32 = 10;
const SSID_POLL_ATTEMPTS: u32 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiStatus {
    pub enabled: bool,
    pub ssid: Option<String>,
}

/// True if `dumpsys wifi`'s `Wi-Fi is <state>` line reports an enabled
/// radio (`enabled`, as opposed to `disabled`/`disabling`/`enabling`).
fn radio_enabled(dumpsys_wifi: &str) -> bool {
    dumpsys_wifi
        .lines()
        .find_map(|line| line.trim().strip_prefix("Wi-Fi is "))
        .map(|state| state.trim_end_matches('.') == "enabled")
        .unwrap_or(false)
}

/// Extracts the associated SSID from `dumpsys wifi`'s current-connection
/// block, e.g. a line `mWifiInfo SSID: "MyNetwork", ...`. Returns `None`
/// when unassociated (`SSID: <unknown ssid>` or no match at all).
fn parse_ssid(dumpsys_wifi: &str) -> Option<String> {
    for line in dumpsys_wifi.lines() {
        if let Some(idx) = line.find("SSID: ") {
            let rest = &line[idx + "SSID: ".len()..];
            let ssid = rest.split(',').next().unwrap_or(rest).trim().trim_matches('"');
            if ssid.is_empty() || ssid == "<unknown ssid>" {
                return None;
            }
            return Some(ssid.to_string());
        }
    }
    None
}

pub async fn get_wifi_status(device_bus: &DeviceBus, device_id: &str) -> Result<WifiStatus> {
    let output = device_bus.shell(device_id, &["dumpsys", "wifi"]).await?;
    Ok(WifiStatus {
        enabled: radio_enabled(&output),
        ssid: parse_ssid(&output),
    })
}

/// Enables or disables Wi-Fi and polls for the radio (and, on enable, an
/// SSID association) to settle before returning.
pub async fn toggle_wifi(device_bus: &DeviceBus, device_id: &str, enable: bool) -> Result<WifiStatus> {
    let arg = if enable { "enable" } else { "disable" };
    device_bus.shell(device_id, &["svc", "wifi", arg]).await?;

    let mut status = WifiStatus { enabled: !enable, ssid: None };
    let mut radio_settled = false;
    for _ in 0..RADIO_POLL_ATTEMPTS {
        status = get_wifi_status(device_bus, device_id).await?;
        if status.enabled == enable {
            radio_settled = true;
            break;
        }
        sleep(POLL_INTERVAL).await;
    }
    if !radio_settled {
        return Err(AppError::CommandTimeout);
    }

    if enable {
        let mut ssid_settled = false;
        for _ in 0..SSID_POLL_ATTEMPTS {
            status = get_wifi_status(device_bus, device_id).await?;
            if status.ssid.is_some() {
                ssid_settled = true;
                break;
            }
            sleep(POLL_INTERVAL).await;
        }
        if !ssid_settled {
            return Err(AppError::CommandTimeout);
        }
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_enabled_radio() {
        assert!(radio_enabled("Wi-Fi is enabled\nStack: ..."));
        assert!(!radio_enabled("Wi-Fi is disabled\n"));
    }

    #[test]
    fn parses_associated_ssid() {
        let output = "mWifiInfo SSID: \"HomeNetwork\", BSSID: aa:bb, MAC: cc:dd\n";
        assert_eq!(parse_ssid(output), Some("HomeNetwork".to_string()));
    }

    #[test]
    fn unassociated_ssid_is_none() {
        let output = "mWifiInfo SSID: <unknown ssid>, BSSID: <none>\n";
        assert_eq!(parse_ssid(output), None);
    }
}
