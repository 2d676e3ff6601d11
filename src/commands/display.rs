//! `adbCommand` sub-actions: display enumeration and the WM size/density/
//! rotation overrides used by the overlay/native-taskbar display modes
//! when driven directly from `CommandHub` rather than through a session.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::adb::DeviceBus;
use crate::error::Result;
use crate::protocol::server_message::DisplayEntry;
use crate::session::RotationCache;

const DISPLAY_ID_MARKER: &str = "--display-id=";

/// Parses one line of `getDisplayList`'s list-mode output into
/// `{id, resolution}`, matching `--display-id=(\d+)\s*\(([^)]+)\)` by
/// hand rather than pulling in a regex crate for a single fixed pattern.
fn parse_display_line(line: &str) -> Option<DisplayEntry> {
    let after_marker = line.split_once(DISPLAY_ID_MARKER)?.1;
    let digits_end = after_marker.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }
    let id: u32 = after_marker[..digits_end].parse().ok()?;

    let rest = after_marker[digits_end..].trim_start();
    let inner = rest.strip_prefix('(')?;
    let close = inner.find(')')?;
    let resolution = inner[..close].to_string();

    Some(DisplayEntry { id, resolution })
}

/// Parses `getDisplayList`'s list-mode output into `{id, resolution}`
/// pairs, per §4.6.
pub fn parse_display_list(output: &str) -> Vec<DisplayEntry> {
    output.lines().filter_map(parse_display_line).collect()
}

/// Per-device rotation cache for `CommandHub`'s `cleanupAdb`, independent
/// of any session's own cache (a device can receive `adbCommand` calls
/// with no active streaming session at all).
#[derive(Clone, Default)]
pub struct RotationCacheStore {
    inner: Arc<RwLock<HashMap<String, RotationCache>>>,
}

impl RotationCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn capture(&self, device_bus: &DeviceBus, device_id: &str) -> Result<()> {
        let user_rotation = device_bus
            .shell(device_id, &["settings", "get", "system", "user_rotation"])
            .await
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok());
        let accelerometer_rotation = device_bus
            .shell(
                device_id,
                &["settings", "get", "system", "accelerometer_rotation"],
            )
            .await
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok());

        self.inner.write().insert(
            device_id.to_string(),
            RotationCache {
                user_rotation,
                accelerometer_rotation,
            },
        );
        Ok(())
    }

    pub fn take(&self, device_id: &str) -> RotationCache {
        self.inner.write().remove(device_id).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_display_list_lines() {
        let output = "Display --display-id=0 (1080x2400)\nDisplay --display-id=3 (1600x900)\nnoise";
        let entries = parse_display_list(output);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, 0);
        assert_eq!(entries[0].resolution, "1080x2400");
        assert_eq!(entries[1].id, 3);
    }

    #[test]
    fn ignores_lines_without_display_id() {
        assert!(parse_display_list("no display info here").is_empty());
    }
}
