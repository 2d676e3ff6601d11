//! Display-mode precondition/cleanup ADB shell commands and the
//! `native_taskbar` magic-DPI formula.

use super::types::{DisplayMode, RotationCache};

/// `round(H / 600 * 160)`, the "magic DPI" used to keep `native_taskbar`
/// legible on an arbitrary device height. Preserved exactly as specified:
/// rounded first, then only ever used to clamp a requested DPI *downward*.
pub fn magic_dpi(height: u32) -> u32 {
    ((height as f64) / 600.0 * 160.0).round() as u32
}

/// Never raises `requested_dpi` above the magic value for this height.
pub fn clamp_dpi_downward(requested_dpi: u32, height: u32) -> u32 {
    requested_dpi.min(magic_dpi(height))
}

/// Swaps `"<W>x<H>"` to `"<H>x<W>"`, the dimension flip `native_taskbar`
/// requires. Returns the input unchanged if it isn't in that form.
pub fn flip_resolution(resolution: &str) -> String {
    match resolution.split_once('x') {
        Some((w, h)) => format!("{h}x{w}"),
        None => resolution.to_string(),
    }
}

/// One `adb shell <args>` invocation, pre-split into argv.
pub type ShellCommand = Vec<String>;

/// Commands to run before spawning the on-device server for `mode`.
/// `dex` and `virtual` carry their effect entirely through server launch
/// options (`display_id=2` / `new_display=`) and need no precondition
/// shell command here.
pub fn precondition_commands(
    mode: DisplayMode,
    resolution: Option<&str>,
    dpi: Option<&str>,
) -> Vec<ShellCommand> {
    match mode {
        DisplayMode::Default | DisplayMode::Virtual | DisplayMode::Dex => Vec::new(),
        DisplayMode::Overlay => {
            let (Some(resolution), Some(dpi)) = (resolution, dpi) else {
                return Vec::new();
            };
            vec![vec![
                "settings".to_string(),
                "put".to_string(),
                "global".to_string(),
                "overlay_display_devices".to_string(),
                format!("{resolution}/{dpi}"),
            ]]
        }
        DisplayMode::NativeTaskbar => {
            let Some(resolution) = resolution else {
                return Vec::new();
            };
            let flipped = flip_resolution(resolution);
            let mut commands = vec![vec!["wm".to_string(), "size".to_string(), flipped]];
            if let Some(dpi) = dpi {
                commands.push(vec!["wm".to_string(), "density".to_string(), dpi.to_string()]);
            }
            commands
        }
    }
}

/// Commands to run after the session for `mode` ends, restoring state
/// from `rotation` where applicable.
pub fn cleanup_commands(mode: DisplayMode, rotation: &RotationCache) -> Vec<ShellCommand> {
    let mut commands = match mode {
        DisplayMode::Default | DisplayMode::Virtual | DisplayMode::Dex => Vec::new(),
        DisplayMode::Overlay => vec![vec![
            "settings".to_string(),
            "delete".to_string(),
            "global".to_string(),
            "overlay_display_devices".to_string(),
        ]],
        DisplayMode::NativeTaskbar => vec![
            vec!["wm".to_string(), "size".to_string(), "reset".to_string()],
            vec!["wm".to_string(), "density".to_string(), "reset".to_string()],
        ],
    };

    if mode == DisplayMode::NativeTaskbar {
        if let Some(user_rotation) = rotation.user_rotation {
            commands.push(vec![
                "settings".to_string(),
                "put".to_string(),
                "system".to_string(),
                "user_rotation".to_string(),
                user_rotation.to_string(),
            ]);
        }
        if let Some(accelerometer_rotation) = rotation.accelerometer_rotation {
            commands.push(vec![
                "settings".to_string(),
                "put".to_string(),
                "system".to_string(),
                "accelerometer_rotation".to_string(),
                accelerometer_rotation.to_string(),
            ]);
        }
    }

    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_dpi_matches_known_values() {
        assert_eq!(magic_dpi(2400), 640);
        assert_eq!(magic_dpi(600), 160);
    }

    #[test]
    fn clamp_never_raises_dpi() {
        assert_eq!(clamp_dpi_downward(800, 600), 160);
        assert_eq!(clamp_dpi_downward(100, 600), 100);
    }

    #[test]
    fn flip_resolution_swaps_dimensions() {
        assert_eq!(flip_resolution("1080x2400"), "2400x1080");
        assert_eq!(flip_resolution("garbage"), "garbage");
    }

    #[test]
    fn overlay_precondition_needs_resolution_and_dpi() {
        let commands = precondition_commands(DisplayMode::Overlay, Some("1080x2400"), Some("420"));
        assert_eq!(commands.len(), 1);
        assert!(commands[0].contains(&"overlay_display_devices".to_string()));

        assert!(precondition_commands(DisplayMode::Overlay, None, Some("420")).is_empty());
    }

    #[test]
    fn native_taskbar_cleanup_restores_cached_rotation() {
        let rotation = RotationCache {
            user_rotation: Some(1),
            accelerometer_rotation: Some(0),
        };
        let commands = cleanup_commands(DisplayMode::NativeTaskbar, &rotation);
        assert_eq!(commands.len(), 4);
    }

    #[test]
    fn default_mode_has_no_commands() {
        assert!(precondition_commands(DisplayMode::Default, None, None).is_empty());
        assert!(cleanup_commands(DisplayMode::Default, &RotationCache::default()).is_empty());
    }
}
