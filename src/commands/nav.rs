//! `navAction` key name to Android keycode mapping.

/// Maps a `navAction` key name to its Android `KEYCODE_*` value for
/// `input keyevent <code>`. `None` for an unrecognized key.
pub fn keycode_for(key: &str) -> Option<u32> {
    Some(match key {
        "back" => 4,
        "home" => 3,
        "recents" => 187,
        "power" => 26,
        "menu" => 82,
        "enter" => 66,
        "volume_up" => 24,
        "volume_down" => 25,
        "app_switch" => 187,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_keys() {
        assert_eq!(keycode_for("back"), Some(4));
        assert_eq!(keycode_for("home"), Some(3));
        assert_eq!(keycode_for("power"), Some(26));
    }

    #[test]
    fn rejects_unknown_key() {
        assert_eq!(keycode_for("frobnicate"), None);
    }
}
