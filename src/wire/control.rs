//! Recognition of inbound client→device control frames. The payload past
//! the type byte is opaque to the server; these types exist purely for
//! logging, validation, and the backpressure-drop policy in `ControlRouter`.

const TYPE_INJECT_TOUCH: u8 = 2;
const TYPE_SCROLL: u8 = 3;
const TYPE_BACK_OR_SCREEN_ON: u8 = 4;
const TYPE_EXPAND_NOTIFICATION: u8 = 5;
const TYPE_EXPAND_SETTINGS: u8 = 6;
const TYPE_SET_SCREEN_POWER_MODE: u8 = 10;

/// Touch action byte of an `InjectTouch` frame (scrcpy's `AMOTION_EVENT_ACTION_*`).
const TOUCH_ACTION_DOWN: u8 = 0;
const TOUCH_ACTION_UP: u8 = 1;
const TOUCH_ACTION_MOVE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessageKind {
    InjectTouch,
    Scroll,
    BackOrScreenOn,
    ExpandNotification,
    ExpandSettings,
    SetScreenPowerMode,
    /// A recognized-as-valid but not individually named type. Forwarded
    /// as-is; never rejected.
    Other(u8),
}

impl ControlMessageKind {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            TYPE_INJECT_TOUCH => ControlMessageKind::InjectTouch,
            TYPE_SCROLL => ControlMessageKind::Scroll,
            TYPE_BACK_OR_SCREEN_ON => ControlMessageKind::BackOrScreenOn,
            TYPE_EXPAND_NOTIFICATION => ControlMessageKind::ExpandNotification,
            TYPE_EXPAND_SETTINGS => ControlMessageKind::ExpandSettings,
            TYPE_SET_SCREEN_POWER_MODE => ControlMessageKind::SetScreenPowerMode,
            other => ControlMessageKind::Other(other),
        }
    }
}

/// Classifies an inbound control frame for logging, or `None` if the frame
/// is malformed (zero length) and should be dropped with a warning rather
/// than forwarded.
pub fn classify(frame: &[u8]) -> Option<ControlMessageKind> {
    let (&tag, _) = frame.split_first()?;
    Some(ControlMessageKind::from_tag(tag))
}

/// Whether `frame` must never be dropped by the backpressure policy, even
/// under queue overflow. Only a touch `MOVE` is droppable; every other
/// recognized frame (including touch DOWN/UP and power events) is
/// essential, as is anything not recognized (better to forward than guess).
pub fn is_essential(frame: &[u8]) -> bool {
    match classify(frame) {
        None => false,
        Some(ControlMessageKind::InjectTouch) => {
            !matches!(frame.get(1), Some(&TOUCH_ACTION_MOVE))
        }
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_is_malformed() {
        assert_eq!(classify(&[]), None);
        assert!(!is_essential(&[]));
    }

    #[test]
    fn touch_move_is_droppable() {
        let frame = [TYPE_INJECT_TOUCH, TOUCH_ACTION_MOVE, 0, 0];
        assert!(!is_essential(&frame));
    }

    #[test]
    fn touch_down_and_up_are_essential() {
        let down = [TYPE_INJECT_TOUCH, TOUCH_ACTION_DOWN];
        let up = [TYPE_INJECT_TOUCH, TOUCH_ACTION_UP];
        assert!(is_essential(&down));
        assert!(is_essential(&up));
    }

    #[test]
    fn power_mode_is_essential() {
        let frame = [TYPE_SET_SCREEN_POWER_MODE, 1];
        assert!(is_essential(&frame));
    }

    #[test]
    fn unrecognized_type_is_forwarded_as_other() {
        assert_eq!(classify(&[200]), Some(ControlMessageKind::Other(200)));
    }
}
