use serde::Deserialize;

/// A JSON command received from a browser client, dispatched by
/// `action`. Any `action` value that doesn't match a known variant falls
/// through to [`ClientMessage::Unknown`] rather than a deserialization
/// error, so the connection is never dropped for an unrecognized command.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action")]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    GetAdbDevices {
        #[serde(default)]
        command_id: Option<String>,
    },
    Start {
        #[serde(default)]
        command_id: Option<String>,
        device_id: String,
        #[serde(default = "default_true")]
        video: bool,
        #[serde(default)]
        audio: bool,
        #[serde(default = "default_true")]
        control: bool,
        #[serde(default = "default_max_fps")]
        max_fps: u32,
        #[serde(default = "default_bitrate")]
        bitrate: u32,
        #[serde(default)]
        display_mode: DisplayModeJson,
        #[serde(default)]
        resolution: Option<String>,
        #[serde(default)]
        dpi: Option<String>,
        #[serde(default)]
        turn_screen_off: bool,
    },
    Disconnect {
        #[serde(default)]
        command_id: Option<String>,
    },
    Volume {
        #[serde(default)]
        command_id: Option<String>,
        value: u8,
    },
    GetVolume {
        #[serde(default)]
        command_id: Option<String>,
    },
    NavAction {
        #[serde(default)]
        command_id: Option<String>,
        key: String,
    },
    WifiToggle {
        #[serde(default)]
        command_id: Option<String>,
        enable: bool,
    },
    GetWifiStatus {
        #[serde(default)]
        command_id: Option<String>,
    },
    GetBatteryLevel {
        #[serde(default)]
        command_id: Option<String>,
    },
    LaunchApp {
        #[serde(default)]
        command_id: Option<String>,
        package_name: String,
    },
    AdbCommand {
        #[serde(default)]
        command_id: Option<String>,
        #[serde(flatten)]
        request: AdbCommandRequest,
    },
    StartDiagnostics {
        #[serde(default)]
        command_id: Option<String>,
        #[serde(default)]
        diagnostics: Vec<String>,
    },
    StopDiagnostics {
        #[serde(default)]
        command_id: Option<String>,
    },
    StartHarTrace {
        #[serde(default)]
        command_id: Option<String>,
        url: String,
        har_filename: String,
        #[serde(default)]
        capture_time: Option<u64>,
    },
    StopHarTrace {
        #[serde(default)]
        command_id: Option<String>,
    },
    StartAdbShell {
        #[serde(default)]
        command_id: Option<String>,
    },
    AdbShellInput {
        #[serde(default)]
        command_id: Option<String>,
        input: String,
    },
    StopAdbShell {
        #[serde(default)]
        command_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn command_id(&self) -> Option<&str> {
        match self {
            ClientMessage::GetAdbDevices { command_id }
            | ClientMessage::Start { command_id, .. }
            | ClientMessage::Disconnect { command_id }
            | ClientMessage::Volume { command_id, .. }
            | ClientMessage::GetVolume { command_id }
            | ClientMessage::NavAction { command_id, .. }
            | ClientMessage::WifiToggle { command_id, .. }
            | ClientMessage::GetWifiStatus { command_id }
            | ClientMessage::GetBatteryLevel { command_id }
            | ClientMessage::LaunchApp { command_id, .. }
            | ClientMessage::AdbCommand { command_id, .. }
            | ClientMessage::StartDiagnostics { command_id, .. }
            | ClientMessage::StopDiagnostics { command_id }
            | ClientMessage::StartHarTrace { command_id, .. }
            | ClientMessage::StopHarTrace { command_id }
            | ClientMessage::StartAdbShell { command_id }
            | ClientMessage::AdbShellInput { command_id, .. }
            | ClientMessage::StopAdbShell { command_id } => command_id.as_deref(),
            ClientMessage::Unknown => None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_fps() -> u32 {
    30
}

fn default_bitrate() -> u32 {
    4_000_000
}

/// Display mode requested for a session. `#[serde(rename_all)]` matches the
/// lowercase/snake_case spellings used on the wire (§3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayModeJson {
    #[default]
    Default,
    Overlay,
    Virtual,
    Dex,
    NativeTaskbar,
}

/// The `adbCommand` sub-action family (§4.6's `adbCommand` row).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "commandType")]
#[serde(rename_all = "camelCase")]
pub enum AdbCommandRequest {
    GetDisplayList,
    SetOverlay {
        resolution: String,
        dpi: String,
    },
    SetWmSize {
        width: u32,
        height: u32,
    },
    SetWmDensity {
        dpi: u32,
    },
    AdbRotateScreen {
        rotation: u32,
    },
    CleanupAdb,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_does_not_fail_to_parse() {
        let msg: ClientMessage = serde_json::from_str(r#"{"action":"doSomethingWeird"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Unknown));
    }

    #[test]
    fn start_defaults_match_spec() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"action":"start","deviceId":"emulator-5554"}"#).unwrap();
        match msg {
            ClientMessage::Start {
                video,
                audio,
                control,
                max_fps,
                bitrate,
                display_mode,
                ..
            } => {
                assert!(video);
                assert!(!audio);
                assert!(control);
                assert_eq!(max_fps, 30);
                assert_eq!(bitrate, 4_000_000);
                assert_eq!(display_mode, DisplayModeJson::Default);
            }
            _ => panic!("expected Start"),
        }
    }

    #[test]
    fn command_id_is_threaded_through() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"action":"getVolume","commandId":"abc-123"}"#,
        )
        .unwrap();
        assert_eq!(msg.command_id(), Some("abc-123"));
    }

    #[test]
    fn adb_command_flattens_sub_action() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"action":"adbCommand","commandType":"setWmDensity","dpi":240}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::AdbCommand { request, .. } => {
                assert!(matches!(request, AdbCommandRequest::SetWmDensity { dpi: 240 }));
            }
            _ => panic!("expected AdbCommand"),
        }
    }
}
