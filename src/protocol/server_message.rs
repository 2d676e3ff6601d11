use serde::Serialize;

use crate::adb::device::Device;

/// A JSON message sent to a browser client: either a response to a
/// correlated command, or an unsolicited event. Tagged on `type`, matching
/// the response-type naming in §4.6 (`"<commandType>Response"`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub enum ServerMessage {
    AdbDevicesList {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
        devices: Vec<DeviceJson>,
    },
    Status {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
        message: String,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
        message: String,
    },
    DeviceName {
        name: String,
    },
    VideoInfo {
        width: u32,
        height: u32,
    },
    AudioInfo {
        codec_id: u32,
    },
    ResolutionChange {
        width: u32,
        height: u32,
    },
    VolumeResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
        value: u8,
    },
    VolumeInfo {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
        value: u8,
    },
    NavResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
    },
    WifiResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
    },
    WifiStatus {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
        enabled: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        ssid: Option<String>,
    },
    BatteryInfo {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
        level: u8,
    },
    LaunchAppResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
    },
    GetDisplayListResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
        displays: Vec<DisplayEntry>,
    },
    SetOverlayResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
    },
    SetWmSizeResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
    },
    SetWmDensityResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
    },
    AdbRotateScreenResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
    },
    CleanupAdbResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
    },
    DiagnosticsResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    DiagnosticsStopped {},
    HarTraceStatus {
        message: String,
    },
    HarTraceResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        success: bool,
    },
    AdbShellOutput {
        line: String,
    },
    AdbShellClosed {},
}

impl ServerMessage {
    pub fn error(command_id: Option<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            command_id,
            success: false,
            message: message.into(),
        }
    }

    pub fn status(command_id: Option<String>, message: impl Into<String>) -> Self {
        ServerMessage::Status {
            command_id,
            success: true,
            message: message.into(),
        }
    }

    pub fn unknown_action(command_id: Option<String>) -> Self {
        Self::error(command_id, "Unknown action")
    }
}

/// Device representation on the wire, distinct from the internal
/// [`Device`] so that cache fields stay internal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceJson {
    pub id: String,
    pub state: String,
}

impl From<&Device> for DeviceJson {
    fn from(device: &Device) -> Self {
        DeviceJson {
            id: device.id.clone(),
            state: device.state.as_str().to_string(),
        }
    }
}

/// One entry of `getDisplayList`'s parsed output.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayEntry {
    pub id: u32,
    pub resolution: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_serializes_with_type_tag() {
        let msg = ServerMessage::error(Some("abc".to_string()), "Unknown action");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Unknown action");
        assert_eq!(json["commandId"], "abc");
    }

    #[test]
    fn command_id_is_omitted_when_absent() {
        let msg = ServerMessage::status(None, "Streaming started");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("commandId").is_none());
    }
}
