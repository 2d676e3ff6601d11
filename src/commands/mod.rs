//! `CommandHub`: dispatches every [`ClientMessage`] variant other than
//! `start`/`disconnect` (which `SessionManager` owns directly) to the
//! matching device-management handler and replies via the client's
//! [`ClientSink`].

pub mod battery;
pub mod diagnostics;
pub mod display;
pub mod har;
pub mod nav;
pub mod shell;
pub mod volume;
pub mod wifi;

use std::sync::Arc;
use std::time::Duration;

use crate::adb::DeviceBus;
use crate::config::ConfigStore;
use crate::error::AppError;
use crate::protocol::{AdbCommandRequest, ClientMessage, ServerMessage};
use crate::session::{ClientSink, SessionManager};

use diagnostics::DiagnosticsRegistry;
use display::RotationCacheStore;
use har::HarTraceRegistry;
use shell::ShellRegistry;

/// The external HAR capture helper binary, resolved from `PATH` the same
/// way `adb` is when no explicit path is configured.
const HAR_CAPTURE_BINARY: &str = "har-capture";

/// Wires together everything a non-streaming device-management command
/// needs: the ADB transport, the session manager (for resolving a
/// client's current device), and one registry per long-running command
/// family. One instance is shared across all connections.
#[derive(Clone)]
pub struct CommandHub {
    device_bus: DeviceBus,
    sessions: Arc<SessionManager>,
    config: ConfigStore,
    rotation_cache: RotationCacheStore,
    diagnostics: DiagnosticsRegistry,
    har_traces: HarTraceRegistry,
    shells: ShellRegistry,
}

impl CommandHub {
    pub fn new(device_bus: DeviceBus, sessions: Arc<SessionManager>, config: ConfigStore) -> Self {
        Self {
            device_bus,
            sessions,
            config,
            rotation_cache: RotationCacheStore::new(),
            diagnostics: DiagnosticsRegistry::new(),
            har_traces: HarTraceRegistry::new(),
            shells: ShellRegistry::new(),
        }
    }

    /// Cancels a diagnostics session on `device_id`, if one is running.
    /// Used by `ClientGateway` on connection close.
    pub fn diagnostics_stop(&self, device_id: &str) -> bool {
        self.diagnostics.stop(device_id)
    }

    /// Cancels `client_id`'s HAR trace, if one is running.
    pub async fn har_stop(&self, client_id: &str) -> bool {
        self.har_traces.stop(client_id).await
    }

    /// Cancels `client_id`'s interactive shell, if one is running.
    pub async fn shell_stop(&self, client_id: &str) -> bool {
        self.shells.stop(client_id).await
    }

    /// Resolves the device a command targets: the client's active
    /// streaming session, since none of these commands carry their own
    /// `deviceId`.
    fn device_for(&self, client_id: &str) -> Option<String> {
        self.sessions.device_for_client(client_id)
    }

    /// `device_bus.shell`, bounded by the configured command timeout so a
    /// wedged device never hangs a command handler forever.
    async fn shell(&self, device_id: &str, args: &[&str]) -> crate::error::Result<String> {
        let command_timeout = Duration::from_secs(self.config.get().session.command_timeout_secs);
        match tokio::time::timeout(command_timeout, self.device_bus.shell(device_id, args)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::CommandTimeout),
        }
    }

    /// Handles one [`ClientMessage`], other than `Start`/`Disconnect`,
    /// replying to `sink` with the matching `ServerMessage`. Returns
    /// `false` for `Start`/`Disconnect`/`Unknown`, which callers route
    /// elsewhere (or, for `Unknown`, reply to directly).
    pub async fn dispatch(&self, client_id: &str, message: ClientMessage, sink: &Arc<dyn ClientSink>) -> bool {
        let command_id = message.command_id().map(str::to_string);

        match message {
            ClientMessage::GetAdbDevices { .. } => {
                self.handle_get_adb_devices(command_id, sink).await;
            }
            ClientMessage::Volume { value, .. } => {
                self.handle_set_volume(client_id, command_id, value, sink).await;
            }
            ClientMessage::GetVolume { .. } => {
                self.handle_get_volume(client_id, command_id, sink).await;
            }
            ClientMessage::NavAction { key, .. } => {
                self.handle_nav_action(client_id, command_id, &key, sink).await;
            }
            ClientMessage::WifiToggle { enable, .. } => {
                self.handle_wifi_toggle(client_id, command_id, enable, sink).await;
            }
            ClientMessage::GetWifiStatus { .. } => {
                self.handle_get_wifi_status(client_id, command_id, sink).await;
            }
            ClientMessage::GetBatteryLevel { .. } => {
                self.handle_get_battery_level(client_id, command_id, sink).await;
            }
            ClientMessage::LaunchApp { package_name, .. } => {
                self.handle_launch_app(client_id, command_id, &package_name, sink).await;
            }
            ClientMessage::AdbCommand { request, .. } => {
                self.handle_adb_command(client_id, command_id, request, sink).await;
            }
            ClientMessage::StartDiagnostics { diagnostics, .. } => {
                self.handle_start_diagnostics(client_id, command_id, diagnostics, sink).await;
            }
            ClientMessage::StopDiagnostics { .. } => {
                self.handle_stop_diagnostics(client_id, sink).await;
            }
            ClientMessage::StartHarTrace {
                url,
                har_filename,
                capture_time,
                ..
            } => {
                self.handle_start_har_trace(client_id, command_id, &url, &har_filename, capture_time, sink);
            }
            ClientMessage::StopHarTrace { .. } => {
                self.handle_stop_har_trace(client_id, command_id, sink).await;
            }
            ClientMessage::StartAdbShell { .. } => {
                self.handle_start_adb_shell(client_id, sink);
            }
            ClientMessage::AdbShellInput { input, .. } => {
                self.handle_adb_shell_input(client_id, &input, sink).await;
            }
            ClientMessage::StopAdbShell { .. } => {
                self.handle_stop_adb_shell(client_id, sink).await;
            }
            ClientMessage::Start { .. } | ClientMessage::Disconnect { .. } | ClientMessage::Unknown => {
                return false;
            }
        }
        true
    }

    async fn handle_get_adb_devices(&self, command_id: Option<String>, sink: &Arc<dyn ClientSink>) {
        match self.device_bus.list().await {
            Ok(devices) => sink.send_json(ServerMessage::AdbDevicesList {
                command_id,
                success: true,
                devices: devices.iter().map(Into::into).collect(),
            }),
            Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
        }
    }

    async fn handle_set_volume(
        &self,
        client_id: &str,
        command_id: Option<String>,
        value: u8,
        sink: &Arc<dyn ClientSink>,
    ) {
        let Some(device_id) = self.device_for(client_id) else {
            sink.send_json(ServerMessage::error(command_id, "no active session"));
            return;
        };
        let android_major = self.sessions.android_major_for_client(client_id);
        match volume::set_volume(&self.device_bus, &device_id, value, android_major).await {
            Ok(()) => sink.send_json(ServerMessage::VolumeResponse {
                command_id,
                success: true,
                value,
            }),
            Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
        }
    }

    async fn handle_get_volume(&self, client_id: &str, command_id: Option<String>, sink: &Arc<dyn ClientSink>) {
        let Some(device_id) = self.device_for(client_id) else {
            sink.send_json(ServerMessage::error(command_id, "no active session"));
            return;
        };
        let max_index = volume::get_max_media_volume(&self.device_bus, &device_id).await;
        let current = self
            .shell(&device_id, &["settings", "get", "system", "volume_music"])
            .await
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(0);
        sink.send_json(ServerMessage::VolumeInfo {
            command_id,
            success: true,
            value: volume::index_to_percent(current, max_index),
        });
    }

    async fn handle_nav_action(
        &self,
        client_id: &str,
        command_id: Option<String>,
        key: &str,
        sink: &Arc<dyn ClientSink>,
    ) {
        let Some(device_id) = self.device_for(client_id) else {
            sink.send_json(ServerMessage::error(command_id, "no active session"));
            return;
        };
        let Some(keycode) = nav::keycode_for(key) else {
            sink.send_json(ServerMessage::error(command_id, format!("unknown nav key {key}")));
            return;
        };
        let keycode = keycode.to_string();
        match self.shell(&device_id, &["input", "keyevent", &keycode]).await {
            Ok(_) => sink.send_json(ServerMessage::NavResponse {
                command_id,
                success: true,
            }),
            Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
        }
    }

    async fn handle_wifi_toggle(
        &self,
        client_id: &str,
        command_id: Option<String>,
        enable: bool,
        sink: &Arc<dyn ClientSink>,
    ) {
        let Some(device_id) = self.device_for(client_id) else {
            sink.send_json(ServerMessage::error(command_id, "no active session"));
            return;
        };
        match wifi::toggle_wifi(&self.device_bus, &device_id, enable).await {
            Ok(_) => sink.send_json(ServerMessage::WifiResponse {
                command_id,
                success: true,
            }),
            Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
        }
    }

    async fn handle_get_wifi_status(&self, client_id: &str, command_id: Option<String>, sink: &Arc<dyn ClientSink>) {
        let Some(device_id) = self.device_for(client_id) else {
            sink.send_json(ServerMessage::error(command_id, "no active session"));
            return;
        };
        match wifi::get_wifi_status(&self.device_bus, &device_id).await {
            Ok(status) => sink.send_json(ServerMessage::WifiStatus {
                command_id,
                success: true,
                enabled: status.enabled,
                ssid: status.ssid,
            }),
            Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
        }
    }

    async fn handle_get_battery_level(&self, client_id: &str, command_id: Option<String>, sink: &Arc<dyn ClientSink>) {
        let Some(device_id) = self.device_for(client_id) else {
            sink.send_json(ServerMessage::error(command_id, "no active session"));
            return;
        };
        match battery::get_battery_level(&self.device_bus, &device_id).await {
            Ok(level) => sink.send_json(ServerMessage::BatteryInfo {
                command_id,
                success: true,
                level,
            }),
            Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
        }
    }

    async fn handle_launch_app(
        &self,
        client_id: &str,
        command_id: Option<String>,
        package_name: &str,
        sink: &Arc<dyn ClientSink>,
    ) {
        let Some(device_id) = self.device_for(client_id) else {
            sink.send_json(ServerMessage::error(command_id, "no active session"));
            return;
        };
        let result = self
            .shell(&device_id, &["monkey", "-p", package_name, "-c", "android.intent.category.LAUNCHER", "1"])
            .await;
        match result {
            Ok(_) => sink.send_json(ServerMessage::LaunchAppResponse {
                command_id,
                success: true,
            }),
            Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
        }
    }

    async fn handle_adb_command(
        &self,
        client_id: &str,
        command_id: Option<String>,
        request: AdbCommandRequest,
        sink: &Arc<dyn ClientSink>,
    ) {
        let Some(device_id) = self.device_for(client_id) else {
            sink.send_json(ServerMessage::error(command_id, "no active session"));
            return;
        };

        match request {
            AdbCommandRequest::GetDisplayList => {
                match self.sessions.list_displays(&device_id).await {
                    Ok(output) => sink.send_json(ServerMessage::GetDisplayListResponse {
                        command_id,
                        success: true,
                        displays: display::parse_display_list(&output),
                    }),
                    Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
                }
            }
            AdbCommandRequest::SetOverlay { resolution, dpi } => {
                let width_height = resolution.replace('x', ",");
                let size_result = self.shell(&device_id, &["wm", "size", &width_height]).await;
                let density_result = self.shell(&device_id, &["wm", "density", &dpi]).await;
                match size_result.and(density_result) {
                    Ok(_) => sink.send_json(ServerMessage::SetOverlayResponse {
                        command_id,
                        success: true,
                    }),
                    Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
                }
            }
            AdbCommandRequest::SetWmSize { width, height } => {
                let size = format!("{width}x{height}");
                match self.shell(&device_id, &["wm", "size", &size]).await {
                    Ok(_) => sink.send_json(ServerMessage::SetWmSizeResponse {
                        command_id,
                        success: true,
                    }),
                    Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
                }
            }
            AdbCommandRequest::SetWmDensity { dpi } => {
                let dpi = dpi.to_string();
                match self.shell(&device_id, &["wm", "density", &dpi]).await {
                    Ok(_) => sink.send_json(ServerMessage::SetWmDensityResponse {
                        command_id,
                        success: true,
                    }),
                    Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
                }
            }
            AdbCommandRequest::AdbRotateScreen { rotation } => {
                let rotation = rotation.to_string();
                let set_rotation = self
                    .shell(&device_id, &["settings", "put", "system", "user_rotation", &rotation])
                    .await;
                let disable_auto = self
                    .shell(&device_id, &["settings", "put", "system", "accelerometer_rotation", "0"])
                    .await;
                match set_rotation.and(disable_auto) {
                    Ok(_) => sink.send_json(ServerMessage::AdbRotateScreenResponse {
                        command_id,
                        success: true,
                    }),
                    Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
                }
            }
            AdbCommandRequest::CleanupAdb => {
                self.rotation_cache.capture(&self.device_bus, &device_id).await.ok();
                let rotation = self.rotation_cache.take(&device_id);
                let result = self.restore_rotation(&device_id, &rotation).await;
                match result {
                    Ok(()) => sink.send_json(ServerMessage::CleanupAdbResponse {
                        command_id,
                        success: true,
                    }),
                    Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
                }
            }
        }
    }

    async fn restore_rotation(
        &self,
        device_id: &str,
        rotation: &crate::session::RotationCache,
    ) -> crate::error::Result<()> {
        if let Some(user_rotation) = rotation.user_rotation {
            self.shell(
                device_id,
                &["settings", "put", "system", "user_rotation", &user_rotation.to_string()],
            )
            .await?;
        }
        if let Some(accelerometer_rotation) = rotation.accelerometer_rotation {
            self.shell(
                device_id,
                &[
                    "settings",
                    "put",
                    "system",
                    "accelerometer_rotation",
                    &accelerometer_rotation.to_string(),
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn handle_start_diagnostics(
        &self,
        client_id: &str,
        command_id: Option<String>,
        diagnostics: Vec<String>,
        sink: &Arc<dyn ClientSink>,
    ) {
        let Some(device_id) = self.device_for(client_id) else {
            sink.send_json(ServerMessage::error(command_id, "no active session"));
            return;
        };
        let output_dir = self.config.get().diagnostics.diagnostics_dir.clone();
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let result = self
            .diagnostics
            .start(&self.device_bus, &device_id, &diagnostics, &output_dir, timestamp)
            .await;
        match result {
            Ok(path) => sink.send_json(ServerMessage::DiagnosticsResponse {
                command_id,
                success: true,
                message: Some(path.display().to_string()),
            }),
            Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
        }
    }

    async fn handle_stop_diagnostics(&self, client_id: &str, sink: &Arc<dyn ClientSink>) {
        let Some(device_id) = self.device_for(client_id) else {
            return;
        };
        if self.diagnostics.stop(&device_id) {
            sink.send_json(ServerMessage::DiagnosticsStopped {});
        }
    }

    fn handle_start_har_trace(
        &self,
        client_id: &str,
        command_id: Option<String>,
        url: &str,
        har_filename: &str,
        capture_time: Option<u64>,
        sink: &Arc<dyn ClientSink>,
    ) {
        let har_dir = self.config.get().diagnostics.har_dir.clone();
        let har_path = std::path::Path::new(&har_dir).join(har_filename);
        let result = self.har_traces.start(
            HAR_CAPTURE_BINARY,
            client_id,
            url,
            &har_path.to_string_lossy(),
            capture_time,
            sink.clone(),
        );
        match result {
            Ok(()) => sink.send_json(ServerMessage::HarTraceResponse {
                command_id,
                success: true,
            }),
            Err(err) => sink.send_json(ServerMessage::error(command_id, err.to_string())),
        }
    }

    async fn handle_stop_har_trace(&self, client_id: &str, command_id: Option<String>, sink: &Arc<dyn ClientSink>) {
        let stopped = self.har_traces.stop(client_id).await;
        sink.send_json(ServerMessage::HarTraceResponse {
            command_id,
            success: stopped,
        });
    }

    fn handle_start_adb_shell(&self, client_id: &str, sink: &Arc<dyn ClientSink>) {
        let Some(device_id) = self.device_for(client_id) else {
            sink.send_json(ServerMessage::error(None, "no active session"));
            return;
        };
        if let Err(err) = self.shells.start(&self.device_bus, &device_id, client_id, sink.clone()) {
            sink.send_json(ServerMessage::error(None, err.to_string()));
        }
    }

    async fn handle_adb_shell_input(&self, client_id: &str, input: &str, sink: &Arc<dyn ClientSink>) {
        sink.send_json(ServerMessage::AdbShellOutput {
            line: format!("$ {input}"),
        });
        let _ = self.shells.send_input(client_id, input).await;
    }

    async fn handle_stop_adb_shell(&self, client_id: &str, sink: &Arc<dyn ClientSink>) {
        self.shells.stop(client_id).await;
        sink.send_json(ServerMessage::AdbShellClosed {});
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn har_capture_binary_name_is_stable() {
        assert_eq!(HAR_CAPTURE_BINARY, "har-capture");
    }
}
