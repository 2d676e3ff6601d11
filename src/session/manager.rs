//! `SessionManager`: owns the `scid -> Session` map and drives a session
//! from `createSession` through its acceptance phase to `cleanupSession`.
//!
//! The map itself follows the teacher's `VideoSessionManager` shape: one
//! lock around a `HashMap`, taken only for map mutation, idempotent
//! removal, and a stale-session sweep — never held across a socket read,
//! write, or ADB round-trip.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::adb::DeviceBus;
use crate::error::{AppError, Result};
use crate::protocol::ServerMessage;
use crate::wire::handshake;

use super::control_router::ControlRouter;
use super::display_mode::{self, clamp_dpi_downward, magic_dpi};
use super::pump::{run_audio_pump, run_video_pump};
use super::types::{
    generate_scid, ClientSink, DisplayMode, RotationCache, Session, SessionMap, SessionState,
    StartOptions,
};

const REMOTE_SERVER_PATH: &str = "/data/local/tmp/kvm-gateway-server.jar";
const SCRCPY_SOCKET_PREFIX: &str = "scrcpy_";

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    pub server_port_base: u16,
    pub handshake_timeout: Duration,
    pub pump_join_timeout: Duration,
    pub command_timeout: Duration,
    pub max_client_buffer_bytes: usize,
    pub control_queue_capacity: usize,
}

pub struct SessionManager {
    sessions: Arc<RwLock<SessionMap>>,
    /// owner client id -> scid, the inverse index needed for the
    /// `AlreadyAttached` check and for connection-close cleanup.
    owners: Arc<RwLock<HashMap<String, String>>>,
    routers: Arc<RwLock<HashMap<String, ControlRouter>>>,
    rotation_cache: Arc<RwLock<HashMap<String, RotationCache>>>,
    device_bus: DeviceBus,
    root_cancel: CancellationToken,
    config: SessionManagerConfig,
}

impl SessionManager {
    pub fn new(device_bus: DeviceBus, root_cancel: CancellationToken, config: SessionManagerConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            owners: Arc::new(RwLock::new(HashMap::new())),
            routers: Arc::new(RwLock::new(HashMap::new())),
            rotation_cache: Arc::new(RwLock::new(HashMap::new())),
            device_bus,
            root_cancel,
            config,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    fn owner_has_session(&self, client_id: &str) -> bool {
        self.owners.read().contains_key(client_id)
    }

    fn allocate_local_port(&self) -> u16 {
        let live = self.session_count() as u16;
        let base = self.config.server_port_base;
        let mut candidate = base.wrapping_add(live % 1000);
        let sessions = self.sessions.read();
        let used_ports: std::collections::HashSet<u16> =
            sessions.values().map(|s| s.local_port).collect();
        while used_ports.contains(&candidate) {
            candidate = candidate.wrapping_add(1);
        }
        candidate
    }

    /// Builds the on-device server's space-separated `key=value` option
    /// string per §6, folding in display-mode-specific flags.
    fn build_server_options(
        options: &StartOptions,
        scid: &str,
        android_major: Option<u32>,
    ) -> String {
        let audio = options.audio && android_major.map(|v| v >= 11).unwrap_or(true);

        let mut parts = vec![
            format!("video={}", options.video),
            format!("audio={audio}"),
            format!("control={}", options.control),
            format!("max_fps={}", options.max_fps),
            format!("video_bit_rate={}", options.video_bit_rate),
            format!("scid={scid}"),
        ];

        if options.turn_screen_off {
            parts.push("power_on=false".to_string());
            parts.push("power_off_on_close=true".to_string());
        }

        match options.display_mode {
            DisplayMode::Dex => parts.push("display_id=2".to_string()),
            DisplayMode::Virtual => {
                if let (Some(resolution), Some(dpi)) = (&options.resolution, &options.dpi) {
                    parts.push(format!("new_display={resolution}/{dpi}"));
                }
            }
            _ => {}
        }

        parts.join(" ")
    }

    /// `createSession`: pushes the server, negotiates sockets, and leaves
    /// the session `Running` with its pumps and control router live.
    pub async fn create_session(
        &self,
        client_id: &str,
        device_id: &str,
        options: StartOptions,
        sink: Arc<dyn ClientSink>,
    ) -> Result<String> {
        if self.owner_has_session(client_id) {
            return Err(AppError::AlreadyAttached(client_id.to_string()));
        }

        let scid = generate_scid();
        let local_port = self.allocate_local_port();

        let session = Session::new(
            scid.clone(),
            device_id.to_string(),
            client_id.to_string(),
            options.display_mode,
            options.clone(),
            local_port,
            sink.clone(),
            &self.root_cancel,
        );

        self.sessions.write().insert(scid.clone(), session);
        self.owners.write().insert(client_id.to_string(), scid.clone());

        // The listener is bound before the on-device server is spawned: the
        // server dials back through the reverse tunnel as soon as it starts,
        // and it must find something listening on the other end.
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), local_port);
        let std_listener = crate::utils::net::bind_tcp_listener(bind_addr)
            .map_err(|e| AppError::ServerSpawnFailed(e.to_string()))?;
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| AppError::ServerSpawnFailed(e.to_string()))?;

        match self.provision(&scid, device_id, &options, local_port).await {
            Ok(android_major) => {
                self.run_acceptance_and_stream(&scid, &options, listener, sink, android_major)
                    .await?;
                Ok(scid)
            }
            Err(err) => {
                self.cleanup_session(&scid).await?;
                Err(err)
            }
        }
    }

    /// Pushes the server binary, sets up the reverse tunnel, applies
    /// display-mode preconditions, and spawns the on-device server.
    /// Returns the device's cached Android major version, if known.
    async fn provision(
        &self,
        scid: &str,
        device_id: &str,
        options: &StartOptions,
        local_port: u16,
    ) -> Result<Option<u32>> {
        self.set_state(scid, SessionState::Pushing);
        self.device_bus
            .push(
                device_id,
                std::path::Path::new("assets/kvm-gateway-server.jar"),
                REMOTE_SERVER_PATH,
            )
            .await?;

        let local_abstract = format!("{SCRCPY_SOCKET_PREFIX}{scid}");
        let existing = self.device_bus.reverse_list(device_id).await.unwrap_or_default();
        if !existing.iter().any(|line| line.contains(&local_abstract)) {
            self.device_bus
                .reverse_add(device_id, &local_abstract, local_port)
                .await?;
        }

        let android_major = self
            .device_bus
            .shell(device_id, &["getprop", "ro.build.version.release"])
            .await
            .ok()
            .and_then(|v| v.split('.').next().and_then(|s| s.parse::<u32>().ok()));

        self.apply_display_mode_preconditions(device_id, options, android_major)
            .await?;

        self.set_state(scid, SessionState::ServerSpawning);
        let server_options = Self::build_server_options(options, scid, android_major);
        let class_entry = format!(
            "CLASSPATH={REMOTE_SERVER_PATH} app_process / com.gateway.Server {server_options}"
        );
        let (child, mut output) = self.device_bus.spawn_shell(device_id, &[&class_entry])?;

        // The child is kept alive for the session's lifetime by this task
        // rather than being dropped here: `DeviceBus::spawn_shell` sets
        // `kill_on_drop(true)`, so dropping it immediately would tear the
        // on-device server down before a single socket connects.
        let scid_owned = scid.to_string();
        let cancel = self.session_cancel(scid);
        tokio::spawn(async move {
            let mut child = child;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = child.kill().await;
                        break;
                    }
                    line = output.recv() => match line {
                        Some(line) => tracing::debug!(scid = %scid_owned, "device server: {line}"),
                        None => break,
                    },
                    status = child.wait() => {
                        tracing::warn!(scid = %scid_owned, status = ?status, "device server exited");
                        break;
                    }
                }
            }
        });

        Ok(android_major)
    }

    async fn apply_display_mode_preconditions(
        &self,
        device_id: &str,
        options: &StartOptions,
        android_major: Option<u32>,
    ) -> Result<()> {
        let _ = android_major;
        if options.display_mode == DisplayMode::NativeTaskbar {
            if let Some(resolution) = &options.resolution {
                if let Some((_, height_str)) = resolution.split_once('x') {
                    if let Ok(height) = height_str.parse::<u32>() {
                        let requested_dpi = options
                            .dpi
                            .as_ref()
                            .and_then(|d| d.parse::<u32>().ok())
                            .unwrap_or_else(|| magic_dpi(height));
                        let clamped = clamp_dpi_downward(requested_dpi, height);

                        let rotation = self.current_rotation(device_id).await;
                        self.rotation_cache.write().insert(device_id.to_string(), rotation);

                        for command in display_mode::precondition_commands(
                            options.display_mode,
                            Some(resolution),
                            Some(&clamped.to_string()),
                        ) {
                            let args: Vec<&str> = command.iter().map(String::as_str).collect();
                            self.device_bus.shell(device_id, &args).await?;
                        }
                        return Ok(());
                    }
                }
            }
        }

        for command in display_mode::precondition_commands(
            options.display_mode,
            options.resolution.as_deref(),
            options.dpi.as_deref(),
        ) {
            let args: Vec<&str> = command.iter().map(String::as_str).collect();
            self.device_bus.shell(device_id, &args).await?;
        }
        Ok(())
    }

    async fn current_rotation(&self, device_id: &str) -> RotationCache {
        let user_rotation = self
            .device_bus
            .shell(device_id, &["settings", "get", "system", "user_rotation"])
            .await
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok());
        let accelerometer_rotation = self
            .device_bus
            .shell(
                device_id,
                &["settings", "get", "system", "accelerometer_rotation"],
            )
            .await
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok());
        RotationCache {
            user_rotation,
            accelerometer_rotation,
        }
    }

    fn set_state(&self, scid: &str, state: SessionState) {
        if let Some(session) = self.sessions.write().get_mut(scid) {
            session.state = state;
        }
    }

    /// Acceptance phase: accept up to three TCP connections in
    /// `{video, audio, control}` order (per the enabled flags), handshake
    /// each within `HANDSHAKE_TIMEOUT`, then start the pumps and writer.
    async fn run_acceptance_and_stream(
        &self,
        scid: &str,
        options: &StartOptions,
        listener: tokio::net::TcpListener,
        sink: Arc<dyn ClientSink>,
        android_major: Option<u32>,
    ) -> Result<()> {
        self.set_state(scid, SessionState::AwaitingSockets);

        let mut expected_roles = Vec::new();
        if options.video {
            expected_roles.push(SocketRole::Video);
        }
        if options.audio {
            expected_roles.push(SocketRole::Audio);
        }
        if options.control {
            expected_roles.push(SocketRole::Control);
        }

        let mut device_name_emitted = false;
        let mut video_socket = None;
        let mut video_dimensions = (0u32, 0u32);
        let mut control_socket = None;
        let mut audio_pump_handle = None;

        for role in &expected_roles {
            let accept_result = timeout(self.config.handshake_timeout, listener.accept()).await;
            let (mut socket, _) = match accept_result {
                Ok(Ok(pair)) => pair,
                _ => return Err(AppError::HandshakeTimeout),
            };

            timeout(self.config.handshake_timeout, handshake::read_dummy_byte(&mut socket))
                .await
                .map_err(|_| AppError::HandshakeTimeout)??;

            if !device_name_emitted {
                let meta = timeout(
                    self.config.handshake_timeout,
                    handshake::read_device_meta(&mut socket),
                )
                .await
                .map_err(|_| AppError::HandshakeTimeout)??;
                sink.send_json(ServerMessage::DeviceName {
                    name: meta.device_name,
                });
                device_name_emitted = true;
            }

            match role {
                SocketRole::Video => {
                    let header = timeout(
                        self.config.handshake_timeout,
                        handshake::read_video_codec_header(&mut socket),
                    )
                    .await
                    .map_err(|_| AppError::HandshakeTimeout)??;
                    sink.send_json(ServerMessage::VideoInfo {
                        width: header.width,
                        height: header.height,
                    });
                    video_dimensions = (header.width, header.height);
                    video_socket = Some(socket);
                }
                SocketRole::Audio => {
                    let codec = timeout(
                        self.config.handshake_timeout,
                        handshake::read_audio_codec_header(&mut socket),
                    )
                    .await
                    .map_err(|_| AppError::HandshakeTimeout)??;
                    if let Some(codec_id) = codec {
                        sink.send_json(ServerMessage::AudioInfo { codec_id });
                        audio_pump_handle = Some(self.spawn_audio_pump(scid, socket, sink.clone()));
                    } else {
                        sink.send_json(ServerMessage::status(
                            None,
                            "Audio disabled (Android < 11)",
                        ));
                    }
                }
                SocketRole::Control => {
                    control_socket = Some(socket);
                }
            }
        }

        let video_pump_handle = video_socket.map(|socket| self.spawn_video_pump(scid, socket, sink.clone(), video_dimensions));

        let control_router_handle = control_socket.map(|socket| self.attach_control_router(scid, socket));

        {
            let mut sessions = self.sessions.write();
            if let Some(session) = sessions.get_mut(scid) {
                session.state = SessionState::Running;
                session.android_major = android_major;
                session.video_pump_handle = video_pump_handle;
                session.audio_pump_handle = audio_pump_handle;
                session.control_router_handle = control_router_handle;
            }
        }
        sink.send_json(ServerMessage::status(None, "Streaming started"));

        Ok(())
    }

    fn spawn_video_pump(
        &self,
        scid: &str,
        socket: TcpStream,
        sink: Arc<dyn ClientSink>,
        initial_dimensions: (u32, u32),
    ) -> tokio::task::JoinHandle<()> {
        let cancel = self.session_cancel(scid);
        let dropped = self.session_dropped_video_counter(scid);
        let max_bytes = self.config.max_client_buffer_bytes;
        let scid = scid.to_string();
        tokio::spawn(async move {
            let _ = run_video_pump(
                socket,
                sink,
                cancel,
                max_bytes,
                dropped,
                &scid,
                initial_dimensions,
            )
            .await;
        })
    }

    fn spawn_audio_pump(
        &self,
        scid: &str,
        socket: TcpStream,
        sink: Arc<dyn ClientSink>,
    ) -> tokio::task::JoinHandle<()> {
        let cancel = self.session_cancel(scid);
        let dropped = self.session_dropped_audio_counter(scid);
        let max_bytes = self.config.max_client_buffer_bytes;
        let scid = scid.to_string();
        tokio::spawn(async move {
            let _ = run_audio_pump(socket, sink, cancel, max_bytes, dropped, &scid).await;
        })
    }

    fn attach_control_router(&self, scid: &str, socket: TcpStream) -> tokio::task::JoinHandle<()> {
        let cancel = self.session_cancel(scid);
        let (router, handle) = ControlRouter::spawn(socket, cancel, self.config.control_queue_capacity);
        self.routers.write().insert(scid.to_string(), router);
        handle
    }

    fn session_cancel(&self, scid: &str) -> CancellationToken {
        self.sessions
            .read()
            .get(scid)
            .map(|s| s.cancel.clone())
            .unwrap_or_else(|| self.root_cancel.child_token())
    }

    fn session_dropped_video_counter(&self, scid: &str) -> Arc<std::sync::atomic::AtomicU64> {
        self.sessions
            .read()
            .get(scid)
            .map(|s| s.dropped_video_frames.clone())
            .unwrap_or_default()
    }

    fn session_dropped_audio_counter(&self, scid: &str) -> Arc<std::sync::atomic::AtomicU64> {
        self.sessions
            .read()
            .get(scid)
            .map(|s| s.dropped_audio_frames.clone())
            .unwrap_or_default()
    }

    /// Forwards a binary control frame to `scid`'s control router, if any.
    pub fn forward_control_frame(&self, scid: &str, frame: bytes::Bytes) {
        let router = self.routers.read().get(scid).cloned();
        if let Some(router) = router {
            let _ = router.try_enqueue(frame);
        }
    }

    pub fn scid_for_client(&self, client_id: &str) -> Option<String> {
        self.owners.read().get(client_id).cloned()
    }

    /// Device id backing `client_id`'s active session, if any. Used by
    /// `CommandHub` to target device-management commands that don't carry
    /// an explicit `deviceId` of their own (volume, nav, wifi, …).
    pub fn device_for_client(&self, client_id: &str) -> Option<String> {
        let scid = self.scid_for_client(client_id)?;
        self.sessions.read().get(&scid).map(|s| s.device_id.clone())
    }

    /// Cached Android major version for `client_id`'s active session, if
    /// known. `None` if there is no session or the version wasn't resolved
    /// during provisioning.
    pub fn android_major_for_client(&self, client_id: &str) -> Option<u32> {
        let scid = self.scid_for_client(client_id)?;
        self.sessions.read().get(&scid)?.android_major
    }

    /// `getDisplayList`: pushes the server binary and spawns it in
    /// list-mode under a throwaway scid (no listener, no reverse tunnel —
    /// list-mode prints to stdout and exits on its own), and returns its
    /// raw output for `display::parse_display_list` to parse.
    pub async fn list_displays(&self, device_id: &str) -> Result<String> {
        let scid = generate_scid();
        self.device_bus
            .push(
                device_id,
                std::path::Path::new("assets/kvm-gateway-server.jar"),
                REMOTE_SERVER_PATH,
            )
            .await?;

        let server_options = format!("list_displays=true scid={scid}");
        let class_entry = format!(
            "CLASSPATH={REMOTE_SERVER_PATH} app_process / com.gateway.Server {server_options}"
        );
        let (mut child, mut output) = self.device_bus.spawn_shell(device_id, &[&class_entry])?;

        let collect = async {
            let mut collected = String::new();
            loop {
                tokio::select! {
                    biased;
                    line = output.recv() => match line {
                        Some(line) => {
                            collected.push_str(&line);
                            collected.push('\n');
                        }
                        None => break,
                    },
                    status = child.wait() => {
                        tracing::debug!(scid = %scid, status = ?status, "list-mode device server exited");
                        break;
                    }
                }
            }
            collected
        };

        timeout(self.config.command_timeout, collect)
            .await
            .map_err(|_| AppError::CommandTimeout)
    }

    /// Idempotent: calling twice on the same `scid` is a no-op the second
    /// time and does not emit a second `status{"Streaming stopped"}`.
    pub async fn cleanup_session(&self, scid: &str) -> Result<()> {
        let removed = {
            let mut sessions = self.sessions.write();
            sessions.remove(scid)
        };

        let Some(session) = removed else {
            return Ok(());
        };

        self.owners.write().remove(&session.owner_client_id);
        self.routers.write().remove(scid);
        session.cancel.cancel();

        // Waits for the pump and control-router tasks to actually notice
        // the cancellation and drop their socket handles, bounded by
        // `pump_join_timeout` so a stuck task can't hang teardown forever.
        let handles: Vec<_> = [
            session.video_pump_handle,
            session.audio_pump_handle,
            session.control_router_handle,
        ]
        .into_iter()
        .flatten()
        .collect();
        if timeout(self.config.pump_join_timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!(scid = %scid, "pump/control-router tasks did not finish within the join timeout");
        }

        let local_abstract = format!("{SCRCPY_SOCKET_PREFIX}{scid}");
        let _ = self
            .device_bus
            .reverse_remove(&session.device_id, &local_abstract)
            .await;

        let rotation = self
            .rotation_cache
            .write()
            .remove(&session.device_id)
            .unwrap_or_default();
        for command in display_mode::cleanup_commands(session.display_mode, &rotation) {
            let args: Vec<&str> = command.iter().map(String::as_str).collect();
            let _ = self.device_bus.shell(&session.device_id, &args).await;
        }

        session
            .sink
            .send_json(ServerMessage::status(None, "Streaming stopped"));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketRole {
    Video,
    Audio,
    Control,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_options_force_audio_off_below_android_11() {
        let options = StartOptions {
            video: true,
            audio: true,
            control: true,
            max_fps: 30,
            video_bit_rate: 4_000_000,
            display_mode: DisplayMode::Default,
            resolution: None,
            dpi: None,
            turn_screen_off: false,
        };
        let rendered = SessionManager::build_server_options(&options, "deadbeef", Some(10));
        assert!(rendered.contains("audio=false"));

        let rendered = SessionManager::build_server_options(&options, "deadbeef", Some(12));
        assert!(rendered.contains("audio=true"));
    }

    #[test]
    fn dex_mode_adds_display_id() {
        let options = StartOptions {
            video: true,
            audio: false,
            control: true,
            max_fps: 30,
            video_bit_rate: 4_000_000,
            display_mode: DisplayMode::Dex,
            resolution: None,
            dpi: None,
            turn_screen_off: false,
        };
        let rendered = SessionManager::build_server_options(&options, "deadbeef", None);
        assert!(rendered.contains("display_id=2"));
    }
}
