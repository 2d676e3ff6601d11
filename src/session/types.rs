use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::protocol::ServerMessage;

/// A 31-bit session correlation id, formatted as 8 lowercase hex chars.
pub fn generate_scid() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..(1u32 << 31));
    format!("{value:08x}")
}

/// Display mode requested for a session (mirrors `DisplayModeJson` on the
/// wire, used internally once a `start` request has been accepted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Default,
    Overlay,
    Virtual,
    Dex,
    NativeTaskbar,
}

/// Everything a `start` request negotiated, carried for the lifetime of
/// the session.
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub video: bool,
    pub audio: bool,
    pub control: bool,
    pub max_fps: u32,
    pub video_bit_rate: u32,
    pub display_mode: DisplayMode,
    pub resolution: Option<String>,
    pub dpi: Option<String>,
    pub turn_screen_off: bool,
}

/// A session's lifecycle state. `Failed` is intentionally absent: per
/// §4.3, any failure condition transitions immediately to `Draining`
/// rather than lingering in a separate marker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Provisioning,
    Pushing,
    ServerSpawning,
    AwaitingSockets,
    Running,
    Draining,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionState::Provisioning => "Provisioning",
            SessionState::Pushing => "Pushing",
            SessionState::ServerSpawning => "ServerSpawning",
            SessionState::AwaitingSockets => "AwaitingSockets",
            SessionState::Running => "Running",
            SessionState::Draining => "Draining",
            SessionState::Closed => "Closed",
        };
        write!(f, "{label}")
    }
}

/// Sink a session writes client-addressed messages into. Implemented by
/// the web layer's per-connection WebSocket writer; kept as a trait here
/// so `session` has no compile-time dependency on `axum`.
pub trait ClientSink: Send + Sync {
    fn send_json(&self, message: ServerMessage);
    fn send_bytes(&self, bytes: Bytes);
    /// Approximate bytes currently queued for this client, used by
    /// `MediaPump`'s backpressure policy.
    fn buffered_bytes(&self) -> usize;
}

/// Per-device rotation state cached so `cleanupAdb` can restore it,
/// guarded by its own lock per §5 ("Rotation-state cache per device").
#[derive(Debug, Clone, Default)]
pub struct RotationCache {
    pub user_rotation: Option<u32>,
    pub accelerometer_rotation: Option<u32>,
}

/// A live streaming session, owned by [`crate::session::manager::SessionManager`].
pub struct Session {
    pub scid: String,
    pub device_id: String,
    pub owner_client_id: String,
    pub display_mode: DisplayMode,
    pub options: StartOptions,
    pub local_port: u16,
    pub android_major: Option<u32>,
    pub turn_screen_off_requested: bool,
    pub state: SessionState,
    pub sink: Arc<dyn ClientSink>,
    pub cancel: CancellationToken,
    /// Incremented directly by the media pumps, which never hold the
    /// session-map lock while doing so.
    pub dropped_video_frames: Arc<AtomicU64>,
    pub dropped_audio_frames: Arc<AtomicU64>,
    /// Join handles for this session's pump and control-router writer
    /// tasks, set once each is spawned. `cleanup_session` waits on these
    /// (bounded by `pump_join_timeout`) instead of sleeping a fixed delay.
    pub video_pump_handle: Option<tokio::task::JoinHandle<()>>,
    pub audio_pump_handle: Option<tokio::task::JoinHandle<()>>,
    pub control_router_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Session {
    pub fn new(
        scid: String,
        device_id: String,
        owner_client_id: String,
        display_mode: DisplayMode,
        options: StartOptions,
        local_port: u16,
        sink: Arc<dyn ClientSink>,
        parent_cancel: &CancellationToken,
    ) -> Self {
        Self {
            scid,
            device_id,
            owner_client_id,
            display_mode,
            options,
            local_port,
            android_major: None,
            turn_screen_off_requested: false,
            state: SessionState::Provisioning,
            sink,
            cancel: parent_cancel.child_token(),
            dropped_video_frames: Arc::new(AtomicU64::new(0)),
            dropped_audio_frames: Arc::new(AtomicU64::new(0)),
            video_pump_handle: None,
            audio_pump_handle: None,
            control_router_handle: None,
        }
    }

    pub fn mark_draining(&mut self) {
        if self.state != SessionState::Closed {
            self.state = SessionState::Draining;
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state == SessionState::Closed
    }
}

/// scid -> Session, the map `SessionManager` guards with a single lock.
pub type SessionMap = HashMap<String, Session>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scid_is_eight_lowercase_hex_chars() {
        let scid = generate_scid();
        assert_eq!(scid.len(), 8);
        assert!(scid.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn scids_are_not_trivially_repeated() {
        let a = generate_scid();
        let b = generate_scid();
        assert_ne!(a, b, "two consecutive scids collided, which should be exceedingly rare");
    }

    #[test]
    fn display_state_labels_match_spec_names() {
        assert_eq!(SessionState::AwaitingSockets.to_string(), "AwaitingSockets");
        assert_eq!(SessionState::Draining.to_string(), "Draining");
    }
}
