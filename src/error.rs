use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type.
///
/// Variants are grouped the way the error handling design groups them: the
/// ones that can only occur before any session socket exists, the ones that
/// occur during handshake and therefore require rolling back display-mode
/// preconditions, the ones that occur once a session is `Running` and always
/// drain it, and the ones that are purely per-command and never touch
/// session state.
#[derive(Error, Debug)]
pub enum AppError {
    // --- pre-socket failures ---
    #[error("adb is not available: {0}")]
    AdbUnavailable(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("failed to push server binary to device: {0}")]
    PushFailed(String),

    #[error("failed to set up reverse tunnel: {0}")]
    ReverseSetupFailed(String),

    #[error("failed to spawn device server: {0}")]
    ServerSpawnFailed(String),

    #[error("client {0} already has an attached session")]
    AlreadyAttached(String),

    // --- handshake failures ---
    #[error("handshake dummy byte was not zero")]
    HandshakeBadDummy,

    #[error("handshake did not complete within the timeout")]
    HandshakeTimeout,

    #[error("unrecognized codec id 0x{0:08x}")]
    UnsupportedCodec(u32),

    // --- running-session failures ---
    #[error("socket was reset by peer")]
    SocketReset,

    #[error("socket write failed: {0}")]
    SocketWriteError(String),

    // --- per-command failures, split per DESIGN NOTES item 5 ---
    #[error("command timed out")]
    CommandTimeout,

    #[error("shell command `{command}` exited with status {code}: {stderr}")]
    ShellNonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("adb transport failed: {0}")]
    ShellTransportError(String),

    // --- client protocol misbehavior ---
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    // --- ambient ---
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this error, if raised during `createSession`, requires the
    /// display-mode precondition commands to be rolled back.
    pub fn requires_display_mode_rollback(&self) -> bool {
        matches!(
            self,
            AppError::HandshakeBadDummy
                | AppError::HandshakeTimeout
                | AppError::UnsupportedCodec(_)
        )
    }

    /// Whether this error invalidates cached per-device state
    /// (`cachedAndroidMajorVersion`, `cachedMaxMediaVolume`) because the
    /// device itself may have gone away, as opposed to the remote command
    /// simply failing.
    pub fn invalidates_device_cache(&self) -> bool {
        matches!(
            self,
            AppError::ShellTransportError(_) | AppError::DeviceUnavailable(_)
        )
    }

    fn status_code(&self) -> StatusCode {
        // The WebSocket protocol carries failure in a `success: false` JSON
        // field, not in the HTTP status; the plain HTTP surface (static
        // files) never returns AppError. Kept at 200 for any handler that
        // does use this IntoResponse impl, matching that convention.
        StatusCode::OK
    }
}

/// Error response body for the few plain HTTP endpoints that return one.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        tracing::error!(
            error_type = std::any::type_name_of_val(&self),
            error_message = %body.message,
            "request failed"
        );

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_errors_require_rollback() {
        assert!(AppError::HandshakeBadDummy.requires_display_mode_rollback());
        assert!(AppError::UnsupportedCodec(0).requires_display_mode_rollback());
        assert!(!AppError::CommandTimeout.requires_display_mode_rollback());
    }

    #[test]
    fn transport_errors_invalidate_device_cache() {
        assert!(AppError::ShellTransportError("broken pipe".into()).invalidates_device_cache());
        assert!(!AppError::ShellNonZeroExit {
            command: "pm list packages".into(),
            code: 1,
            stderr: String::new(),
        }
        .invalidates_device_cache());
    }

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(
            AppError::UnsupportedCodec(0x61616161).to_string(),
            "unrecognized codec id 0x61616161"
        );
    }
}
