//! One [`MediaPump`] per media socket: reads device-framed units, re-wraps
//! them into client envelopes, and writes them to the owning client's
//! sink, dropping non-essential frames under backpressure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::protocol::{Envelope, ServerMessage};
use crate::utils::LogThrottler;
use crate::warn_throttled;
use crate::wire::unit::{self, UnitHeader};

use super::types::ClientSink;

static DROP_THROTTLER: std::sync::OnceLock<LogThrottler> = std::sync::OnceLock::new();

fn drop_throttler() -> &'static LogThrottler {
    DROP_THROTTLER.get_or_init(|| LogThrottler::new(Duration::from_secs(10)))
}

/// Runs the video pump until cancellation or a read error. A read error or
/// EOF is returned to the caller, which transitions the session to
/// `Draining`.
pub async fn run_video_pump<R: AsyncRead + Unpin>(
    mut socket: R,
    sink: Arc<dyn ClientSink>,
    cancel: CancellationToken,
    max_client_buffer_bytes: usize,
    dropped_frames: Arc<AtomicU64>,
    scid: &str,
    initial_dimensions: (u32, u32),
) -> Result<()> {
    let mut last_dimensions: Option<(u32, u32)> = Some(initial_dimensions);

    loop {
        let header = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            header = unit::read_unit_header(&mut socket) => header?,
        };

        let payload = unit::read_unit_payload(&mut socket, header.len).await?;
        handle_video_unit(
            &header,
            payload,
            &sink,
            max_client_buffer_bytes,
            &dropped_frames,
            &mut last_dimensions,
            scid,
        );
    }
}

fn handle_video_unit(
    header: &UnitHeader,
    payload: bytes::Bytes,
    sink: &Arc<dyn ClientSink>,
    max_client_buffer_bytes: usize,
    dropped_frames: &Arc<AtomicU64>,
    last_dimensions: &mut Option<(u32, u32)>,
    scid: &str,
) {
    if payload.is_empty() {
        warn_throttled!(
            drop_throttler(),
            "zero_length_video_unit",
            "dropping zero-length video unit for session {scid}"
        );
        return;
    }

    if header.is_config() {
        if let Some(dimensions) = crate::wire::parse_sps_dimensions(&payload) {
            if *last_dimensions != Some(dimensions) {
                sink.send_json(ServerMessage::ResolutionChange {
                    width: dimensions.0,
                    height: dimensions.1,
                });
                *last_dimensions = Some(dimensions);
            }
        }

        let (profile, compat, level) = unit::extract_sps_profile_compat_level(&payload)
            .filter(|_| unit::is_sps(&payload))
            .unwrap_or((0, 0, 0));
        let envelope = Envelope::H264Config {
            profile,
            compat,
            level,
            payload,
        };
        sink.send_bytes(envelope.encode().into());
        return;
    }

    let envelope = if unit::is_idr(&payload) {
        Envelope::H264KeyFrame {
            ts: header.pts,
            payload,
        }
    } else {
        Envelope::H264DeltaFrame {
            ts: header.pts,
            payload,
        }
    };

    if !envelope.is_key_or_config() && sink.buffered_bytes() > max_client_buffer_bytes {
        dropped_frames.fetch_add(1, Ordering::Relaxed);
        warn_throttled!(
            drop_throttler(),
            "video_frame_drop",
            "dropping non-key video frame for session {scid}: client buffer over {max_client_buffer_bytes} bytes"
        );
        return;
    }

    sink.send_bytes(envelope.encode().into());
}

/// Runs the audio pump until cancellation or a read error.
pub async fn run_audio_pump<R: AsyncRead + Unpin>(
    mut socket: R,
    sink: Arc<dyn ClientSink>,
    cancel: CancellationToken,
    max_client_buffer_bytes: usize,
    dropped_frames: Arc<AtomicU64>,
    scid: &str,
) -> Result<()> {
    loop {
        let header = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            header = unit::read_unit_header(&mut socket) => header?,
        };

        let payload = unit::read_unit_payload(&mut socket, header.len).await?;

        if header.is_config() {
            sink.send_bytes(Envelope::AacConfig { payload }.encode().into());
            continue;
        }

        let envelope = Envelope::AacFrame {
            ts: header.pts,
            payload,
        };

        if sink.buffered_bytes() > max_client_buffer_bytes {
            dropped_frames.fetch_add(1, Ordering::Relaxed);
            warn_throttled!(
                drop_throttler(),
                "audio_frame_drop",
                "dropping audio frame for session {scid}: client buffer over {max_client_buffer_bytes} bytes"
            );
            continue;
        }

        sink.send_bytes(envelope.encode().into());
    }
}

/// Translates a wire read failure into the session-level error the caller
/// uses to decide whether to transition to `Draining`.
pub fn classify_pump_error(error: &AppError) -> bool {
    matches!(error, AppError::SocketWriteError(_) | AppError::SocketReset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::ClientSink;
    use bytes::Bytes;
    use parking_lot::Mutex;

    struct RecordingSink {
        json: Mutex<Vec<ServerMessage>>,
        bytes: Mutex<Vec<Bytes>>,
        buffered: std::sync::atomic::AtomicUsize,
    }

    impl RecordingSink {
        fn new(buffered: usize) -> Self {
            Self {
                json: Mutex::new(Vec::new()),
                bytes: Mutex::new(Vec::new()),
                buffered: std::sync::atomic::AtomicUsize::new(buffered),
            }
        }
    }

    impl ClientSink for RecordingSink {
        fn send_json(&self, message: ServerMessage) {
            self.json.lock().push(message);
        }
        fn send_bytes(&self, bytes: Bytes) {
            self.bytes.lock().push(bytes);
        }
        fn buffered_bytes(&self) -> usize {
            self.buffered.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn drops_delta_frame_over_buffer_threshold() {
        let sink: Arc<dyn ClientSink> = Arc::new(RecordingSink::new(100));
        let dropped = Arc::new(AtomicU64::new(0));
        let mut last_dims = None;
        let header = UnitHeader {
            pts: 1,
            flags: 0,
            len: 3,
        };
        handle_video_unit(
            &header,
            Bytes::from_static(&[0x61, 0, 0]),
            &sink,
            10,
            &dropped,
            &mut last_dims,
            "deadbeef",
        );
        assert_eq!(dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn never_drops_key_frame_regardless_of_buffer() {
        let sink: Arc<dyn ClientSink> = Arc::new(RecordingSink::new(100));
        let dropped = Arc::new(AtomicU64::new(0));
        let mut last_dims = None;
        let header = UnitHeader {
            pts: 1,
            flags: 0,
            len: 3,
        };
        handle_video_unit(
            &header,
            Bytes::from_static(&[0x65, 0, 0]),
            &sink,
            10,
            &dropped,
            &mut last_dims,
            "deadbeef",
        );
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn zero_length_unit_is_dropped_without_envelope() {
        let sink: Arc<dyn ClientSink> = Arc::new(RecordingSink::new(0));
        let dropped = Arc::new(AtomicU64::new(0));
        let mut last_dims = None;
        let header = UnitHeader {
            pts: 1,
            flags: 0,
            len: 0,
        };
        handle_video_unit(
            &header,
            Bytes::new(),
            &sink,
            10,
            &dropped,
            &mut last_dims,
            "deadbeef",
        );
        assert!(sink.bytes.lock().is_empty());
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn unchanged_dimensions_do_not_re_emit_resolution_change() {
        // A baseline-profile SPS NAL (640x480, no cropping). Only its
        // ability to parse successfully matters here, not the exact
        // dimensions it carries.
        let payload = Bytes::from_static(&[0x67, 0x42, 0x00, 0x1E, 0xF8, 0x14, 0x07, 0xA0]);
        let dimensions =
            crate::wire::parse_sps_dimensions(&payload).expect("test payload must be a parseable SPS");
        let header = UnitHeader {
            pts: 0,
            flags: 0,
            len: payload.len() as u32,
        };
        let dropped = Arc::new(AtomicU64::new(0));

        // Unseeded (as if this were the very first config unit with no
        // handshake-negotiated size to compare against): emits once.
        let sink_first: Arc<dyn ClientSink> = Arc::new(RecordingSink::new(0));
        let mut unseeded = None;
        handle_video_unit(
            &header,
            payload.clone(),
            &sink_first,
            10,
            &dropped,
            &mut unseeded,
            "deadbeef",
        );
        assert!(sink_first
            .json
            .lock()
            .iter()
            .any(|m| matches!(m, ServerMessage::ResolutionChange { .. })));

        // Seeded with the dimensions already announced via `VideoInfo`: the
        // first config unit carrying the same size must stay silent.
        let sink_seeded: Arc<dyn ClientSink> = Arc::new(RecordingSink::new(0));
        let mut seeded = Some(dimensions);
        handle_video_unit(&header, payload, &sink_seeded, 10, &dropped, &mut seeded, "deadbeef");
        assert!(sink_seeded
            .json
            .lock()
            .iter()
            .all(|m| !matches!(m, ServerMessage::ResolutionChange { .. })));
    }
}
