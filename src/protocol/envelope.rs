//! Binary packet envelopes sent to the client (§3's tag table).
//!
//! Tag-byte dispatch with direct `to_be_bytes`/`from_be_bytes` conversions,
//! the same idiom the teacher uses for its own binary protocol rather than
//! pulling in a byte-order crate.

use bytes::Bytes;
use std::sync::OnceLock;
use std::time::Duration;

use crate::utils::LogThrottler;

pub const TAG_LEGACY_H264: u8 = 0x00;
pub const TAG_LEGACY_AAC: u8 = 0x01;
pub const TAG_H264_CONFIG: u8 = 0x10;
pub const TAG_H264_KEYFRAME: u8 = 0x11;
pub const TAG_H264_DELTA: u8 = 0x12;
pub const TAG_AAC_CONFIG: u8 = 0x20;
pub const TAG_AAC_FRAME: u8 = 0x21;

/// A single binary envelope, bit-exact per the §3 table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Legacy H.264 access unit (no header). Flagged if selected on a
    /// device whose cached Android major version is >= 11, per SPEC_FULL
    /// §9 Open Question 7.
    LegacyH264 { payload: Bytes },
    /// Legacy AAC ADTS frame (no header).
    LegacyAac { payload: Bytes },
    H264Config {
        profile: u8,
        compat: u8,
        level: u8,
        payload: Bytes,
    },
    H264KeyFrame { ts: u64, payload: Bytes },
    H264DeltaFrame { ts: u64, payload: Bytes },
    AacConfig { payload: Bytes },
    AacFrame { ts: u64, payload: Bytes },
}

impl Envelope {
    pub fn tag(&self) -> u8 {
        match self {
            Envelope::LegacyH264 { .. } => TAG_LEGACY_H264,
            Envelope::LegacyAac { .. } => TAG_LEGACY_AAC,
            Envelope::H264Config { .. } => TAG_H264_CONFIG,
            Envelope::H264KeyFrame { .. } => TAG_H264_KEYFRAME,
            Envelope::H264DeltaFrame { .. } => TAG_H264_DELTA,
            Envelope::AacConfig { .. } => TAG_AAC_CONFIG,
            Envelope::AacFrame { .. } => TAG_AAC_FRAME,
        }
    }

    pub fn timestamp(&self) -> Option<u64> {
        match self {
            Envelope::H264KeyFrame { ts, .. }
            | Envelope::H264DeltaFrame { ts, .. }
            | Envelope::AacFrame { ts, .. } => Some(*ts),
            _ => None,
        }
    }

    pub fn is_key_or_config(&self) -> bool {
        matches!(
            self,
            Envelope::H264Config { .. }
                | Envelope::H264KeyFrame { .. }
                | Envelope::AacConfig { .. }
                | Envelope::LegacyH264 { .. }
        )
    }

    /// Encode the envelope to its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Envelope::LegacyH264 { payload } | Envelope::LegacyAac { payload } => {
                let mut buf = Vec::with_capacity(1 + payload.len());
                buf.push(self.tag());
                buf.extend_from_slice(payload);
                buf
            }
            Envelope::H264Config {
                profile,
                compat,
                level,
                payload,
            } => {
                let mut buf = Vec::with_capacity(4 + payload.len());
                buf.push(TAG_H264_CONFIG);
                buf.push(*profile);
                buf.push(*compat);
                buf.push(*level);
                buf.extend_from_slice(payload);
                buf
            }
            Envelope::H264KeyFrame { ts, payload } => encode_timestamped(TAG_H264_KEYFRAME, *ts, payload),
            Envelope::H264DeltaFrame { ts, payload } => {
                encode_timestamped(TAG_H264_DELTA, *ts, payload)
            }
            Envelope::AacConfig { payload } => {
                let mut buf = Vec::with_capacity(1 + payload.len());
                buf.push(TAG_AAC_CONFIG);
                buf.extend_from_slice(payload);
                buf
            }
            Envelope::AacFrame { ts, payload } => encode_timestamped(TAG_AAC_FRAME, *ts, payload),
        }
    }

    /// Decode a wire representation back into an [`Envelope`]. Used by
    /// tests to verify encode/decode round-trips the payload and
    /// timestamp identically.
    pub fn decode(bytes: &[u8]) -> Option<Envelope> {
        let (&tag, rest) = bytes.split_first()?;
        match tag {
            TAG_LEGACY_H264 => Some(Envelope::LegacyH264 {
                payload: Bytes::copy_from_slice(rest),
            }),
            TAG_LEGACY_AAC => Some(Envelope::LegacyAac {
                payload: Bytes::copy_from_slice(rest),
            }),
            TAG_H264_CONFIG => {
                if rest.len() < 3 {
                    return None;
                }
                Some(Envelope::H264Config {
                    profile: rest[0],
                    compat: rest[1],
                    level: rest[2],
                    payload: Bytes::copy_from_slice(&rest[3..]),
                })
            }
            TAG_H264_KEYFRAME => decode_timestamped(rest).map(|(ts, payload)| Envelope::H264KeyFrame {
                ts,
                payload,
            }),
            TAG_H264_DELTA => decode_timestamped(rest).map(|(ts, payload)| Envelope::H264DeltaFrame {
                ts,
                payload,
            }),
            TAG_AAC_CONFIG => Some(Envelope::AacConfig {
                payload: Bytes::copy_from_slice(rest),
            }),
            TAG_AAC_FRAME => {
                decode_timestamped(rest).map(|(ts, payload)| Envelope::AacFrame { ts, payload })
            }
            _ => None,
        }
    }

    /// Log (throttled) if a legacy tag is emitted for a device whose
    /// cached Android major version is >= 11. Kept per SPEC_FULL §9 Open
    /// Question 7: encode/decode of the legacy tags is retained, but their
    /// use on modern Android is flagged rather than silently accepted.
    pub fn warn_if_legacy_on_modern_android(&self, android_major: Option<u32>) {
        if matches!(self, Envelope::LegacyH264 { .. } | Envelope::LegacyAac { .. }) {
            if let Some(major) = android_major {
                if major >= 11 {
                    crate::warn_throttled!(
                        legacy_tag_throttler(),
                        "legacy_envelope_tag",
                        "legacy envelope tag 0x{:02x} emitted for Android {}, which is expected to use the current server path",
                        self.tag(),
                        major
                    );
                }
            }
        }
    }
}

fn encode_timestamped(tag: u8, ts: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9 + payload.len());
    buf.push(tag);
    buf.extend_from_slice(&ts.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn decode_timestamped(rest: &[u8]) -> Option<(u64, Bytes)> {
    if rest.len() < 8 {
        return None;
    }
    let ts = u64::from_be_bytes(rest[0..8].try_into().ok()?);
    Some((ts, Bytes::copy_from_slice(&rest[8..])))
}

fn legacy_tag_throttler() -> &'static LogThrottler {
    static THROTTLER: OnceLock<LogThrottler> = OnceLock::new();
    THROTTLER.get_or_init(|| LogThrottler::new(Duration::from_secs(30)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_key_frame() {
        let envelope = Envelope::H264KeyFrame {
            ts: 123_456,
            payload: Bytes::from_static(b"nal-bytes"),
        };
        let encoded = envelope.encode();
        let decoded = Envelope::decode(&encoded).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.timestamp(), Some(123_456));
    }

    #[test]
    fn round_trips_config() {
        let envelope = Envelope::H264Config {
            profile: 0x64,
            compat: 0x00,
            level: 0x1f,
            payload: Bytes::from_static(b"sps-pps"),
        };
        let encoded = envelope.encode();
        assert_eq!(encoded[0], TAG_H264_CONFIG);
        let decoded = Envelope::decode(&encoded).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn key_and_config_are_never_dropped() {
        assert!(Envelope::H264Config {
            profile: 0,
            compat: 0,
            level: 0,
            payload: Bytes::new(),
        }
        .is_key_or_config());
        assert!(Envelope::H264KeyFrame {
            ts: 0,
            payload: Bytes::new()
        }
        .is_key_or_config());
        assert!(!Envelope::H264DeltaFrame {
            ts: 0,
            payload: Bytes::new()
        }
        .is_key_or_config());
    }
}
