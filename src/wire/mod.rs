//! Encoding/decoding for the on-device streaming server's wire protocol:
//! the socket handshake, device metadata record, codec negotiation, and
//! video/audio unit framing.
//!
//! Every integer field on this wire is fixed-width and big-endian; decoding
//! uses direct `from_be_bytes`/`to_be_bytes` conversions rather than a
//! byte-order crate, the same stdlib idiom the teacher's own binary
//! protocol (`hid/datachannel.rs`) uses.

pub mod control;
pub mod handshake;
pub mod sps;
pub mod unit;

pub use control::ControlMessageKind;
pub use handshake::{CodecId, DeviceMeta, VideoCodecHeader, CODEC_AAC, CODEC_H264};
pub use sps::parse_sps_dimensions;
pub use unit::UnitHeader;
