use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{AppError, Result};

pub const FLAG_CONFIG: u8 = 0x80;
pub const FLAG_KEY_FRAME: u8 = 0x40;

const NAL_TYPE_IDR: u8 = 5;
const NAL_TYPE_SPS: u8 = 7;

/// Header preceding every video/audio unit on the wire:
/// `pts:u64 BE, flags:u8, len:u32 BE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHeader {
    pub pts: u64,
    pub flags: u8,
    pub len: u32,
}

impl UnitHeader {
    pub fn is_config(&self) -> bool {
        self.flags & FLAG_CONFIG != 0
    }

    pub fn is_key_frame(&self) -> bool {
        self.flags & FLAG_KEY_FRAME != 0
    }
}

/// Reads one unit header from the video or audio socket.
pub async fn read_unit_header<R: AsyncRead + Unpin>(reader: &mut R) -> Result<UnitHeader> {
    let mut buf = [0u8; 13];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| AppError::SocketWriteError(e.to_string()))?;

    let pts = u64::from_be_bytes(buf[0..8].try_into().unwrap());
    let flags = buf[8];
    let len = u32::from_be_bytes(buf[9..13].try_into().unwrap());
    Ok(UnitHeader { pts, flags, len })
}

/// Reads `len` bytes of unit payload following a header.
pub async fn read_unit_payload<R: AsyncRead + Unpin>(reader: &mut R, len: u32) -> Result<Bytes> {
    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| AppError::SocketWriteError(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Index of the first NAL unit's header byte within `payload`. Skips an
/// Annex-B start code (`00 00 00 01` or `00 00 01`) if present; otherwise
/// treats the payload as already starting on the NAL header byte.
fn first_nal_start(payload: &[u8]) -> Option<usize> {
    if payload.len() >= 4 && payload[0..3] == [0, 0, 0] && payload[3] == 1 {
        return Some(4);
    }
    if payload.len() >= 3 && payload[0..2] == [0, 0] && payload[2] == 1 {
        return Some(3);
    }
    if !payload.is_empty() {
        return Some(0);
    }
    None
}

/// The `nal_unit_type` (low 5 bits of the NAL header byte) of the first
/// NAL unit in `payload`.
pub fn first_nal_type(payload: &[u8]) -> Option<u8> {
    let start = first_nal_start(payload)?;
    payload.get(start).map(|byte| byte & 0x1F)
}

pub fn is_idr(payload: &[u8]) -> bool {
    first_nal_type(payload) == Some(NAL_TYPE_IDR)
}

pub fn is_sps(payload: &[u8]) -> bool {
    first_nal_type(payload) == Some(NAL_TYPE_SPS)
}

/// Extracts the profile/compat/level bytes (bytes 1, 2, 3 after the NAL
/// header) from an SPS NAL unit.
pub fn extract_sps_profile_compat_level(payload: &[u8]) -> Option<(u8, u8, u8)> {
    let start = first_nal_start(payload)?;
    if payload.len() < start + 4 {
        return None;
    }
    Some((payload[start + 1], payload[start + 2], payload[start + 3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decodes_unit_header() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&123_456u64.to_be_bytes());
        buf.push(FLAG_KEY_FRAME);
        buf.extend_from_slice(&9u32.to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let header = read_unit_header(&mut cursor).await.unwrap();
        assert_eq!(header.pts, 123_456);
        assert!(header.is_key_frame());
        assert!(!header.is_config());
        assert_eq!(header.len, 9);
    }

    #[test]
    fn detects_idr_without_start_code() {
        let payload = [0x65, 0xaa, 0xbb];
        assert!(is_idr(&payload));
        assert!(!is_sps(&payload));
    }

    #[test]
    fn detects_sps_with_annex_b_start_code() {
        let payload = [0x00, 0x00, 0x00, 0x01, 0x67, 0x64, 0x00, 0x1f, 0xff];
        assert!(is_sps(&payload));
        let (profile, compat, level) = extract_sps_profile_compat_level(&payload).unwrap();
        assert_eq!((profile, compat, level), (0x64, 0x00, 0x1f));
    }

    #[test]
    fn empty_payload_has_no_nal_type() {
        assert_eq!(first_nal_type(&[]), None);
    }
}
