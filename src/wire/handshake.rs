use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{AppError, Result};

/// A fixed-width codec identifier as sent on the wire.
pub type CodecId = u32;

pub const CODEC_H264: CodecId = 0x6832_3634;
pub const CODEC_AAC: CodecId = 0x0061_6163;

const DEVICE_NAME_LEN: usize = 64;

/// The device-name record read once per session, on the first socket to
/// finish its handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMeta {
    pub device_name: String,
}

/// Codec id plus dimensions read from the video socket's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoCodecHeader {
    pub codec_id: CodecId,
    pub width: u32,
    pub height: u32,
}

/// Reads the single dummy byte every accepted socket starts with.
pub async fn read_dummy_byte<R: AsyncRead + Unpin>(reader: &mut R) -> Result<()> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => AppError::HandshakeBadDummy,
        _ => AppError::SocketWriteError(e.to_string()),
    })?;
    if byte[0] != 0x00 {
        return Err(AppError::HandshakeBadDummy);
    }
    Ok(())
}

/// Reads the 64-byte null-padded device name record.
pub async fn read_device_meta<R: AsyncRead + Unpin>(reader: &mut R) -> Result<DeviceMeta> {
    let mut buf = [0u8; DEVICE_NAME_LEN];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| AppError::SocketWriteError(e.to_string()))?;

    let end = buf.iter().position(|&b| b == 0).unwrap_or(DEVICE_NAME_LEN);
    let device_name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    Ok(DeviceMeta { device_name })
}

/// Reads the video socket's codec id + dimensions header.
pub async fn read_video_codec_header<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<VideoCodecHeader> {
    let codec_id = read_u32(reader).await?;
    if codec_id != CODEC_H264 {
        return Err(AppError::UnsupportedCodec(codec_id));
    }
    let width = read_u32(reader).await?;
    let height = read_u32(reader).await?;
    Ok(VideoCodecHeader {
        codec_id,
        width,
        height,
    })
}

/// Reads the audio socket's codec id. `Ok(None)` means audio is not
/// available on this session (zero codec id or immediate EOF), which is
/// not an error per the handshake contract.
pub async fn read_audio_codec_header<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<CodecId>> {
    let mut buf = [0u8; 4];
    match reader.read_exact(&mut buf).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(AppError::SocketWriteError(e.to_string())),
    }
    let codec_id = u32::from_be_bytes(buf);
    if codec_id == 0 {
        return Ok(None);
    }
    if codec_id != CODEC_AAC {
        return Err(AppError::UnsupportedCodec(codec_id));
    }
    Ok(Some(codec_id))
}

async fn read_u32<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| AppError::SocketWriteError(e.to_string()))?;
    Ok(u32::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_zero_dummy_byte() {
        let mut cursor = std::io::Cursor::new(vec![0x00]);
        read_dummy_byte(&mut cursor).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_nonzero_dummy_byte() {
        let mut cursor = std::io::Cursor::new(vec![0x01]);
        let err = read_dummy_byte(&mut cursor).await.unwrap_err();
        assert!(matches!(err, AppError::HandshakeBadDummy));
    }

    #[tokio::test]
    async fn trims_null_padded_device_name() {
        let mut record = vec![0u8; DEVICE_NAME_LEN];
        record[..6].copy_from_slice(b"Pixel ");
        let mut cursor = std::io::Cursor::new(record);
        let meta = read_device_meta(&mut cursor).await.unwrap();
        assert_eq!(meta.device_name, "Pixel");
    }

    #[tokio::test]
    async fn recognizes_h264_codec() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&CODEC_H264.to_be_bytes());
        buf.extend_from_slice(&1080u32.to_be_bytes());
        buf.extend_from_slice(&2400u32.to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let header = read_video_codec_header(&mut cursor).await.unwrap();
        assert_eq!(header.width, 1080);
        assert_eq!(header.height, 2400);
    }

    #[tokio::test]
    async fn unsupported_video_codec_fails() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0xdead_beefu32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_video_codec_header(&mut cursor).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedCodec(0xdead_beef)));
    }

    #[tokio::test]
    async fn zero_audio_codec_means_unavailable() {
        let mut cursor = std::io::Cursor::new(0u32.to_be_bytes().to_vec());
        let result = read_audio_codec_header(&mut cursor).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn eof_audio_codec_means_unavailable() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let result = read_audio_codec_header(&mut cursor).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn recognizes_aac_codec() {
        let mut cursor = std::io::Cursor::new(CODEC_AAC.to_be_bytes().to_vec());
        let result = read_audio_codec_header(&mut cursor).await.unwrap();
        assert_eq!(result, Some(CODEC_AAC));
    }
}
