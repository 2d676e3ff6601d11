//! `volume`/`getVolume`: percentage-to-device-index conversion and the
//! Android-major-dependent shell command for setting the music stream.

use crate::adb::DeviceBus;
use crate::error::Result;

const MUSIC_STREAM: &str = "3";
/// Used when `dumpsys audio`'s `STREAM_MUSIC` section can't be parsed.
const DEFAULT_MAX_VOLUME: u32 = 15;

/// Pulls the `STREAM_MUSIC` max index out of `dumpsys audio` output, e.g.
/// a `- STREAM_MUSIC:` block containing a line `   Max: 15`.
pub fn parse_max_media_volume(dumpsys_audio: &str) -> Option<u32> {
    let stream_start = dumpsys_audio.find("STREAM_MUSIC")?;
    let block = &dumpsys_audio[stream_start..];
    let block_end = block[1..].find("- STREAM_").map(|i| i + 1).unwrap_or(block.len());
    let block = &block[..block_end];

    for line in block.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Max: ") {
            return rest.trim().parse().ok();
        }
    }
    None
}

pub async fn get_max_media_volume(device_bus: &DeviceBus, device_id: &str) -> u32 {
    device_bus
        .shell(device_id, &["dumpsys", "audio"])
        .await
        .ok()
        .and_then(|output| parse_max_media_volume(&output))
        .unwrap_or(DEFAULT_MAX_VOLUME)
}

/// Converts a 0..100 client-facing percentage to a device stream index.
pub fn percent_to_index(percent: u8, max_index: u32) -> u32 {
    ((percent.min(100) as u32) * max_index + 50) / 100
}

/// Converts a device stream index back to a 0..100 percentage.
pub fn index_to_percent(index: u32, max_index: u32) -> u8 {
    if max_index == 0 {
        return 0;
    }
    (((index * 100) + max_index / 2) / max_index).min(100) as u8
}

/// Sets the music stream to `percent`, using the command set appropriate
/// for the device's Android major version (`cmd media_session` replaced
/// the legacy `media volume` binary starting with Android 11).
pub async fn set_volume(
    device_bus: &DeviceBus,
    device_id: &str,
    percent: u8,
    android_major: Option<u32>,
) -> Result<()> {
    let max_index = get_max_media_volume(device_bus, device_id).await;
    let index = percent_to_index(percent, max_index).to_string();

    if android_major.map(|v| v >= 11).unwrap_or(true) {
        device_bus
            .shell(
                device_id,
                &["cmd", "media_session", "volume", "--stream", MUSIC_STREAM, "--set", &index],
            )
            .await?;
    } else {
        device_bus
            .shell(
                device_id,
                &["media", "volume", "--stream", MUSIC_STREAM, "--set", &index],
            )
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stream_music_max() {
        let output = "- STREAM_MUSIC:\n   Muted: false\n   Max: 15\n   Current: 8\n- STREAM_RING:\n   Max: 7\n";
        assert_eq!(parse_max_media_volume(output), Some(15));
    }

    #[test]
    fn missing_section_yields_none() {
        assert_eq!(parse_max_media_volume("nothing relevant here"), None);
    }

    #[test]
    fn percent_round_trips_through_index() {
        assert_eq!(percent_to_index(50, 15), 8);
        assert_eq!(index_to_percent(8, 15), 53);
        assert_eq!(percent_to_index(0, 15), 0);
        assert_eq!(percent_to_index(100, 15), 15);
    }
}
