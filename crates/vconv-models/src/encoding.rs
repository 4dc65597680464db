//! Output encoding settings.
//!
//! Every job produces H.264 + AAC in a fast-start MP4. Only the scale
//! filter varies by preset, see `vconv_media::filters`.

use serde::{Deserialize, Serialize};

/// Video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// x264 speed preset
pub const DEFAULT_PRESET: &str = "veryfast";
/// Constant Rate Factor
pub const DEFAULT_CRF: u8 = 20;
/// Audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "160k";
/// Relocate the moov atom to the front for progressive playback
pub const FASTSTART_MOVFLAGS: &str = "+faststart";

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Video codec
    pub codec: String,
    /// Encoder speed preset
    pub preset: String,
    /// Constant Rate Factor (quality, 0-51, lower is better)
    pub crf: u8,
    /// Audio codec
    pub audio_codec: String,
    /// Audio bitrate
    pub audio_bitrate: String,
    /// MP4 muxer flags
    pub movflags: String,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            movflags: FASTSTART_MOVFLAGS.to_string(),
        }
    }
}

impl EncodingConfig {
    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-movflags".to_string(),
            self.movflags.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_argument_set() {
        let args = EncodingConfig::default().to_ffmpeg_args();
        assert_eq!(
            args,
            vec![
                "-c:v", "libx264", "-preset", "veryfast", "-crf", "20", "-c:a", "aac", "-b:a",
                "160k", "-movflags", "+faststart",
            ]
        );
    }
}
