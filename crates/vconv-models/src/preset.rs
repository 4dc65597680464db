//! Output quality presets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Named output resolution target, fixed at job creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Preset {
    /// Keep source resolution
    #[serde(rename = "original")]
    Original,
    /// Downscale to at most 1920 px wide
    #[serde(rename = "1080p")]
    P1080,
    /// Downscale to at most 1280 px wide
    #[serde(rename = "720p")]
    #[default]
    P720,
    /// Downscale to at most 854 px wide
    #[serde(rename = "480p")]
    P480,
}

impl Preset {
    pub const ALL: [Preset; 4] = [Preset::Original, Preset::P1080, Preset::P720, Preset::P480];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Original => "original",
            Preset::P1080 => "1080p",
            Preset::P720 => "720p",
            Preset::P480 => "480p",
        }
    }

    /// Maximum output width in pixels, `None` for [`Preset::Original`].
    pub fn max_width(&self) -> Option<u32> {
        match self {
            Preset::Original => None,
            Preset::P1080 => Some(1920),
            Preset::P720 => Some(1280),
            Preset::P480 => Some(854),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid preset: {0:?} (expected original, 1080p, 720p or 480p)")]
pub struct InvalidPreset(pub String);

impl FromStr for Preset {
    type Err = InvalidPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| InvalidPreset(s.to_string()))
    }
}
