//! Pointer blobs: small `.url` files that stand in for media bytes.
//!
//! Format (UTF-8, one field per line, trailing newline):
//!
//! ```text
//! URL:<absolute url>
//! KIND:<mp4|m3u8|mpd>
//! SRC:<originating page url>
//! ```
//!
//! Only the first line is significant to the transcoder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Blobs at or above this size are never treated as pointers.
pub const MAX_POINTER_BYTES: u64 = 4096;

/// File extension used for pointer blobs.
pub const POINTER_EXTENSION: &str = ".url";

const URL_MARKER: &str = "URL:";
const KIND_MARKER: &str = "KIND:";
const SRC_MARKER: &str = "SRC:";

/// Kind of remote media a pointer references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Mp4,
    M3u8,
    Mpd,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Mp4 => "mp4",
            MediaKind::M3u8 => "m3u8",
            MediaKind::Mpd => "mpd",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = PointerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(MediaKind::Mp4),
            "m3u8" => Ok(MediaKind::M3u8),
            "mpd" => Ok(MediaKind::Mpd),
            other => Err(PointerError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("pointer URL must be absolute http(s): {0}")]
    InvalidUrl(String),

    #[error("unknown media kind: {0}")]
    UnknownKind(String),
}

/// Parsed pointer blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerFile {
    /// Remote media URL handed to FFmpeg as its input
    pub url: String,
    /// Media kind, when known
    pub kind: Option<MediaKind>,
    /// Page the URL was resolved from
    pub source: Option<String>,
}

impl PointerFile {
    /// Build a pointer for an absolute http(s) media URL.
    pub fn new(
        url: &str,
        kind: MediaKind,
        source: Option<&str>,
    ) -> Result<Self, PointerError> {
        let parsed = Url::parse(url.trim()).map_err(|_| PointerError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PointerError::InvalidUrl(url.to_string()));
        }

        Ok(Self {
            url: parsed.to_string(),
            kind: Some(kind),
            source: source.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        })
    }

    /// Render in the persisted line format.
    pub fn render(&self) -> String {
        let mut out = format!("{}{}\n", URL_MARKER, self.url);
        if let Some(kind) = self.kind {
            out.push_str(&format!("{}{}\n", KIND_MARKER, kind));
        }
        if let Some(ref src) = self.source {
            out.push_str(&format!("{}{}\n", SRC_MARKER, src));
        }
        out
    }

    /// Parse a blob as a pointer.
    ///
    /// Returns `None` unless the blob is smaller than [`MAX_POINTER_BYTES`]
    /// and its first line starts with `URL:` followed by a non-empty value.
    /// Invalid UTF-8 is replaced rather than rejected, so binary media never
    /// matches by accident but a slightly malformed pointer still does.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() as u64 >= MAX_POINTER_BYTES {
            return None;
        }

        let text = String::from_utf8_lossy(bytes);
        let mut lines = text.lines();

        let url = lines.next()?.trim().strip_prefix(URL_MARKER)?.trim();
        if url.is_empty() {
            return None;
        }

        let mut kind = None;
        let mut source = None;
        for line in lines {
            let line = line.trim();
            if let Some(k) = line.strip_prefix(KIND_MARKER) {
                kind = k.parse().ok();
            } else if let Some(s) = line.strip_prefix(SRC_MARKER) {
                source = Some(s.trim().to_string()).filter(|s| !s.is_empty());
            }
        }

        Some(Self {
            url: url.to_string(),
            kind,
            source,
        })
    }
}

/// Outcome of a best-effort media URL resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMedia {
    pub ok: bool,
    pub kind: Option<MediaKind>,
    pub media_url: Option<String>,
    pub reason: String,
}

impl ResolvedMedia {
    pub fn found(kind: MediaKind, media_url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            ok: true,
            kind: Some(kind),
            media_url: Some(media_url.into()),
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            kind: None,
            media_url: None,
            reason: reason.into(),
        }
    }
}
