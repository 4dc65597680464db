//! Best-effort media URL extraction from HTML.
//!
//! Conservative on purpose: only URLs literally present in the markup are
//! returned. No JavaScript, no site-specific scraping, no network access.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use vconv_models::{MediaKind, ResolvedMedia};

static ABSOLUTE_MP4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s'"<>]+?\.mp4(?:\?[^\s'"<>]*)?"#).expect("static regex")
});

static ABSOLUTE_M3U8: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s'"<>]+?\.m3u8(?:\?[^\s'"<>]*)?"#).expect("static regex")
});

static RELATIVE_MP4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)src\s*=\s*['"]([^'"]+\.mp4[^'"]*)['"]"#).expect("static regex")
});

static RELATIVE_M3U8: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)src\s*=\s*['"]([^'"]+\.m3u8[^'"]*)['"]"#).expect("static regex")
});

pub const REASON_FOUND_MP4: &str = "found_mp4_in_html";
pub const REASON_FOUND_M3U8: &str = "found_m3u8_in_html";
pub const REASON_FOUND_REL_MP4: &str = "found_rel_mp4";
pub const REASON_FOUND_REL_M3U8: &str = "found_rel_m3u8";
pub const REASON_NOT_FOUND: &str = "no_media_url_found_in_html";

/// Find a direct media URL in `html`.
///
/// Order: absolute `.mp4`, absolute `.m3u8`, then relative `src="..."`
/// references joined against `base_url`. Never fails; a miss is reported
/// through [`ResolvedMedia::reason`].
pub fn extract_media_url(html: &str, base_url: &str) -> ResolvedMedia {
    if let Some(m) = ABSOLUTE_MP4.find(html) {
        return ResolvedMedia::found(MediaKind::Mp4, m.as_str(), REASON_FOUND_MP4);
    }

    if let Some(m) = ABSOLUTE_M3U8.find(html) {
        return ResolvedMedia::found(MediaKind::M3u8, m.as_str(), REASON_FOUND_M3U8);
    }

    let relative = [
        (&*RELATIVE_MP4, MediaKind::Mp4, REASON_FOUND_REL_MP4),
        (&*RELATIVE_M3U8, MediaKind::M3u8, REASON_FOUND_REL_M3U8),
    ];
    for (pattern, kind, reason) in relative {
        let Some(src) = pattern.captures(html).and_then(|c| c.get(1)) else {
            continue;
        };
        match join_url(base_url, src.as_str()) {
            Some(url) => return ResolvedMedia::found(kind, url, reason),
            None => debug!(base_url, src = src.as_str(), "Could not resolve relative media URL"),
        }
    }

    ResolvedMedia::not_found(REASON_NOT_FOUND)
}

fn join_url(base_url: &str, reference: &str) -> Option<String> {
    match Url::parse(base_url) {
        Ok(base) => base.join(reference).ok().map(String::from),
        // No usable base: only an already-absolute reference survives
        Err(_) => Url::parse(reference).ok().map(String::from),
    }
}
