//! Scale filter policy for output presets.
//!
//! Presets only ever downscale. The filter caps the width at the preset's
//! maximum and lets FFmpeg derive an even height that keeps the aspect ratio.

use vconv_models::Preset;

/// Build the `-vf` scale expression for a preset, `None` for `original`.
pub fn scale_filter(preset: Preset) -> Option<String> {
    preset
        .max_width()
        .map(|max_width| format!("scale='min({},iw)':-2", max_width))
}

/// Output dimensions FFmpeg produces for a source of `width` x `height`.
///
/// Mirrors the scale expression from [`scale_filter`]: width is
/// `min(max_width, width)` and height is the proportional value rounded to
/// the nearest multiple of two.
pub fn target_dimensions(preset: Preset, width: u32, height: u32) -> (u32, u32) {
    let Some(max_width) = preset.max_width() else {
        return (width, height);
    };
    if width == 0 || height == 0 {
        return (width, height);
    }

    let out_width = width.min(max_width);
    (out_width, even_height(out_width, width, height))
}

/// `round(out_width * height / (width * 2)) * 2`, rounding halves up.
fn even_height(out_width: u32, width: u32, height: u32) -> u32 {
    let numerator = u64::from(out_width) * u64::from(height);
    let denominator = u64::from(width) * 2;
    let halves = (numerator + denominator / 2) / denominator;
    (halves * 2) as u32
}
