//! Contrast Engine: WCAG 1.4.3 contrast ratio between two computed colors.
//!
//! Browsers report computed colors as `rgb(r, g, b)` or `rgba(r, g, b, a)`.
//! Parsing never fails: anything that does not yield three channels is
//! treated as black, so a malformed style value degrades the measurement
//! instead of aborting the evaluator.
//!
//! ## Thresholds
//!
//! | Level | Normal text | Large text |
//! |-------|-------------|------------|
//! | AA    | 4.5:1       | 3:1        |
//!
//! `compliant` always uses the normal-text threshold. The large-text result
//! is reported alongside it for information only.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// AA minimum for normal-size text.
pub const AA_NORMAL_TEXT: f64 = 4.5;

/// AA minimum for large text (18pt, or 14pt bold).
pub const AA_LARGE_TEXT: f64 = 3.0;

lazy_static! {
    static ref CHANNEL_PATTERN: Regex = Regex::new(r"\d+(?:\.\d+)?|\.\d+").unwrap();
}

/// An sRGB color with 8-bit channels.
pub type Rgb = [u8; 3];

/// Outcome of comparing a foreground/background pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContrastResult {
    /// Contrast ratio, always >= 1.0
    pub ratio: f64,

    /// `ratio >= 4.5`
    pub compliant: bool,

    /// `ratio >= 3.0`, informational
    pub large_text_compliant: bool,
}

/// Extract the RGB channels from a computed color string.
///
/// Numeric runs are collected in order. Four runs means `rgba(...)`, and the
/// last one (alpha, possibly fractional) is dropped. Any other count, or a
/// color channel that is not an integer in `0..=255`, yields black.
pub fn parse_color(value: &str) -> Rgb {
    let runs: Vec<&str> = CHANNEL_PATTERN
        .find_iter(value)
        .map(|m| m.as_str())
        .collect();

    let rgb = match runs.as_slice() {
        [r, g, b] | [r, g, b, _] => [r, g, b],
        _ => return [0, 0, 0],
    };

    match (rgb[0].parse(), rgb[1].parse(), rgb[2].parse()) {
        (Ok(r), Ok(g), Ok(b)) => [r, g, b],
        _ => [0, 0, 0],
    }
}

/// Relative luminance per WCAG 2.x, using the 0.03928 sRGB knee.
pub fn relative_luminance(rgb: Rgb) -> f64 {
    let [r, g, b] = rgb.map(|c| {
        let v = c as f64 / 255.0;
        if v <= 0.03928 {
            v / 12.92
        } else {
            ((v + 0.055) / 1.055).powf(2.4)
        }
    });
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

/// Contrast ratio between two colors. Symmetric in its arguments.
pub fn contrast_ratio(fg: Rgb, bg: Rgb) -> f64 {
    let l1 = relative_luminance(fg) + 0.05;
    let l2 = relative_luminance(bg) + 0.05;
    l1.max(l2) / l1.min(l2)
}

/// Parse both color strings and evaluate them against the AA thresholds.
pub fn evaluate(foreground: &str, background: &str) -> ContrastResult {
    let ratio = contrast_ratio(parse_color(foreground), parse_color(background));
    ContrastResult {
        ratio,
        compliant: ratio >= AA_NORMAL_TEXT,
        large_text_compliant: ratio >= AA_LARGE_TEXT,
    }
}
