//! Bounding of tool results before they enter history.

pub const TRUNCATION_MARKER: &str = "\n[... output truncated ...]\n";

/// Truncate `text` to at most `threshold` characters.
///
/// Text at or below the threshold is returned verbatim. Longer text keeps a
/// head and a tail window of `(threshold - marker_len) / 2` characters each,
/// joined by [`TRUNCATION_MARKER`]. Thresholds too small to hold the marker
/// fall back to a plain head cut.
pub fn truncate_result(text: &str, threshold: usize) -> String {
    let total = text.chars().count();
    if total <= threshold {
        return text.to_string();
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    if threshold <= marker_len {
        return text.chars().take(threshold).collect();
    }

    let window = (threshold - marker_len) / 2;
    let head: String = text.chars().take(window).collect();
    let tail: String = text.chars().skip(total - window).collect();
    format!("{head}{TRUNCATION_MARKER}{tail}")
}
