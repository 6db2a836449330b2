//! Typed extraction over normalized firmware replies.
//!
//! Patterns are compiled once and shared. Each function returns `None` when
//! the token is absent or does not parse; callers decide what an absent
//! value means for their cached state.

use regex::Regex;
use std::sync::OnceLock;

const FLOAT_PATTERN: &str = r"[-+]?[0-9]*\.?[0-9]+";

/// Marker in an `M27` reply while a file is being printed.
pub const SD_PRINTING_MARKER: &str = "SD printing byte";
/// Marker in an `M27` reply when nothing is printing.
pub const NOT_SD_PRINTING_MARKER: &str = "Not SD printing";

const FIRMWARE_NAME_MARKER: &str = "FIRMWARE_NAME:";
const PROTOCOL_VERSION_MARKER: &str = "PROTOCOL_VERSION:";

fn z_regex() -> &'static Regex {
    static Z_REGEX: OnceLock<Regex> = OnceLock::new();
    Z_REGEX.get_or_init(|| {
        Regex::new(&format!(r"(^|[^A-Za-z])[Zz]:(?P<value>{FLOAT_PATTERN})"))
            .expect("invalid Z pattern")
    })
}

fn progress_regex() -> &'static Regex {
    static PROGRESS_REGEX: OnceLock<Regex> = OnceLock::new();
    PROGRESS_REGEX.get_or_init(|| {
        Regex::new(&format!(
            r"{}\s*(?P<current>[0-9]+)/(?P<total>[0-9]+)",
            regex::escape(SD_PRINTING_MARKER)
        ))
        .expect("invalid progress pattern")
    })
}

/// Z coordinate from a position report such as `X:0.00 Y:0.00 Z:12.50 E:0.00`.
pub fn extract_z(text: &str) -> Option<f64> {
    let captures = z_regex().captures(text)?;
    captures["value"].parse().ok()
}

/// `(current, total)` byte counts from `SD printing byte 1234/5678`.
pub fn extract_progress(text: &str) -> Option<(u64, u64)> {
    let captures = progress_regex().captures(text)?;
    let current = captures["current"].parse().ok()?;
    let total = captures["total"].parse().ok()?;
    Some((current, total))
}

/// Protocol version token from an `M115` identification reply.
///
/// Requires both `FIRMWARE_NAME:` and `PROTOCOL_VERSION:`; the version is the
/// first whitespace-separated word after the latter.
pub fn extract_protocol_version(text: &str) -> Option<String> {
    if !text.contains(FIRMWARE_NAME_MARKER) {
        return None;
    }
    let (_, rest) = text.split_once(PROTOCOL_VERSION_MARKER)?;
    rest.split_whitespace().next().map(str::to_string)
}

/// Count of acknowledgment tokens in an accumulated reply.
pub fn count_acks(text: &str) -> usize {
    text.matches("ok").count()
}

/// Whether a reply carries an acknowledgment, ignoring case.
pub fn is_acknowledged(text: &str) -> bool {
    text.to_lowercase().contains("ok")
}
