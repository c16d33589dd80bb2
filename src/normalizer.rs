//! Splitting raw source bodies into descriptor lines.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::descriptor::{decode_base64_lenient, is_descriptor, Scheme};
use crate::error::SieveError;

/// Any known `scheme://` prefix. Longer names are listed first so that
/// `ssr://` and `hysteria2://` are never cut short.
static SCHEME_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    let mut names: Vec<&str> = Scheme::ALL.iter().map(|s| s.as_str()).collect();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    Regex::new(&format!(r"(?i)(?:{})://", names.join("|"))).expect("scheme pattern is valid")
});

/// Split raw text into descriptor lines, preserving order.
///
/// Descriptors glued together without a separator are pulled apart first;
/// blank lines, `#` comments and anything that is not a descriptor are dropped.
///
/// # Examples
/// ```
/// use vpnsieve::normalizer::normalize;
/// let lines = normalize("# header\nvless://a@h:1trojan://b@h:2\n\ngarbage\n");
/// assert_eq!(lines, vec!["vless://a@h:1", "trojan://b@h:2"]);
/// ```
pub fn normalize(raw: &str) -> Vec<String> {
    let separated = SCHEME_PREFIX_RE.replace_all(raw, "\n$0");

    separated
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| is_descriptor(line))
        .map(str::to_string)
        .collect()
}

/// Decode a source whose entire body is base64 of a plain-text list.
pub fn decode_base64_body(body: &str) -> Result<String, SieveError> {
    let bytes = decode_base64_lenient(body)
        .ok_or_else(|| SieveError::Decode("Body is not valid base64".to_string()))?;
    String::from_utf8(bytes)
        .map_err(|e| SieveError::Decode(format!("Decoded body is not UTF-8: {}", e)))
}
