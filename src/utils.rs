//! Common utility functions used across modules.
//!
//! This module provides shared formatting and utility functions:
//! - [`format_bytes`] - Format byte sizes (KB, MB, GB)
//! - [`format_count`] - Format counts with K/M suffix (1.5K, 2.3M)
//! - [`format_count_with_separator`] - Format counts with thousands separator (1,234,567)
//! - [`truncate`] - Truncate strings with ellipsis
//! - [`short_error`] - Render an error chain for a single log line

/// Longest error text carried into the run log.
pub const MAX_ERROR_LEN: usize = 200;

/// Format a count with K/M suffix for compact display.
///
/// # Examples
/// ```
/// use vpnsieve::utils::format_count;
/// assert_eq!(format_count(500), "500");
/// assert_eq!(format_count(1500), "1.5K");
/// assert_eq!(format_count(1_500_000), "1.5M");
/// ```
pub fn format_count(count: usize) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

/// Format a number with thousands separators (commas).
///
/// # Examples
/// ```
/// use vpnsieve::utils::format_count_with_separator;
/// assert_eq!(format_count_with_separator(1000), "1,000");
/// assert_eq!(format_count_with_separator(1234567), "1,234,567");
/// ```
pub fn format_count_with_separator(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Format bytes in human-readable form (KB, MB, GB).
///
/// # Examples
/// ```
/// use vpnsieve::utils::format_bytes;
/// assert_eq!(format_bytes(1024), "1.0 KB");
/// assert_eq!(format_bytes(1_500_000), "1.4 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Truncate a string to at most `max_len` characters, ending in "…" if truncated.
///
/// Counts characters rather than bytes, so multi-byte text is never split.
///
/// # Examples
/// ```
/// use vpnsieve::utils::truncate;
/// assert_eq!(truncate("short", 10), "short");
/// assert_eq!(truncate("this is long", 10), "this is l…");
/// ```
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len == 0 {
        String::new()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{}…", head)
    }
}

/// Flatten an error and its causes onto one line, capped at [`MAX_ERROR_LEN`].
pub fn short_error(err: &anyhow::Error) -> String {
    let flat = format!("{:#}", err).replace(['\n', '\r'], " ");
    truncate(&flat, MAX_ERROR_LEN)
}
