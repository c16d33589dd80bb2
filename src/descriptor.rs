//! Proxy descriptors: scheme recognition, validation and endpoint identity.
//!
//! A descriptor is an opaque `scheme://payload` string. This module only looks
//! inside the payload far enough to recover a `(host, port)` pair, which the
//! deduplicator and the destination filter use as a coarse identity.

use base64::engine::general_purpose;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Host/port after `@` or `//`, as found in every URL-shaped scheme.
static ENDPOINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:@|//)([\w\.-]+):(\d{1,5})").expect("endpoint pattern is valid")
});

/// Protocol tag prefixing a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    Vmess,
    Vless,
    Trojan,
    Ss,
    Ssr,
    Tuic,
    Hysteria,
    Hysteria2,
    Hy2,
}

impl Scheme {
    pub const ALL: [Scheme; 9] = [
        Scheme::Vmess,
        Scheme::Vless,
        Scheme::Trojan,
        Scheme::Ss,
        Scheme::Ssr,
        Scheme::Tuic,
        Scheme::Hysteria,
        Scheme::Hysteria2,
        Scheme::Hy2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Vmess => "vmess",
            Scheme::Vless => "vless",
            Scheme::Trojan => "trojan",
            Scheme::Ss => "ss",
            Scheme::Ssr => "ssr",
            Scheme::Tuic => "tuic",
            Scheme::Hysteria => "hysteria",
            Scheme::Hysteria2 => "hysteria2",
            Scheme::Hy2 => "hy2",
        }
    }

    /// `scheme://` prefix as it appears in descriptors.
    pub fn prefix(&self) -> String {
        format!("{}://", self.as_str())
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    /// Case-insensitive lookup of a bare scheme name (no `://`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scheme::ALL
            .iter()
            .copied()
            .find(|scheme| scheme.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown scheme: {}", s))
    }
}

/// Determine the scheme of a descriptor line, if it has a known one.
pub fn scheme_of(line: &str) -> Option<Scheme> {
    let trimmed = line.trim();
    let (tag, _) = trimmed.split_once("://")?;
    tag.parse().ok()
}

/// True iff the trimmed line starts with `scheme://` for a known scheme.
///
/// # Examples
/// ```
/// use vpnsieve::descriptor::is_descriptor;
/// assert!(is_descriptor("vless://abc@h:1?x=1#n"));
/// assert!(is_descriptor("  TROJAN://p@h:443"));
/// assert!(!is_descriptor("not-a-proxy-line"));
/// assert!(!is_descriptor(""));
/// ```
pub fn is_descriptor(line: &str) -> bool {
    scheme_of(line).is_some()
}

/// Coarse `(host, port)` identity of a descriptor. Host is case-folded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    pub host: String,
    pub port: String,
}

impl EndpointKey {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into().to_lowercase(),
            port: port.into(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Recover the connection endpoint of a descriptor.
///
/// `vmess` payloads are base64 JSON and are decoded; every other scheme is
/// searched for `@host:port` or `//host:port`. Malformed payloads yield `None`.
pub fn extract_endpoint(descriptor: &str) -> Option<EndpointKey> {
    let line = descriptor.trim();
    if line.is_empty() {
        return None;
    }

    if scheme_of(line) == Some(Scheme::Vmess) {
        let obj = decode_vmess(line)?;
        let host = ["add", "host", "ip"]
            .iter()
            .find_map(|key| json_scalar(&obj, key))?;
        let port = json_scalar(&obj, "port")?;
        return Some(EndpointKey::new(host, port));
    }

    let caps = ENDPOINT_RE.captures(line)?;
    Some(EndpointKey::new(&caps[1], &caps[2]))
}

/// Decode the JSON object carried by a `vmess://` descriptor.
pub fn decode_vmess(descriptor: &str) -> Option<JsonValue> {
    let line = descriptor.trim();
    let payload = line.get(Scheme::Vmess.prefix().len()..)?;
    let bytes = decode_base64_lenient(payload)?;
    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim_start();
    if !text.starts_with('{') {
        return None;
    }
    serde_json::from_str(text).ok()
}

/// Base64-decode text that may be unpadded, wrapped, or URL-safe.
pub fn decode_base64_lenient(input: &str) -> Option<Vec<u8>> {
    let mut cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    let rem = cleaned.len() % 4;
    if rem != 0 {
        cleaned.push_str(&"=".repeat(4 - rem));
    }

    [&general_purpose::STANDARD, &general_purpose::URL_SAFE]
        .iter()
        .find_map(|engine| engine.decode(&cleaned).ok())
}

/// Non-empty string or non-zero number field rendered as a string.
pub(crate) fn json_scalar(obj: &JsonValue, key: &str) -> Option<String> {
    match obj.get(key)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}
