//! Security classification of descriptors.
//!
//! A descriptor is insecure when its transport settings disable certificate
//! verification or encryption. Undecodable `vmess` payloads classify as secure:
//! the verdict is only ever raised on positive evidence.

use serde_json::Value as JsonValue;
use url::{form_urlencoded, Url};

use crate::descriptor::{decode_vmess, scheme_of, Scheme};

const TRUTHY: &[&str] = &["1", "true", "yes", "on"];

/// Query parameters that disable certificate verification when truthy.
const INSECURE_PARAMS: &[&str] = &["allowinsecure", "insecure"];

/// True if any transport-security-disabling setting is present.
///
/// # Examples
/// ```
/// use vpnsieve::security::is_insecure;
/// assert!(is_insecure("vless://u@h:1?allowInsecure=true#n"));
/// assert!(is_insecure("vless://u@h:1?security=none#n"));
/// assert!(!is_insecure("trojan://p@h:1?security=tls&sni=a#n"));
/// ```
pub fn is_insecure(descriptor: &str) -> bool {
    let line = descriptor.trim();

    if query_pairs(line).iter().any(|(key, value)| {
        INSECURE_PARAMS.contains(&key.to_ascii_lowercase().as_str()) && is_truthy_str(value)
    }) {
        return true;
    }

    if line.to_ascii_lowercase().contains("security=none") {
        return true;
    }

    if scheme_of(line) == Some(Scheme::Vmess) {
        if let Some(obj) = decode_vmess(line) {
            return vmess_is_insecure(&obj);
        }
    }

    false
}

fn vmess_is_insecure(obj: &JsonValue) -> bool {
    let skips_verification = ["insecure", "allowInsecure"]
        .iter()
        .any(|key| obj.get(key).is_some_and(is_truthy_json));

    let no_security = ["scy", "security"].iter().any(|key| {
        obj.get(key)
            .and_then(JsonValue::as_str)
            .is_some_and(|v| v.eq_ignore_ascii_case("none"))
    });

    skips_verification || no_security
}

/// Percent-decoded `key=value` pairs of the query component.
///
/// Lines `Url` rejects (out-of-range ports, for one) fall back to the text
/// between the first `?` and the fragment.
fn query_pairs(line: &str) -> Vec<(String, String)> {
    if let Ok(url) = Url::parse(line) {
        return url.query_pairs().into_owned().collect();
    }

    let before_fragment = line.split('#').next().unwrap_or("");
    match before_fragment.split_once('?') {
        Some((_, query)) => form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect(),
        None => Vec::new(),
    }
}

fn is_truthy_str(value: &str) -> bool {
    TRUTHY.contains(&value.trim().to_ascii_lowercase().as_str())
}

fn is_truthy_json(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => is_truthy_str(s),
        _ => false,
    }
}
