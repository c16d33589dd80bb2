//! Inspect command implementation.

use anyhow::Result;

use crate::descriptor::{extract_endpoint, scheme_of};
use crate::security::is_insecure;

/// One descriptor's classification, line by line
pub fn describe(descriptor: &str) -> String {
    let descriptor = descriptor.trim();
    let Some(scheme) = scheme_of(descriptor) else {
        return "Valid:    no (unknown scheme)\n".to_string();
    };

    let endpoint = extract_endpoint(descriptor)
        .map(|key| key.to_string())
        .unwrap_or_else(|| "-".to_string());
    let security = if is_insecure(descriptor) {
        "insecure"
    } else {
        "secure"
    };

    format!(
        "Valid:    yes\nScheme:   {}\nEndpoint: {}\nSecurity: {}\n",
        scheme, endpoint, security
    )
}

/// Run the inspect command
pub async fn run(descriptor: &str) -> Result<()> {
    println!();
    print!("{}", describe(descriptor));
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_valid() {
        let out = describe("vless://u@Host.Example:443?security=none#n");
        assert!(out.contains("Valid:    yes"));
        assert!(out.contains("Scheme:   vless"));
        assert!(out.contains("Endpoint: host.example:443"));
        assert!(out.contains("Security: insecure"));
    }

    #[test]
    fn test_describe_opaque_vmess() {
        let out = describe("vmess://AAA");
        assert!(out.contains("Endpoint: -"));
        assert!(out.contains("Security: secure"));
    }

    #[test]
    fn test_describe_invalid() {
        assert!(describe("http://example.com").contains("Valid:    no"));
    }
}
