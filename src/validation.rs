//! Centralized validation functions for vpnsieve.
//!
//! This module provides unified validation for:
//! - IP addresses and CIDR ranges (IP allow-list entries)
//! - Source URLs
//! - Upload repository names

use anyhow::{bail, Result};
use ipnet::IpNet;
use std::net::IpAddr;
use url::Url;

/// Validate an IP address or CIDR string and return the parsed IpNet.
///
/// If the input is a plain IP address (without /prefix), it will be converted
/// to a /32 (IPv4) or /128 (IPv6) network.
///
/// # Examples
/// ```
/// use vpnsieve::validation::validate_ip_or_cidr;
/// assert!(validate_ip_or_cidr("192.168.1.1").is_ok());
/// assert!(validate_ip_or_cidr("192.168.0.0/24").is_ok());
/// assert!(validate_ip_or_cidr("invalid").is_err());
/// ```
pub fn validate_ip_or_cidr(ip_str: &str) -> Result<IpNet> {
    if ip_str.contains('/') {
        ip_str
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid CIDR: {}", ip_str))
    } else {
        let ip: IpAddr = ip_str
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid IP address: {}", ip_str))?;
        Ok(IpNet::from(ip))
    }
}

/// Validate that a source locator is an absolute http(s) URL with a host.
///
/// # Examples
/// ```
/// use vpnsieve::validation::validate_source_url;
/// assert!(validate_source_url("https://raw.githubusercontent.com/a/b/main/list.txt").is_ok());
/// assert!(validate_source_url("ftp://example.com/list.txt").is_err());
/// assert!(validate_source_url("not a url").is_err());
/// ```
pub fn validate_source_url(source: &str) -> Result<Url> {
    let url = Url::parse(source).map_err(|e| anyhow::anyhow!("Invalid source URL '{}': {}", source, e))?;

    if !matches!(url.scheme(), "http" | "https") {
        bail!(
            "Invalid source URL '{}': scheme must be http or https",
            source
        );
    }
    if url.host_str().map_or(true, str::is_empty) {
        bail!("Invalid source URL '{}': missing host", source);
    }

    Ok(url)
}

/// Validate an `owner/name` repository identifier.
///
/// # Examples
/// ```
/// use vpnsieve::validation::validate_repo_name;
/// assert!(validate_repo_name("whoahaow/rjsxrd").is_ok());
/// assert!(validate_repo_name("no-slash").is_err());
/// assert!(validate_repo_name("a/b/c").is_err());
/// ```
pub fn validate_repo_name(repo: &str) -> Result<()> {
    let parts: Vec<&str> = repo.split('/').collect();
    let valid_part = |p: &str| {
        !p.is_empty()
            && p
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c))
    };

    if parts.len() != 2 || !parts.iter().all(|p| valid_part(p)) {
        bail!(
            "Invalid repository '{}'. Use the form 'owner/name'",
            repo
        );
    }
    Ok(())
}
