//! Destination allow-lists used to select bypass descriptors.
//!
//! Two lists are consulted: domain suffixes matched as substrings of the raw
//! descriptor text, and literal IPs (or CIDR ranges) matched against the
//! descriptor's extracted host.

use ipnet::IpNet;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, warn};

use crate::descriptor::{extract_endpoint, is_descriptor};
use crate::fs_abstraction::FileSystem;
use crate::validation::validate_ip_or_cidr;

/// Compiled regex size ceiling. Whitelists run to tens of thousands of domains.
const MATCHER_SIZE_LIMIT: usize = 256 * 1024 * 1024;

/// Domain suffixes, pruned and compiled into a single matcher.
#[derive(Debug, Clone, Default)]
pub struct DomainAllowlist {
    domains: Vec<String>,
    matcher: Option<Regex>,
}

impl DomainAllowlist {
    /// Build from raw entries. Blank lines and `#` comments are ignored.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = prune_domains(entries);
        let matcher = compile_matcher(&domains);
        Self { domains, matcher }
    }

    /// Entries remaining after pruning, shortest first.
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// True if any listed domain occurs in `text` (case-sensitive).
    pub fn matches(&self, text: &str) -> bool {
        match &self.matcher {
            Some(re) => re.is_match(text),
            None => self.domains.iter().any(|d| text.contains(d.as_str())),
        }
    }
}

/// Drop entries that contain a shorter listed entry.
///
/// Substring matching on the shorter entry already covers the longer one, so
/// `sub.example.com` is redundant next to `example.com`.
pub fn prune_domains<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut candidates: Vec<String> = entries
        .into_iter()
        .map(|e| e.as_ref().trim().to_string())
        .filter(|e| !e.is_empty() && !e.starts_with('#'))
        .collect();
    candidates.sort_by_key(String::len);

    let mut kept: Vec<String> = Vec::with_capacity(candidates.len());
    for domain in candidates {
        if !kept.iter().any(|existing| domain.contains(existing.as_str())) {
            kept.push(domain);
        }
    }
    kept
}

fn compile_matcher(domains: &[String]) -> Option<Regex> {
    if domains.is_empty() {
        return None;
    }
    let pattern = format!(
        "(?:{})",
        domains
            .iter()
            .map(|d| regex::escape(d))
            .collect::<Vec<_>>()
            .join("|")
    );
    RegexBuilder::new(&pattern)
        .size_limit(MATCHER_SIZE_LIMIT)
        .dfa_size_limit(MATCHER_SIZE_LIMIT)
        .build()
        .map_err(|e| warn!("Domain matcher too large, falling back to scan: {}", e))
        .ok()
}

/// Literal IPs plus CIDR ranges.
#[derive(Debug, Clone, Default)]
pub struct IpAllowlist {
    addrs: HashSet<IpAddr>,
    ranges: Vec<IpNet>,
}

impl IpAllowlist {
    /// Build from raw entries; unparseable entries are skipped.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            match validate_ip_or_cidr(entry) {
                Ok(net) if net.prefix_len() == net.max_prefix_len() => {
                    list.addrs.insert(net.addr());
                }
                Ok(net) => list.ranges.push(net),
                Err(e) => debug!("Skipping allowlist entry: {}", e),
            }
        }
        list
    }

    pub fn len(&self) -> usize {
        self.addrs.len() + self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty() && self.ranges.is_empty()
    }

    /// True if `host` is a literal IP covered by the list.
    pub fn contains_host(&self, host: &str) -> bool {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let Ok(ip) = host.parse::<IpAddr>() else {
            return false;
        };
        self.addrs.contains(&ip) || self.ranges.iter().any(|net| net.contains(&ip))
    }
}

/// Domain and IP allow-lists applied together.
#[derive(Debug, Clone, Default)]
pub struct DestinationFilter {
    pub domains: DomainAllowlist,
    pub ips: IpAllowlist,
}

impl DestinationFilter {
    pub fn new(domains: DomainAllowlist, ips: IpAllowlist) -> Self {
        Self { domains, ips }
    }

    /// Load both lists from files. A missing file degrades to an empty list.
    pub fn load(fs: &dyn FileSystem, domains_path: &Path, ips_path: &Path) -> Self {
        let domains = DomainAllowlist::new(read_lines_or_empty(fs, domains_path));
        let ips = IpAllowlist::new(read_lines_or_empty(fs, ips_path));
        Self { domains, ips }
    }

    /// True if the descriptor is valid and reaches an allow-listed destination.
    pub fn matches_allowlist(&self, descriptor: &str) -> bool {
        if !is_descriptor(descriptor) {
            return false;
        }
        if self.domains.matches(descriptor) {
            return true;
        }
        extract_endpoint(descriptor).is_some_and(|endpoint| self.ips.contains_host(&endpoint.host))
    }
}

/// Read a newline-separated list, treating a missing or unreadable file as empty.
pub fn read_lines_or_empty(fs: &dyn FileSystem, path: &Path) -> Vec<String> {
    if !fs.exists(path) {
        warn!("{} not found, using empty list", path.display());
        return Vec::new();
    }
    match fs.read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            Vec::new()
        }
    }
}
