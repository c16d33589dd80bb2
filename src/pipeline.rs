//! Pipeline orchestration: fetch every source batch, parse bodies into
//! descriptors, build the output categories and write their artifacts.
//!
//! ```text
//! plain ──┐
//! base64 ─┼─► default ──► destination filter ─┐
//! yaml ───┘                                    ├─► bypass-unsecure ─► security filter ─► bypass
//! bypass-only ─────────────────────────────────┘
//!
//! default ∪ bypass-unsecure ─► split-by-protocols/{scheme}[-secure]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::aggregator::{chunk, dedupe, split_by_protocol, ProtocolGroup};
use crate::allowlist::DestinationFilter;
use crate::config::{Config, ResolvedSources};
use crate::converter::convert_str;
use crate::descriptor::{is_descriptor, Scheme};
use crate::error::SieveError;
use crate::fetcher::{fetch_batch, SourceFetcher};
use crate::fs_abstraction::FileSystem;
use crate::logger::{RunLog, GENERAL};
use crate::normalizer::{decode_base64_body, normalize};
use crate::output::{Artifact, OutputWriter, WrittenFile};
use crate::security::is_insecure;
use crate::uploader::{upload_all, UploadJob, UploadSummary, Uploader};
use crate::utils::{truncate, MAX_ERROR_LEN};

/// How a source body is parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Plain,
    Base64,
    Yaml,
    Bypass,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Plain => "plain",
            SourceKind::Base64 => "base64",
            SourceKind::Yaml => "yaml",
            SourceKind::Bypass => "bypass",
        };
        f.write_str(name)
    }
}

/// Per-source outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub url: String,
    pub kind: SourceKind,
    pub descriptors: usize,
    pub error: Option<String>,
}

/// Parse one fetched body into descriptor lines.
pub fn parse_body(kind: SourceKind, body: &str) -> Result<Vec<String>, SieveError> {
    match kind {
        SourceKind::Plain | SourceKind::Bypass => Ok(normalize(body)),
        SourceKind::Base64 => match decode_base64_body(body) {
            Ok(decoded) => Ok(normalize(&decoded)),
            // Some "base64" feeds are served already decoded
            Err(_) if body.contains("://") => Ok(normalize(body)),
            Err(e) => Err(e),
        },
        SourceKind::Yaml => Ok(convert_str(body)?
            .into_iter()
            .filter(|line| is_descriptor(line))
            .collect()),
    }
}

/// Descriptors from every source, grouped by kind, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePools {
    pub plain: Vec<String>,
    pub base64: Vec<String>,
    pub yaml: Vec<String>,
    pub bypass: Vec<String>,
}

impl SourcePools {
    fn pool_mut(&mut self, kind: SourceKind) -> &mut Vec<String> {
        match kind {
            SourceKind::Plain => &mut self.plain,
            SourceKind::Base64 => &mut self.base64,
            SourceKind::Yaml => &mut self.yaml,
            SourceKind::Bypass => &mut self.bypass,
        }
    }
}

/// The output categories of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Categories {
    pub default: Vec<String>,
    pub default_secure: Vec<String>,
    pub bypass: Vec<String>,
    pub bypass_insecure: Vec<String>,
    pub protocols: BTreeMap<Scheme, ProtocolGroup>,
}

impl Categories {
    /// Derive every category from the fetched pools.
    pub fn build(pools: &SourcePools, filter: &DestinationFilter) -> Self {
        let merged: Vec<&String> = pools
            .plain
            .iter()
            .chain(&pools.base64)
            .chain(&pools.yaml)
            .collect();
        let default = dedupe(&merged);

        let default_secure: Vec<String> = default
            .iter()
            .filter(|d| !is_insecure(d))
            .cloned()
            .collect();

        let bypass_candidates: Vec<&String> = default
            .iter()
            .filter(|d| filter.matches_allowlist(d))
            .chain(pools.bypass.iter().filter(|d| is_descriptor(d)))
            .collect();
        let bypass_insecure = dedupe(&bypass_candidates);

        let bypass: Vec<String> = bypass_insecure
            .iter()
            .filter(|d| !is_insecure(d))
            .cloned()
            .collect();

        let union: Vec<&String> = default.iter().chain(&bypass_insecure).collect();
        let protocols = split_by_protocol(&dedupe(&union));

        Self {
            default,
            default_secure,
            bypass,
            bypass_insecure,
            protocols,
        }
    }

    /// Every artifact for these categories, chunked at `max_per_file`.
    pub fn artifacts(&self, max_per_file: usize) -> Vec<Artifact> {
        let mut artifacts = Vec::new();

        for (i, part) in chunk(&self.default, max_per_file).into_iter().enumerate() {
            artifacts.push(Artifact::new(format!("default/{}.txt", i + 1), part));
        }
        artifacts.push(Artifact::new("default/all.txt", self.default.clone()));
        artifacts.push(Artifact::new("default/all-secure.txt", self.default_secure.clone()));

        for (i, part) in chunk(&self.bypass, max_per_file).into_iter().enumerate() {
            artifacts.push(Artifact::new(format!("bypass/bypass-{}.txt", i + 1), part));
        }
        artifacts.push(Artifact::new("bypass/bypass-all.txt", self.bypass.clone()));

        for (i, part) in chunk(&self.bypass_insecure, max_per_file)
            .into_iter()
            .enumerate()
        {
            artifacts.push(Artifact::new(
                format!("bypass-unsecure/bypass-unsecure-{}.txt", i + 1),
                part,
            ));
        }
        artifacts.push(Artifact::new(
            "bypass-unsecure/bypass-unsecure-all.txt",
            self.bypass_insecure.clone(),
        ));

        for (scheme, group) in &self.protocols {
            artifacts.push(Artifact::new(
                format!("split-by-protocols/{}.txt", scheme),
                group.all.clone(),
            ));
            artifacts.push(Artifact::new(
                format!("split-by-protocols/{}-secure.txt", scheme),
                group.secure.clone(),
            ));
        }

        artifacts
    }

    pub fn counts(&self) -> CategoryCounts {
        CategoryCounts {
            default: self.default.len(),
            default_secure: self.default_secure.len(),
            bypass: self.bypass.len(),
            bypass_insecure: self.bypass_insecure.len(),
            protocols: self
                .protocols
                .iter()
                .map(|(scheme, group)| {
                    (
                        scheme.to_string(),
                        ProtocolCount {
                            all: group.all.len(),
                            secure: group.secure.len(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Category sizes, as persisted in the run state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub default: usize,
    pub default_secure: usize,
    pub bypass: usize,
    pub bypass_insecure: usize,
    pub protocols: BTreeMap<String, ProtocolCount>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolCount {
    pub all: usize,
    pub secure: usize,
}

/// Everything a run produced
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sources: Vec<SourceReport>,
    pub categories: Categories,
    pub written: Vec<WrittenFile>,
    pub uploads: Option<UploadSummary>,
}

impl RunSummary {
    pub fn changed_files(&self) -> impl Iterator<Item = &WrittenFile> {
        self.written.iter().filter(|f| f.changed)
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }
}

/// One run over a fetcher and a filesystem
pub struct Pipeline<'a, F: SourceFetcher + ?Sized> {
    fetcher: &'a F,
    fs: &'a dyn FileSystem,
    log: &'a RunLog,
    max_workers: usize,
    max_per_file: usize,
    output_dir: PathBuf,
    uploader: Option<(&'a dyn Uploader, String)>,
}

impl<'a, F: SourceFetcher + ?Sized> Pipeline<'a, F> {
    pub fn new(config: &Config, fetcher: &'a F, fs: &'a dyn FileSystem, log: &'a RunLog) -> Self {
        Self {
            fetcher,
            fs,
            log,
            max_workers: config.fetch.max_workers,
            max_per_file: config.max_per_file,
            output_dir: config.output_dir.clone(),
            uploader: None,
        }
    }

    /// Publish changed artifacts under `remote_prefix` after writing them
    pub fn with_uploader(mut self, uploader: &'a dyn Uploader, remote_prefix: &str) -> Self {
        self.uploader = Some((uploader, remote_prefix.trim_matches('/').to_string()));
        self
    }

    /// Fetch one batch and parse every body. Failed sources contribute nothing.
    async fn collect_batch(
        &self,
        kind: SourceKind,
        urls: &[String],
        first_index: usize,
        pools: &mut SourcePools,
        reports: &mut Vec<SourceReport>,
    ) {
        if urls.is_empty() {
            return;
        }
        let bodies = fetch_batch(self.fetcher, urls, self.max_workers).await;

        for (offset, (url, body)) in urls.iter().zip(bodies).enumerate() {
            let group = format!("{:03} {}", first_index + offset + 1, url);
            let parsed = body
                .map_err(SieveError::from)
                .and_then(|text| parse_body(kind, &text));

            let report = match parsed {
                Ok(descriptors) => {
                    self.log
                        .info(&group, format!("{} {} descriptors", descriptors.len(), kind));
                    let count = descriptors.len();
                    pools.pool_mut(kind).extend(descriptors);
                    SourceReport {
                        url: url.clone(),
                        kind,
                        descriptors: count,
                        error: None,
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    self.log.warn(&group, &message);
                    SourceReport {
                        url: url.clone(),
                        kind,
                        descriptors: 0,
                        error: Some(truncate(&message, MAX_ERROR_LEN)),
                    }
                }
            };
            reports.push(report);
        }
    }

    /// Fetch and parse every source list, batch by batch
    pub async fn collect(&self, sources: &ResolvedSources) -> (SourcePools, Vec<SourceReport>) {
        let mut pools = SourcePools::default();
        let mut reports = Vec::with_capacity(sources.total());

        let batches = [
            (SourceKind::Plain, &sources.plain),
            (SourceKind::Base64, &sources.base64),
            (SourceKind::Yaml, &sources.yaml),
            (SourceKind::Bypass, &sources.bypass),
        ];
        for (kind, urls) in batches {
            let first_index = reports.len();
            self.collect_batch(kind, urls, first_index, &mut pools, &mut reports)
                .await;
        }

        (pools, reports)
    }

    /// Full run: collect, categorize, write, and upload if configured
    pub async fn run(&self, sources: &ResolvedSources, filter: &DestinationFilter) -> RunSummary {
        self.log.info(
            GENERAL,
            format!(
                "{} sources, {} allow-listed domains, {} allow-listed IPs",
                sources.total(),
                filter.domains.len(),
                filter.ips.len()
            ),
        );

        let (pools, reports) = self.collect(sources).await;
        let categories = Categories::build(&pools, filter);
        self.log.info(
            GENERAL,
            format!(
                "default: {}, bypass: {}, bypass-unsecure: {}, protocols: {}",
                categories.default.len(),
                categories.bypass.len(),
                categories.bypass_insecure.len(),
                categories.protocols.len()
            ),
        );

        let artifacts = categories.artifacts(self.max_per_file);
        let writer = OutputWriter::new(self.fs, &self.output_dir);
        let written = writer.write_all(&artifacts, self.log);

        let uploads = match &self.uploader {
            Some((uploader, prefix)) => {
                let jobs: Vec<UploadJob> = written
                    .iter()
                    .filter(|f| f.changed)
                    .map(|f| UploadJob {
                        local: f.local.clone(),
                        remote: remote_path(prefix, &f.relative),
                    })
                    .collect();
                Some(upload_all(*uploader, &jobs, self.log).await)
            }
            None => None,
        };

        RunSummary {
            sources: reports,
            categories,
            written,
            uploads,
        }
    }
}

/// Join a remote prefix and a relative artifact path
pub fn remote_path(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::{DomainAllowlist, IpAllowlist};
    use base64::engine::general_purpose;
    use base64::Engine;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_body_base64_variants() {
        let encoded = general_purpose::STANDARD.encode("vless://a@h:1\ntrojan://b@h:2");
        assert_eq!(
            parse_body(SourceKind::Base64, &encoded).unwrap(),
            lines(&["vless://a@h:1", "trojan://b@h:2"])
        );

        // Already decoded
        assert_eq!(
            parse_body(SourceKind::Base64, "vless://a@h:1\n").unwrap(),
            lines(&["vless://a@h:1"])
        );

        assert!(matches!(
            parse_body(SourceKind::Base64, "%%% not base64 %%%"),
            Err(SieveError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_body_yaml() {
        let yaml = "proxies:\n  - {name: a, type: trojan, server: h, port: 443, password: p}\n";
        let parsed = parse_body(SourceKind::Yaml, yaml).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].starts_with("trojan://p@h:443"));

        assert!(parse_body(SourceKind::Yaml, "proxies: [unclosed").is_err());
    }

    #[test]
    fn test_categories_scenario() {
        let pools = SourcePools {
            plain: lines(&[
                "vmess://AAA",
                "vless://BBB@1.2.3.4:443?security=none#x",
                "vless://BBB@1.2.3.4:443?security=none#x",
                "trojan://CCC@5.6.7.8:80#y",
            ]),
            ..Default::default()
        };
        let filter = DestinationFilter::new(DomainAllowlist::default(), IpAllowlist::new(["5.6.7.8"]));
        let categories = Categories::build(&pools, &filter);

        assert_eq!(
            categories.default,
            lines(&[
                "vmess://AAA",
                "vless://BBB@1.2.3.4:443?security=none#x",
                "trojan://CCC@5.6.7.8:80#y"
            ])
        );
        assert_eq!(categories.bypass_insecure, lines(&["trojan://CCC@5.6.7.8:80#y"]));
        // The trojan line is allow-listed and carries no insecure setting,
        // so the secure bypass subset keeps it
        assert_eq!(categories.bypass, lines(&["trojan://CCC@5.6.7.8:80#y"]));
        assert_eq!(categories.default_secure.len(), 2);
    }

    #[test]
    fn test_bypass_only_sources_skip_destination_filter() {
        let pools = SourcePools {
            plain: lines(&["vless://a@1.1.1.1:443#n"]),
            bypass: lines(&["vless://curated@9.9.9.9:443?security=none#c", "vless://a@1.1.1.1:443#dup"]),
            ..Default::default()
        };
        let categories = Categories::build(&pools, &DestinationFilter::default());

        assert!(!categories.default.iter().any(|d| d.contains("curated")));
        assert_eq!(
            categories.bypass_insecure,
            lines(&["vless://curated@9.9.9.9:443?security=none#c", "vless://a@1.1.1.1:443#dup"])
        );
        assert_eq!(categories.bypass, lines(&["vless://a@1.1.1.1:443#dup"]));
        // Union dedupes the endpoint shared with default
        assert_eq!(categories.protocols[&Scheme::Vless].all.len(), 2);
    }

    #[test]
    fn test_bypass_is_subset_of_insecure() {
        let pools = SourcePools {
            plain: lines(&[
                "vless://u@a.example.com:443?security=tls#1",
                "vless://u@b.example.com:443?allowInsecure=1#2",
                "trojan://p@c.other:443#3",
            ]),
            ..Default::default()
        };
        let filter = DestinationFilter::new(DomainAllowlist::new(["example.com"]), IpAllowlist::default());
        let categories = Categories::build(&pools, &filter);

        assert_eq!(categories.bypass_insecure.len(), 2);
        assert_eq!(categories.bypass.len(), 1);
        assert!(categories
            .bypass
            .iter()
            .all(|d| categories.bypass_insecure.contains(d)));
    }

    #[test]
    fn test_artifacts_layout() {
        let pools = SourcePools {
            plain: (0..5).map(|i| format!("trojan://p@h{}:443#{}", i, i)).collect(),
            ..Default::default()
        };
        let categories = Categories::build(&pools, &DestinationFilter::default());
        let artifacts = categories.artifacts(2);
        let paths: Vec<&str> = artifacts.iter().map(|a| a.path.as_str()).collect();

        assert_eq!(
            paths,
            vec![
                "default/1.txt",
                "default/2.txt",
                "default/3.txt",
                "default/all.txt",
                "default/all-secure.txt",
                "bypass/bypass-all.txt",
                "bypass-unsecure/bypass-unsecure-all.txt",
                "split-by-protocols/trojan.txt",
                "split-by-protocols/trojan-secure.txt",
            ]
        );
        assert_eq!(artifacts[2].lines.len(), 1);
        assert!(artifacts[5].lines.is_empty());
    }

    #[test]
    fn test_counts() {
        let pools = SourcePools {
            plain: lines(&["vless://a@h:1?security=none", "trojan://b@h:2"]),
            ..Default::default()
        };
        let counts = Categories::build(&pools, &DestinationFilter::default()).counts();
        assert_eq!(counts.default, 2);
        assert_eq!(counts.default_secure, 1);
        assert_eq!(counts.protocols["vless"], ProtocolCount { all: 1, secure: 0 });
    }

    #[test]
    fn test_remote_path() {
        assert_eq!(remote_path("githubmirror", "default/1.txt"), "githubmirror/default/1.txt");
        assert_eq!(remote_path("", "default/1.txt"), "default/1.txt");
    }
}
