//! Configuration management for vpnsieve.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::SieveError;
use crate::fs_abstraction::FileSystem;
use crate::validation::{validate_repo_name, validate_source_url};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "vpnsieve.yaml";

/// Environment variable overriding `fetch.max_workers`
pub const MAX_WORKERS_ENV: &str = "VPNSIEVE_MAX_WORKERS";

/// Default environment variable holding the upload token
pub const TOKEN_ENV: &str = "VPNSIEVE_GITHUB_TOKEN";

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                         AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/138.0.0.0 Safari/537.36";

/// Secure string type that zeroizes memory on drop
/// Used for sensitive data like tokens
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory receiving the generated artifacts
    pub output_dir: PathBuf,

    /// JSON file holding the last run's statistics
    pub state_file: PathBuf,

    /// Maximum descriptors per numbered chunk file
    pub max_per_file: usize,

    /// Subscription sources
    pub sources: SourcesConfig,

    /// Destination allow-list files
    pub allowlist: AllowlistConfig,

    /// HTTP fetch behavior
    pub fetch: FetchConfig,

    /// Remote publishing
    pub upload: UploadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("githubmirror"),
            state_file: PathBuf::from("vpnsieve-state.json"),
            max_per_file: 300,
            sources: SourcesConfig::default(),
            allowlist: AllowlistConfig::default(),
            fetch: FetchConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to built-in defaults when the file is missing
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        warn!("Config file {:?} not found, using defaults", path);
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var(MAX_WORKERS_ENV) {
            self.fetch.max_workers = val
                .trim()
                .parse()
                .with_context(|| format!("Invalid {} value: {:?}", MAX_WORKERS_ENV, val))?;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_per_file", self.max_per_file as u64),
            ("fetch.max_attempts", u64::from(self.fetch.max_attempts)),
            ("fetch.max_workers", self.fetch.max_workers as u64),
            ("fetch.timeout_secs", self.fetch.timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(SieveError::Config(format!("{} must be greater than 0", field)).into());
            }
        }

        let inline = [
            &self.sources.plain,
            &self.sources.base64,
            &self.sources.yaml,
            &self.sources.bypass,
        ];
        for url in inline.into_iter().flatten() {
            validate_source_url(url)?;
        }

        if self.upload.enabled {
            validate_repo_name(&self.upload.repo)?;
            validate_source_url(&self.upload.api_base)
                .context("upload.api_base must be an http(s) URL")?;
        }

        Ok(())
    }
}

/// Source URL lists. Inline entries come first, then entries from the list file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Plain-text sources, one or more descriptors per line
    pub plain: Vec<String>,
    pub plain_file: Option<PathBuf>,

    /// Sources whose whole body is base64 of a plain-text list
    pub base64: Vec<String>,
    pub base64_file: Option<PathBuf>,

    /// Clash-style YAML sources
    pub yaml: Vec<String>,
    pub yaml_file: Option<PathBuf>,

    /// Curated sources feeding only the bypass categories
    pub bypass: Vec<String>,
    pub bypass_file: Option<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            plain: Vec::new(),
            plain_file: None,
            base64: Vec::new(),
            base64_file: None,
            yaml: Vec::new(),
            yaml_file: None,
            bypass: default_bypass_sources(),
            bypass_file: None,
        }
    }
}

/// Fully resolved source lists for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSources {
    pub plain: Vec<String>,
    pub base64: Vec<String>,
    pub yaml: Vec<String>,
    pub bypass: Vec<String>,
}

impl ResolvedSources {
    pub fn total(&self) -> usize {
        self.plain.len() + self.base64.len() + self.yaml.len() + self.bypass.len()
    }
}

impl SourcesConfig {
    /// Merge inline lists with their list files. Invalid URLs from files are skipped.
    pub fn resolve(&self, fs: &dyn FileSystem) -> ResolvedSources {
        let merge = |inline: &[String], file: &Option<PathBuf>| -> Vec<String> {
            let mut urls = inline.to_vec();
            if let Some(path) = file {
                for url in read_url_list(fs, path) {
                    match validate_source_url(&url) {
                        Ok(_) => urls.push(url),
                        Err(e) => warn!("{}: {}", path.display(), e),
                    }
                }
            }
            urls
        };

        ResolvedSources {
            plain: merge(&self.plain, &self.plain_file),
            base64: merge(&self.base64, &self.base64_file),
            yaml: merge(&self.yaml, &self.yaml_file),
            bypass: merge(&self.bypass, &self.bypass_file),
        }
    }
}

/// Read one URL per line, ignoring blank lines and `#` comments.
/// A missing or unreadable file yields an empty list.
pub fn read_url_list(fs: &dyn FileSystem, path: &Path) -> Vec<String> {
    if !fs.exists(path) {
        warn!("{} not found, using empty list", path.display());
        return Vec::new();
    }
    match fs.read_to_string(path) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect(),
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowlistConfig {
    /// Newline-separated domain suffixes
    pub domains_file: PathBuf,
    /// Newline-separated literal IPs or CIDR ranges
    pub ips_file: PathBuf,
}

impl Default for AllowlistConfig {
    fn default() -> Self {
        Self {
            domains_file: PathBuf::from("whitelist-all.txt"),
            ips_file: PathBuf::from("whitelist-ips.txt"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Escalating attempts per source
    pub max_attempts: u32,
    /// Upper bound on concurrent fetches per batch
    pub max_workers: usize,
    /// Allow the last attempt to downgrade https to plain http
    pub allow_plaintext_fallback: bool,
    pub user_agent: String,
    /// Largest accepted response body
    pub max_body_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_attempts: 3,
            max_workers: 16,
            allow_plaintext_fallback: true,
            user_agent: CHROME_UA.to_string(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    /// Target repository as `owner/name`
    pub repo: String,
    pub branch: String,
    /// Directory in the repository mirroring `output_dir`
    pub remote_prefix: String,
    pub api_base: String,
    /// Token can be set directly or via VPNSIEVE_GITHUB_TOKEN env var
    /// Memory is securely zeroed when dropped
    pub token: SecureString,
    /// Environment variable name to read token from (optional)
    pub token_env: Option<String>,
    /// Retries on update conflicts
    pub max_retries: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repo: String::new(),
            branch: "main".to_string(),
            remote_prefix: "githubmirror".to_string(),
            api_base: "https://api.github.com".to_string(),
            token: SecureString::default(),
            token_env: None,
            max_retries: 5,
        }
    }
}

impl UploadConfig {
    /// Get the effective token, checking env vars first
    /// Returns a SecureString that will be zeroed when dropped
    pub fn get_token(&self) -> SecureString {
        // First check custom env var if specified
        if let Some(ref env_name) = self.token_env {
            if let Ok(val) = env::var(env_name) {
                return SecureString::new(val);
            }
        }
        // Then check default env var
        if let Ok(val) = env::var(TOKEN_ENV) {
            return SecureString::new(val);
        }
        // Fall back to config value
        self.token.clone()
    }
}

fn default_bypass_sources() -> Vec<String> {
    [
        "https://raw.githubusercontent.com/igareck/vpn-configs-for-russia/refs/heads/main/Vless-Reality-White-Lists-Rus-Cable.txt",
        "https://raw.githubusercontent.com/igareck/vpn-configs-for-russia/refs/heads/main/Vless-Reality-White-Lists-Rus-Mobile.txt",
        "https://raw.githubusercontent.com/zieng2/wl/main/vless.txt",
        "https://raw.githubusercontent.com/zieng2/wl/refs/heads/main/vless_universal.txt",
        "https://raw.githubusercontent.com/zieng2/wl/main/vless_lite.txt",
        "https://jsnegsukavsos.hb.ru-msk.vkcloud-storage.ru/love",
        "https://raw.githubusercontent.com/LowiKLive/BypassWhitelistRu/refs/heads/main/WhiteList-Bypass_Ru.txt",
        "https://raw.githubusercontent.com/55prosek-lgtm/vpn_config_for_russia/refs/heads/main/whitelist.txt",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
