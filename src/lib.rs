//! # vpnsieve - proxy subscription aggregator
//!
//! Collects publicly shared proxy descriptors (`vless://`, `vmess://`,
//! `trojan://`, ...) from many remote lists, deduplicates them, classifies
//! them by protocol, transport security and destination, and writes the
//! result as a small set of plain-text files ready to be republished.
//!
//! ## Features
//!
//! - **Heterogeneous sources** - plain lists, whole-body base64 subscriptions and Clash YAML
//! - **Resilient fetching** - escalating retries, isolated per-source failures
//! - **Deterministic output** - identical inputs produce byte-identical files
//! - **Bypass selection** - domain and IP allow-lists pick descriptors for whitelisted networks
//! - **Publishing** - optional create-or-update upload through the GitHub contents API
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        vpnsieve                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: run, inspect, convert, stats, version      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! │    └── Sources, allow-list files, fetch and upload settings │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest + rustls)                                 │
//! │    └── verified → unverified → plaintext escalation         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Parsing                                                    │
//! │    ├── Normalizer (split glued descriptors)                 │
//! │    └── Converter (Clash YAML → descriptors)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Classification                                             │
//! │    ├── Aggregator (dedupe, split by protocol, chunk)        │
//! │    ├── Security (insecure transport heuristics)             │
//! │    └── Allowlist (domain + IP destination filter)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Output (atomic, skip-if-unchanged) → Uploader (GitHub)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use vpnsieve::allowlist::DestinationFilter;
//! use vpnsieve::config::Config;
//! use vpnsieve::fetcher::HttpFetcher;
//! use vpnsieve::fs_abstraction::real_fs;
//! use vpnsieve::logger::RunLog;
//! use vpnsieve::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_or_default("vpnsieve.yaml")?;
//!     let sources = config.sources.resolve(real_fs());
//!     let filter = DestinationFilter::load(
//!         real_fs(),
//!         &config.allowlist.domains_file,
//!         &config.allowlist.ips_file,
//!     );
//!
//!     let fetcher = HttpFetcher::new(&config.fetch)?;
//!     let log = RunLog::new();
//!     let summary = Pipeline::new(&config, &fetcher, real_fs(), &log)
//!         .run(&sources, &filter)
//!         .await;
//!
//!     println!("{}", log.flush());
//!     println!("{} descriptors in default", summary.categories.default.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`aggregator`] - Deduplication, protocol split and chunking
//! - [`allowlist`] - Domain and IP allow-lists, destination filter
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`converter`] - Clash-style YAML to descriptor conversion
//! - [`descriptor`] - Scheme set, validation and endpoint identity
//! - [`error`] - Error taxonomy
//! - [`fetcher`] - HTTP client for downloading sources
//! - [`fs_abstraction`] - Injectable filesystem
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`logger`] - Grouped run log
//! - [`normalizer`] - Raw body to descriptor lines
//! - [`output`] - Artifact writer
//! - [`pipeline`] - Run orchestration
//! - [`security`] - Insecure transport detection
//! - [`stats`] - State persistence and statistics
//! - [`uploader`] - GitHub contents API publishing
//! - [`utils`] - Common utility functions (formatting, truncation)
//! - [`validation`] - Input validation

pub mod aggregator;
pub mod allowlist;
pub mod cli;
pub mod commands;
pub mod config;
pub mod converter;
pub mod descriptor;
pub mod error;
pub mod fetcher;
pub mod fs_abstraction;
pub mod lock;
pub mod logger;
pub mod normalizer;
pub mod output;
pub mod pipeline;
pub mod security;
pub mod stats;
pub mod uploader;
pub mod utils;
pub mod validation;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::{FetchError, SieveError};
