//! Publishing artifacts to a GitHub repository through the contents API.
//!
//! Uploads are create-or-update: a missing remote file is created, an
//! identical one is left alone, a different one is replaced. Update conflicts
//! (HTTP 409) are retried with exponential backoff.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{SecureString, UploadConfig};
use crate::descriptor::decode_base64_lenient;
use crate::error::SieveError;
use crate::logger::RunLog;

/// Remaining API quota below which a warning is logged
const RATE_LIMIT_WARN_THRESHOLD: u64 = 100;

const DEFAULT_CONFLICT_BACKOFF_MS: u64 = 500;

/// Result of a single create-or-update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Remote file store the run publishes into.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, local: &Path, remote: &str) -> Result<UploadOutcome, SieveError>;
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    sha: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    rate: RateLimit,
}

#[derive(Debug, Deserialize)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
}

enum PutStatus {
    Committed,
    Conflict,
}

/// Uploader backed by `PUT /repos/{repo}/contents/{path}`
pub struct GitHubUploader {
    client: Client,
    api_base: String,
    repo: String,
    branch: String,
    token: SecureString,
    max_retries: u32,
    conflict_backoff: Duration,
}

impl GitHubUploader {
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("vpnsieve/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            token: config.get_token(),
            max_retries: config.max_retries.max(1),
            conflict_backoff: Duration::from_millis(DEFAULT_CONFLICT_BACKOFF_MS),
        })
    }

    /// Base delay before the first conflict retry; doubles on each retry
    pub fn with_conflict_backoff(mut self, backoff: Duration) -> Self {
        self.conflict_backoff = backoff;
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/vnd.github+json");
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(self.token.as_str())
        }
    }

    fn contents_url(&self, remote: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_base,
            self.repo,
            remote.trim_start_matches('/')
        )
    }

    /// Query the API quota and warn when it runs low
    pub async fn check_rate_limit(&self) -> Result<RateLimit> {
        let response = self
            .authorized(self.client.get(format!("{}/rate_limit", self.api_base)))
            .send()
            .await
            .context("Failed to query rate limit")?
            .error_for_status()
            .context("Rate limit query rejected")?;
        let body: RateLimitResponse = response
            .json()
            .await
            .context("Failed to parse rate limit response")?;

        if body.rate.remaining < RATE_LIMIT_WARN_THRESHOLD {
            warn!(
                "GitHub API quota low: {}/{} requests left",
                body.rate.remaining, body.rate.limit
            );
        } else {
            info!(
                "GitHub API quota: {}/{} requests left",
                body.rate.remaining, body.rate.limit
            );
        }
        Ok(body.rate)
    }

    async fn get_remote(&self, remote: &str) -> Result<Option<RemoteFile>, SieveError> {
        let response = self
            .authorized(self.client.get(self.contents_url(remote)))
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(|e| SieveError::Upload(format!("get {}: {}", remote, e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<RemoteFile>()
                .await
                .map(Some)
                .map_err(|e| SieveError::Upload(format!("parse {}: {}", remote, e))),
            status => Err(SieveError::Upload(format!(
                "get {}: HTTP {}",
                remote, status
            ))),
        }
    }

    async fn put(
        &self,
        remote: &str,
        content: &str,
        message: String,
        sha: Option<&str>,
    ) -> Result<PutStatus, SieveError> {
        let body = PutRequest {
            message,
            content: general_purpose::STANDARD.encode(content),
            branch: &self.branch,
            sha,
        };
        let response = self
            .authorized(self.client.put(self.contents_url(remote)))
            .json(&body)
            .send()
            .await
            .map_err(|e| SieveError::Upload(format!("put {}: {}", remote, e)))?;

        match response.status() {
            StatusCode::CONFLICT => Ok(PutStatus::Conflict),
            status if status.is_success() => Ok(PutStatus::Committed),
            status => Err(SieveError::Upload(format!(
                "put {}: HTTP {}",
                remote, status
            ))),
        }
    }
}

#[async_trait]
impl Uploader for GitHubUploader {
    async fn upload(&self, local: &Path, remote: &str) -> Result<UploadOutcome, SieveError> {
        let content = tokio::fs::read_to_string(local)
            .await
            .map_err(|e| SieveError::Upload(format!("read {}: {}", local.display(), e)))?;

        for attempt in 1..=self.max_retries {
            let existing = self.get_remote(remote).await?;

            let (status, outcome) = match existing {
                None => {
                    let message = commit_message("Create", remote, Utc::now());
                    (self.put(remote, &content, message, None).await?, UploadOutcome::Created)
                }
                Some(file) => {
                    let unchanged = file
                        .content
                        .as_deref()
                        .and_then(decode_base64_lenient)
                        .is_some_and(|bytes| bytes == content.as_bytes());
                    if unchanged {
                        debug!("{} unchanged remotely", remote);
                        return Ok(UploadOutcome::Unchanged);
                    }
                    let message = commit_message("Update", remote, Utc::now());
                    (
                        self.put(remote, &content, message, Some(file.sha.as_str())).await?,
                        UploadOutcome::Updated,
                    )
                }
            };

            match status {
                PutStatus::Committed => return Ok(outcome),
                PutStatus::Conflict if attempt < self.max_retries => {
                    let wait = self.conflict_backoff * 2u32.pow(attempt - 1);
                    warn!(
                        "SHA conflict on {}, attempt {}/{}, waiting {:?}",
                        remote, attempt, self.max_retries, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                PutStatus::Conflict => {}
            }
        }

        Err(SieveError::Upload(format!(
            "gave up on {} after {} conflicting attempts",
            remote, self.max_retries
        )))
    }
}

/// `{verb} {basename}: HH:MM | DD.MM.YYYY`
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use vpnsieve::uploader::commit_message;
/// let at = Utc.with_ymd_and_hms(2025, 7, 4, 9, 5, 0).unwrap();
/// assert_eq!(
///     commit_message("Update", "githubmirror/default/1.txt", at),
///     "Update 1.txt: 09:05 | 04.07.2025"
/// );
/// ```
pub fn commit_message(verb: &str, remote: &str, at: DateTime<Utc>) -> String {
    let basename = remote.rsplit('/').next().unwrap_or(remote);
    format!("{} {}: {}", verb, basename, at.format("%H:%M | %d.%m.%Y"))
}

/// A changed local file and where it goes remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub local: PathBuf,
    pub remote: String,
}

/// Counts of upload outcomes for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Concurrency for an upload batch of `n` files
pub fn upload_workers(n: usize) -> usize {
    n.min(6).max(2)
}

/// Upload every job; failures are logged and counted, never propagated.
pub async fn upload_all(uploader: &dyn Uploader, jobs: &[UploadJob], log: &RunLog) -> UploadSummary {
    let results: Vec<(&UploadJob, Result<UploadOutcome, SieveError>)> =
        stream::iter(jobs.iter().map(|job| async move {
            (job, uploader.upload(&job.local, &job.remote).await)
        }))
        .buffer_unordered(upload_workers(jobs.len()))
        .collect()
        .await;

    let mut summary = UploadSummary::default();
    for (job, result) in results {
        match result {
            Ok(UploadOutcome::Created) => {
                summary.created += 1;
                log.mark_updated(&job.remote);
                log.info(&job.remote, "created");
            }
            Ok(UploadOutcome::Updated) => {
                summary.updated += 1;
                log.mark_updated(&job.remote);
                log.info(&job.remote, "updated");
            }
            Ok(UploadOutcome::Unchanged) => summary.unchanged += 1,
            Err(e) => {
                summary.failed += 1;
                log.warn(&job.remote, e.to_string());
            }
        }
    }
    summary
}
