//! HTTP fetcher for subscription sources.
//!
//! Each source gets up to `max_attempts` escalating attempts:
//!
//! | attempt | certificates | scheme |
//! |---------|--------------|--------|
//! | 1       | verified     | as given |
//! | 2       | not verified | as given |
//! | 3+      | not verified | `https` rewritten to `http` when plaintext fallback is allowed |
//!
//! Inside an attempt, transient status codes get one more try after a short
//! backoff. Anything else ends the attempt.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Status codes worth one immediate retry within an attempt
const TRANSIENT_STATUS: &[u16] = &[429, 500, 502, 503, 504];

const INNER_RETRY_DELAY_MS: u64 = 200;

/// Anything that can turn a source locator into its body text.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetch a batch with at most `max_workers` requests in flight.
///
/// Results come back in the order of `urls`, one per source, so a failed
/// source never affects its siblings.
pub async fn fetch_batch<F>(
    fetcher: &F,
    urls: &[String],
    max_workers: usize,
) -> Vec<Result<String, FetchError>>
where
    F: SourceFetcher + ?Sized,
{
    let workers = max_workers.min(urls.len()).max(1);
    stream::iter(urls.iter().map(|url| fetcher.fetch(url)))
        .buffered(workers)
        .collect()
        .await
}

/// Locator for a given 1-based attempt.
///
/// # Examples
/// ```
/// use vpnsieve::fetcher::attempt_url;
/// assert_eq!(attempt_url("https://h/list.txt", 1, true), "https://h/list.txt");
/// assert_eq!(attempt_url("https://h/list.txt", 3, true), "http://h/list.txt");
/// assert_eq!(attempt_url("https://h/list.txt", 3, false), "https://h/list.txt");
/// ```
pub fn attempt_url(url: &str, attempt: u32, allow_plaintext_fallback: bool) -> String {
    if attempt < 3 || !allow_plaintext_fallback {
        return url.to_string();
    }
    match Url::parse(url) {
        Ok(mut parsed) if parsed.scheme() == "https" => {
            if parsed.set_scheme("http").is_ok() {
                parsed.to_string()
            } else {
                url.to_string()
            }
        }
        _ => url.to_string(),
    }
}

/// Only the first attempt verifies certificates.
pub fn verifies_certificates(attempt: u32) -> bool {
    attempt <= 1
}

/// HTTP client pair for fetching sources
pub struct HttpFetcher {
    secure: Client,
    insecure: Client,
    max_attempts: u32,
    allow_plaintext_fallback: bool,
    max_body_bytes: usize,
    /// Cumulative download size tracker (thread-safe for concurrent fetches)
    total_downloaded: AtomicUsize,
}

impl HttpFetcher {
    /// Create a fetcher from the fetch configuration
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let builder = || {
            Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .user_agent(config.user_agent.clone())
        };
        let secure = builder()
            .build()
            .context("Failed to create HTTP client")?;
        let insecure = builder()
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to create unverified HTTP client")?;

        Ok(Self {
            secure,
            insecure,
            max_attempts: config.max_attempts.max(1),
            allow_plaintext_fallback: config.allow_plaintext_fallback,
            max_body_bytes: config.max_body_bytes,
            total_downloaded: AtomicUsize::new(0),
        })
    }

    /// Get the total bytes downloaded so far
    pub fn total_downloaded(&self) -> usize {
        self.total_downloaded.load(Ordering::Relaxed)
    }

    /// One escalation step, including its inner retry on transient status codes
    async fn attempt(&self, client: &Client, url: &str) -> Result<String, FetchError> {
        let mut retried = false;
        loop {
            let response = client.get(url).send().await.map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;

            let status = response.status();
            if status.is_success() {
                return self.read_body(url, response).await;
            }
            if !retried && is_transient(status) {
                retried = true;
                debug!("HTTP {} from {}, retrying once", status, url);
                tokio::time::sleep(Duration::from_millis(INNER_RETRY_DELAY_MS)).await;
                continue;
            }
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
    }

    async fn read_body(&self, url: &str, response: reqwest::Response) -> Result<String, FetchError> {
        // Check Content-Length header if available
        if let Some(content_length) = response.content_length() {
            if content_length as usize > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    size: content_length as usize,
                    max: self.max_body_bytes,
                });
            }
        }

        let bytes = response.bytes().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;

        // Double-check actual size after download
        if bytes.len() > self.max_body_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                size: bytes.len(),
                max: self.max_body_bytes,
            });
        }

        self.total_downloaded.fetch_add(bytes.len(), Ordering::Relaxed);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            let target = attempt_url(url, attempt, self.allow_plaintext_fallback);
            let client = if verifies_certificates(attempt) {
                &self.secure
            } else {
                &self.insecure
            };
            if attempt > 1 {
                debug!("Attempt {} for {} (verify={})", attempt, target, verifies_certificates(attempt));
            }

            match self.attempt(client, &target).await {
                Ok(body) => return Ok(body),
                // Size does not change with trust level
                Err(e @ FetchError::TooLarge { .. }) => return Err(e),
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(last) => Err(FetchError::Exhausted {
                url: url.to_string(),
                attempts: self.max_attempts,
                last: Box::new(last),
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 0,
            }),
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    TRANSIENT_STATUS.contains(&status.as_u16())
}
