//! Error types for vpnsieve.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SieveError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Upload error: {0}")]
    Upload(String),
}

/// Failure of a single source retrieval.
///
/// The pipeline never propagates this past the source that produced it: the
/// source simply contributes zero descriptors for the run.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Response from {url} too large: {size} bytes (max: {max} bytes)")]
    TooLarge { url: String, size: usize, max: usize },

    #[error("Giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// The innermost error, skipping the `Exhausted` wrapper.
    pub fn last_cause(&self) -> &FetchError {
        match self {
            FetchError::Exhausted { last, .. } => last.last_cause(),
            other => other,
        }
    }
}
