//! Errors from the forum API client.

use thiserror::Error;

/// Failure talking to the upstream API. The collector surfaces all of these as a retrieval error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to create HTTP client: {source}")]
    ClientBuild { source: reqwest::Error },

    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },

    #[error("Unexpected response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },

    #[error("Unexpected response shape: {reason}")]
    UnexpectedShape { reason: String },
}
