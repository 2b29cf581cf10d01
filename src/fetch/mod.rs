// src/fetch/mod.rs

pub mod client;
pub mod user_agents;

pub use client::HttpClient;
pub use user_agents::UserAgents;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Statuses worth another attempt.
pub const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// A GET against one of the published endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl SourceRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Full URL with the query string encoded.
    pub fn to_url(&self) -> Result<Url, FetchError> {
        let parsed = if self.params.is_empty() {
            Url::parse(&self.url)
        } else {
            Url::parse_with_params(&self.url, &self.params)
        };
        parsed.map_err(|e| FetchError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for SourceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_url() {
            Ok(u) => write!(f, "{}", u),
            Err(_) => write!(f, "{}", self.url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
}

/// Transport-level failure for one request, after retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{url}: timed out")]
    Timeout { url: String },

    #[error("{url}: {message}")]
    Transport { url: String, message: String },

    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url}: not found")]
    NotFound { url: String },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => RETRY_STATUSES.contains(status),
            FetchError::InvalidUrl { .. } | FetchError::NotFound { .. } => false,
        }
    }
}

/// Anything that can perform a [`SourceRequest`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &SourceRequest) -> Result<RawResponse, FetchError>;
}
