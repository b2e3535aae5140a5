//! Error types for marketplace API calls.
//!
//! One variant per way a single request can fail. Retry decisions are made
//! by the fetcher from these variants, see [`crate::fetch::classify_error`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors from a single marketplace request or client setup.
#[derive(Debug, Error)]
pub enum MarketplaceError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error calling {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout calling {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP status from the marketplace.
    #[error("marketplace returned HTTP {status} for {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// Response body was not the expected JSON shape.
    #[error("unexpected marketplace response from {url}: {reason}")]
    Decode {
        /// The URL whose response could not be decoded.
        url: String,
        /// Decoder message.
        reason: String,
    },

    /// The configured base URL is malformed.
    #[error("invalid marketplace URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Credentials file exists but could not be read or parsed.
    #[error("cannot load marketplace credentials from {path}: {reason}")]
    Credentials {
        /// Credentials file path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("HTTP client construction failed: {reason}")]
    ClientBuild {
        /// Builder failure message.
        reason: String,
    },
}

impl MarketplaceError {
    /// Creates a network error from a reqwest error, mapping timeouts to [`Self::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            return Self::Timeout { url };
        }
        Self::Network { url, source }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a credentials loading error.
    pub fn credentials(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Credentials {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns the HTTP status code if this is a status error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// No From<reqwest::Error>: every variant needs the URL, which the source error
// does not reliably carry. Use the constructors above.
