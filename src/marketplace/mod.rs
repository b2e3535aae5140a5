//! Access to the third-party dataset marketplace.
//!
//! - [`Marketplace`] - Async trait for one listing call (the seam tests mock)
//! - [`KaggleClient`] - Kaggle-compatible HTTP implementation
//! - [`Credentials`] - Basic-auth credentials discovery
//! - [`RawDataset`] - Wire shape of a listed dataset
//!
//! A `Marketplace` call is a single request with no retry. Wrap it in a
//! [`crate::fetch::RateLimitedFetcher`] for spacing and backoff.

mod client;
mod credentials;
mod error;
mod http_client;
mod types;

pub use client::{DEFAULT_BASE_URL, KaggleClient};
pub use credentials::{Credentials, default_credentials_path};
pub use error::MarketplaceError;
pub use http_client::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, HttpTimeouts,
    build_marketplace_http_client,
};
pub use types::{RawDataset, RawFile, RawTag, parse_timestamp};

use async_trait::async_trait;

use crate::query::{FileType, SortBy};

/// Parameters for one marketplace listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Free-text search term.
    pub term: String,
    /// 1-indexed page number.
    pub page: u32,
    /// Marketplace sort order.
    pub sort_by: SortBy,
    /// Restrict the listing to datasets with files of this type.
    pub file_type: Option<FileType>,
}

impl PageRequest {
    /// Creates a page request. Page 0 is treated as page 1.
    #[must_use]
    pub fn new(term: impl Into<String>, page: u32, sort_by: SortBy) -> Self {
        Self {
            term: term.into(),
            page: page.max(1),
            sort_by,
            file_type: None,
        }
    }

    /// Sets the file-type filter.
    #[must_use]
    pub fn with_file_type(mut self, file_type: Option<FileType>) -> Self {
        self.file_type = file_type;
        self
    }
}

/// One external dataset listing API.
#[async_trait]
pub trait Marketplace: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Lists one page of datasets matching `request`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError`] for network, status or decode failures.
    async fn list_datasets(&self, request: &PageRequest)
    -> Result<Vec<RawDataset>, MarketplaceError>;
}
