//! Dataset Search Core Library
//!
//! Finds datasets on a third-party marketplace from a keyword or from the
//! column headers of the user's own tabular files.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`marketplace`] - Marketplace API client and wire types
//! - [`fetch`] - Rate-limited, retrying access to the marketplace
//! - [`query`] - Keyword and file-header input to search terms
//! - [`records`] - Normalization, de-duplication and relevance ranking
//! - [`search`] - Orchestrates a full search
//! - [`server`] - axum HTTP endpoints

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fetch;
pub mod marketplace;
pub mod query;
pub mod records;
pub mod search;
pub mod server;
mod user_agent;

// Re-export commonly used types
pub use fetch::{
    Backoff, DEFAULT_MAX_RETRIES, FailureType, FetchError, RateLimitedFetcher, RateLimiter,
    RetryDecision, RetryPolicy, classify_error,
};
pub use marketplace::{Credentials, KaggleClient, Marketplace, MarketplaceError, PageRequest};
pub use query::{
    FileSchema, FileType, QueryInput, SearchQuery, SortBy, build_query, extract_schema,
};
pub use records::{MarketplaceRecord, dedup_by_reference, normalize};
pub use search::{SearchOptions, SearchService};
pub use server::{AppState, create_router};
