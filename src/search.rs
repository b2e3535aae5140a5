//! Search orchestration: query terms → paged fetches → records.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::fetch::{FetchError, RateLimitedFetcher};
use crate::marketplace::PageRequest;
use crate::query::SearchQuery;
use crate::records::{MarketplaceRecord, normalize, rank_by_relevance};

/// Default number of pages fetched per term.
pub const DEFAULT_PAGES: u32 = 1;

/// Default cap on returned records.
pub const DEFAULT_MAX_RESULTS: usize = 500;

/// Per-search knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Pages to fetch per term, starting at the query's page.
    pub pages: u32,
    /// Sort the merged list by relevance to the terms.
    pub rank: bool,
    /// Maximum number of records returned.
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            pages: DEFAULT_PAGES,
            rank: false,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// Runs searches through one shared fetcher.
#[derive(Debug, Clone)]
pub struct SearchService {
    fetcher: Arc<RateLimitedFetcher>,
    defaults: SearchOptions,
}

impl SearchService {
    /// Creates a service with the given default options.
    #[must_use]
    pub fn new(fetcher: Arc<RateLimitedFetcher>, defaults: SearchOptions) -> Self {
        Self { fetcher, defaults }
    }

    /// Returns the default options.
    #[must_use]
    pub fn defaults(&self) -> SearchOptions {
        self.defaults
    }

    /// Searches with the default options.
    ///
    /// # Errors
    ///
    /// Returns the first terminal [`FetchError`].
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<MarketplaceRecord>, FetchError> {
        self.search_with(query, self.defaults).await
    }

    /// Fetches every term's pages in order, then normalizes, filters, ranks
    /// and caps.
    ///
    /// Paging for a term stops at its first empty page. A query's file type
    /// goes to the marketplace with every call; its tag filter is applied to
    /// the merged records. An empty query returns an empty list without
    /// calling the marketplace.
    ///
    /// # Errors
    ///
    /// Returns the first terminal [`FetchError`]; the search is abandoned.
    #[instrument(skip(self, query), fields(terms = query.terms.len(), pages = options.pages))]
    pub async fn search_with(
        &self,
        query: &SearchQuery,
        options: SearchOptions,
    ) -> Result<Vec<MarketplaceRecord>, FetchError> {
        if query.is_empty() {
            debug!("empty query, skipping marketplace");
            return Ok(Vec::new());
        }

        let first_page = query.page.max(1);
        let last_page = first_page.saturating_add(options.pages.max(1) - 1);
        let mut raw = Vec::new();

        for term in &query.marketplace_terms() {
            for page in first_page..=last_page {
                let request = PageRequest::new(term.as_str(), page, query.sort_by)
                    .with_file_type(query.file_type);
                let batch = self.fetcher.fetch(&request).await?;
                debug!(term = %term, page, count = batch.len(), "fetched page");
                if batch.is_empty() {
                    break;
                }
                raw.extend(batch);
            }
        }

        let fetched = raw.len();
        let mut records = normalize(raw);
        if query.tag.is_some() {
            records.retain(|record| query.accepts_tags(record.tags.iter().map(String::as_str)));
        }
        if options.rank {
            rank_by_relevance(&mut records, &query.terms);
        }
        records.truncate(options.max_results);

        info!(fetched, returned = records.len(), "search complete");
        Ok(records)
    }
}
