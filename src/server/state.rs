use std::sync::Arc;

use crate::search::SearchService;

/// Shared application state for all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Search service; owns the one rate-limited fetcher.
    pub search_service: Arc<SearchService>,

    /// Cap on terms derived from uploaded file headers.
    pub max_terms: usize,
}

impl AppState {
    /// Creates application state around a search service.
    #[must_use]
    pub fn new(search_service: SearchService, max_terms: usize) -> Self {
        Self {
            search_service: Arc::new(search_service),
            max_terms,
        }
    }
}
