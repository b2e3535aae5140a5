//! Request and response bodies.

use serde::{Deserialize, Serialize};

use crate::records::MarketplaceRecord;

/// Query string of `GET /search-keyword`.
#[derive(Debug, Default, Deserialize)]
pub struct KeywordParams {
    /// Keyword, or comma-separated keywords.
    #[serde(default)]
    pub keyword: String,
    /// Marketplace sort order; see [`crate::query::SortBy`].
    pub sort: Option<String>,
    /// Pages per term, overriding the server default.
    pub pages: Option<u32>,
    /// Rank results by relevance.
    pub rank: Option<bool>,
    /// Only keep datasets carrying this tag.
    pub tag: Option<String>,
    /// Marketplace file-type filter; see [`crate::query::FileType`].
    pub file_type: Option<String>,
}

/// Response of `GET /search-keyword`.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub datasets: Vec<MarketplaceRecord>,
}

/// Response of `POST /search-files`.
#[derive(Debug, Serialize)]
pub struct FileSearchResponse {
    pub datasets: Vec<MarketplaceRecord>,
    pub message: String,
}

/// Body of `POST /download`.
#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default, alias = "descriptions")]
    pub references: Vec<String>,
}

/// Response of `POST /download`.
#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub count: usize,
    pub message: String,
}

/// Response of `GET /`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
