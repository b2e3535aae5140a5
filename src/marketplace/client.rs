//! Kaggle-compatible marketplace client.
//!
//! Issues exactly one `GET {base}/datasets/list` request per call. Spacing,
//! retries and backoff live in [`crate::fetch`], not here.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use tracing::{debug, instrument, warn};
use url::Url;

use super::credentials::Credentials;
use super::http_client::{HttpTimeouts, build_marketplace_http_client};
use super::types::RawDataset;
use super::{Marketplace, MarketplaceError, PageRequest};

/// Default marketplace API base URL.
pub const DEFAULT_BASE_URL: &str = "https://www.kaggle.com/api/v1";

/// Client for the marketplace dataset listing API.
pub struct KaggleClient {
    client: Client,
    base_url: Url,
    credentials: Option<Credentials>,
}

impl KaggleClient {
    /// Creates a client against the public marketplace API.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError`] if HTTP client construction fails.
    pub fn new(credentials: Option<Credentials>) -> Result<Self, MarketplaceError> {
        Self::with_base_url(DEFAULT_BASE_URL, credentials, HttpTimeouts::default())
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::InvalidUrl`] if `base_url` is not an
    /// absolute http(s) URL, or [`MarketplaceError::ClientBuild`] if the HTTP
    /// client cannot be built.
    #[instrument(skip(credentials), fields(authenticated = credentials.is_some()))]
    pub fn with_base_url(
        base_url: &str,
        credentials: Option<Credentials>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, MarketplaceError> {
        let parsed = parse_base_url(base_url)?;
        if credentials.is_none() {
            warn!("no marketplace credentials found; requests will be unauthenticated");
        }
        let client = build_marketplace_http_client(timeouts)?;
        Ok(Self {
            client,
            base_url: parsed,
            credentials,
        })
    }

    /// Builds the listing URL for one page of one term.
    #[must_use]
    pub fn list_url(&self, request: &PageRequest) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["datasets", "list"]);
        }
        url.query_pairs_mut()
            .append_pair("search", &request.term)
            .append_pair("sortBy", request.sort_by.as_str())
            .append_pair("page", &request.page.to_string());
        if let Some(file_type) = request.file_type {
            url.query_pairs_mut().append_pair("fileType", file_type.as_str());
        }
        url
    }
}

impl std::fmt::Debug for KaggleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KaggleClient")
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

fn parse_base_url(raw: &str) -> Result<Url, MarketplaceError> {
    let url = Url::parse(raw.trim()).map_err(|_| MarketplaceError::invalid_url(raw))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(MarketplaceError::invalid_url(raw));
    }
    Ok(url)
}

#[async_trait]
impl Marketplace for KaggleClient {
    fn name(&self) -> &'static str {
        "kaggle"
    }

    #[instrument(skip(self), fields(term = %request.term, page = request.page))]
    async fn list_datasets(
        &self,
        request: &PageRequest,
    ) -> Result<Vec<RawDataset>, MarketplaceError> {
        let url = self.list_url(request);
        debug!(api_url = %url, "calling marketplace list API");

        let mut builder = self.client.get(url.clone());
        if let Some(credentials) = &self.credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| MarketplaceError::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            debug!(status = status.as_u16(), ?retry_after, "marketplace returned error status");
            return Err(MarketplaceError::http_status_with_retry_after(
                url.as_str(),
                status.as_u16(),
                retry_after,
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| MarketplaceError::network(url.as_str(), e))?;

        let datasets: Vec<RawDataset> = serde_json::from_slice(&body).map_err(|e| {
            warn!(error = %e, "failed to parse marketplace response JSON");
            MarketplaceError::decode(url.as_str(), e.to_string())
        })?;

        debug!(count = datasets.len(), "marketplace page decoded");
        Ok(datasets)
    }
}
