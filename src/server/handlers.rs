//! Endpoint handlers.

use axum::{
    Json,
    extract::{
        Multipart, Query, State,
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use tracing::{Span, debug, info, instrument, warn};

use super::dto::{
    DownloadRequest, DownloadResponse, FileSearchResponse, HealthResponse, KeywordParams,
    SearchResponse,
};
use super::error::ApiError;
use super::state::AppState;
use crate::query::{
    FileSchema, FileType, QueryInput, SortBy, build_query_with_limit, extract_schema,
    validate_filenames,
};

/// Multipart field carrying uploaded files.
const FILES_FIELD: &str = "files";

/// Health check. Returns the server status and version.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Keyword search, optionally narrowed by tag and file type.
///
/// A tag or file type alone is enough to search; with neither, the keyword
/// must not be blank.
#[instrument(skip_all, fields(keyword = tracing::field::Empty))]
pub async fn search_keyword(
    State(state): State<AppState>,
    params: Result<Query<KeywordParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(params) = params?;
    Span::current().record("keyword", params.keyword.as_str());

    let sort_by = match params.sort.as_deref() {
        Some(raw) => raw
            .parse::<SortBy>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => SortBy::default(),
    };
    let file_type = params
        .file_type
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(str::parse::<FileType>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let query = build_query_with_limit(QueryInput::Keyword(&params.keyword), state.max_terms)
        .with_sort(sort_by)
        .with_tag(params.tag.as_deref())
        .with_file_type(file_type);
    if query.is_empty() {
        return Err(ApiError::BadRequest("Keyword cannot be empty".to_string()));
    }

    let mut options = state.search_service.defaults();
    if let Some(pages) = params.pages {
        if !(1..=20).contains(&pages) {
            return Err(ApiError::BadRequest(format!(
                "pages must be between 1 and 20, got {pages}"
            )));
        }
        options.pages = pages;
    }
    if let Some(rank) = params.rank {
        options.rank = rank;
    }

    let datasets = state.search_service.search_with(&query, options).await?;
    info!(count = datasets.len(), "keyword search served");
    Ok(Json(SearchResponse { datasets }))
}

/// Search by the column headers of uploaded files.
///
/// Every upload's extension is checked before any file is parsed or the
/// marketplace is called.
#[instrument(skip_all)]
pub async fn search_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileSearchResponse>, ApiError> {
    let mut uploads: Vec<(String, axum::body::Bytes)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILES_FIELD) {
            debug!(field = ?field.name(), "ignoring multipart field");
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        debug!(%filename, size = bytes.len(), "received upload");
        uploads.push((filename, bytes));
    }

    if uploads.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".to_string()));
    }

    validate_filenames(uploads.iter().map(|(name, _)| name.as_str()))?;

    let schemas = uploads
        .iter()
        .map(|(name, bytes)| extract_schema(name, bytes))
        .collect::<Result<Vec<FileSchema>, _>>()?;

    let query = build_query_with_limit(QueryInput::Files(&schemas), state.max_terms);
    if query.is_empty() {
        return Err(ApiError::BadRequest(
            "Uploaded files contain no column headers".to_string(),
        ));
    }

    let datasets = state.search_service.search(&query).await?;
    let message = format!(
        "Found {} dataset(s) matching {} column(s) from {} file(s)",
        datasets.len(),
        query.terms.len(),
        schemas.len()
    );
    info!(count = datasets.len(), files = schemas.len(), "file search served");
    Ok(Json(FileSearchResponse { datasets, message }))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge(err.body_text());
    }
    warn!(error = %err, "malformed multipart upload");
    ApiError::BadRequest(err.body_text())
}

/// Placeholder: acknowledges the selection without transferring anything.
pub async fn download(
    request: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let Json(request) = request?;
    let count = request.references.len();
    if count == 0 {
        return Err(ApiError::BadRequest(
            "No datasets selected for download".to_string(),
        ));
    }
    info!(count, "download requested");
    Ok(Json(DownloadResponse {
        count,
        message: format!("Download initiated for {count} dataset(s)"),
    }))
}
