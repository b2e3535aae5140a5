//! Turning user input into marketplace search terms.
//!
//! Input is either a keyword string or the column headers of uploaded files
//! (see [`schema`]). Both become a [`SearchQuery`], optionally narrowed by a
//! tag and a marketplace file type. Nothing here touches the network.

pub mod schema;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use schema::{
    FileSchema, SUPPORTED_EXTENSIONS, SchemaError, extract_schema, is_supported,
    validate_filenames,
};

/// Default cap on terms derived from file headers.
pub const DEFAULT_MAX_TERMS: usize = 10;

/// Runs of separators and whitespace inside a column header.
#[allow(clippy::expect_used)]
static HEADER_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| {
    // Static pattern, safe to panic
    Regex::new(r"[_\-.\s]+").expect("header separator regex is valid")
});

/// Marketplace result ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Hottest,
    Votes,
    Updated,
    Active,
    Published,
}

impl SortBy {
    /// Returns the marketplace `sortBy` value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hottest => "hottest",
            Self::Votes => "votes",
            Self::Updated => "updated",
            Self::Active => "active",
            Self::Published => "published",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized sort order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort order '{0}' (expected hottest, votes, updated, active or published)")]
pub struct ParseSortByError(String);

impl FromStr for SortBy {
    type Err = ParseSortByError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hottest" => Ok(Self::Hottest),
            "votes" => Ok(Self::Votes),
            "updated" => Ok(Self::Updated),
            "active" => Ok(Self::Active),
            "published" => Ok(Self::Published),
            _ => Err(ParseSortByError(s.to_string())),
        }
    }
}

/// Marketplace file-type filter (`fileType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Csv,
    Json,
    Sqlite,
    #[serde(rename = "bigQuery")]
    BigQuery,
}

impl FileType {
    /// Returns the marketplace `fileType` value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Sqlite => "sqlite",
            Self::BigQuery => "bigQuery",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized file type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown file type '{0}' (expected csv, json, sqlite or bigquery)")]
pub struct ParseFileTypeError(String);

impl FromStr for FileType {
    type Err = ParseFileTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            "bigquery" => Ok(Self::BigQuery),
            _ => Err(ParseFileTypeError(s.to_string())),
        }
    }
}

/// A marketplace search: one listing call sequence per term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Search terms, in the order they will be queried.
    pub terms: Vec<String>,
    /// First page to fetch (1-indexed).
    pub page: u32,
    /// Result ordering.
    pub sort_by: SortBy,
    /// Only keep datasets carrying this tag (case-insensitive).
    pub tag: Option<String>,
    /// Only list datasets offering files of this type.
    pub file_type: Option<FileType>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            terms: Vec::new(),
            page: 1,
            sort_by: SortBy::default(),
            tag: None,
            file_type: None,
        }
    }
}

impl SearchQuery {
    /// Returns whether there is nothing to search for.
    ///
    /// A query without terms is still searchable when it carries a tag or a
    /// file type.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.tag.is_none() && self.file_type.is_none()
    }

    /// Terms sent to the marketplace, one listing sequence each.
    ///
    /// Without explicit terms a tag becomes `tag:<tag>`, and a bare file-type
    /// filter lists with an empty search string.
    #[must_use]
    pub fn marketplace_terms(&self) -> Vec<String> {
        if !self.terms.is_empty() {
            return self.terms.clone();
        }
        match (&self.tag, self.file_type) {
            (Some(tag), _) => vec![format!("tag:{tag}")],
            (None, Some(_)) => vec![String::new()],
            (None, None) => Vec::new(),
        }
    }

    /// Returns whether a record's tags satisfy the tag filter.
    #[must_use]
    pub fn accepts_tags<'a>(&self, mut tags: impl Iterator<Item = &'a str>) -> bool {
        match &self.tag {
            Some(wanted) => tags.any(|tag| tag.eq_ignore_ascii_case(wanted)),
            None => true,
        }
    }

    /// Sets the tag filter. Blank tags clear it.
    #[must_use]
    pub fn with_tag(mut self, tag: Option<&str>) -> Self {
        self.tag = tag
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty());
        self
    }

    /// Sets the file-type filter.
    #[must_use]
    pub fn with_file_type(mut self, file_type: Option<FileType>) -> Self {
        self.file_type = file_type;
        self
    }

    /// Sets the result ordering.
    #[must_use]
    pub fn with_sort(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    /// Sets the first page. Page 0 is treated as page 1.
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }
}

/// What the user gave us to search with.
#[derive(Debug, Clone, Copy)]
pub enum QueryInput<'a> {
    /// A keyword string, possibly comma-separated.
    Keyword(&'a str),
    /// Headers of uploaded files.
    Files(&'a [FileSchema]),
}

/// Builds a query with the default term cap.
#[must_use]
pub fn build_query(input: QueryInput<'_>) -> SearchQuery {
    build_query_with_limit(input, DEFAULT_MAX_TERMS)
}

/// Builds a query, keeping at most `max_terms` file-derived terms.
///
/// Keyword input is trimmed and split on commas. File input contributes
/// every normalized column header, de-duplicated case-insensitively in
/// first-seen order.
#[must_use]
pub fn build_query_with_limit(input: QueryInput<'_>, max_terms: usize) -> SearchQuery {
    let terms = match input {
        QueryInput::Keyword(keyword) => keyword_terms(keyword),
        QueryInput::Files(schemas) => header_terms(schemas, max_terms),
    };
    debug!(?terms, "built search query");
    SearchQuery {
        terms,
        ..SearchQuery::default()
    }
}

fn keyword_terms(keyword: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    keyword
        .split(',')
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|term| !term.is_empty())
        .filter(|term| seen.insert(term.to_lowercase()))
        .collect()
}

fn header_terms(schemas: &[FileSchema], max_terms: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    schemas
        .iter()
        .flat_map(|schema| schema.columns.iter())
        .map(|header| normalize_header(header))
        .filter(|term| !term.is_empty())
        .filter(|term| seen.insert(term.to_lowercase()))
        .take(max_terms)
        .collect()
}

/// Turns a column header into a search term.
///
/// `customer_id` and `Customer-ID` both become `customer id` / `Customer ID`;
/// separators `_`, `-`, `.` and whitespace runs collapse to one space.
#[must_use]
pub fn normalize_header(header: &str) -> String {
    HEADER_SEPARATORS
        .replace_all(header.trim(), " ")
        .trim()
        .to_string()
}
