//! Display-ready dataset records.
//!
//! [`normalize`] maps raw marketplace entries to [`MarketplaceRecord`]s and
//! removes repeated references, keeping the first occurrence.

mod relevance;

pub use relevance::{rank_by_relevance, relevance};

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::marketplace::{RawDataset, RawFile};

/// One file inside a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFile {
    pub name: String,
    pub size_bytes: Option<u64>,
}

impl From<RawFile> for DatasetFile {
    fn from(raw: RawFile) -> Self {
        Self {
            name: raw.name,
            size_bytes: raw.total_bytes,
        }
    }
}

/// A dataset as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceRecord {
    /// `owner/slug`; the identity used for de-duplication.
    pub reference: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub license: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
    pub files: Vec<DatasetFile>,
    pub total_bytes: Option<u64>,
    pub download_count: Option<u64>,
    pub vote_count: Option<u64>,
    pub usability_rating: Option<f64>,
    pub url: Option<String>,
}

impl From<RawDataset> for MarketplaceRecord {
    fn from(raw: RawDataset) -> Self {
        let tags = raw
            .tags
            .iter()
            .map(|tag| tag.name().trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            reference: raw.reference.trim().to_string(),
            title: raw.title.trim().to_string(),
            subtitle: raw.subtitle.filter(|s| !s.trim().is_empty()),
            license: raw.license_name.filter(|s| !s.trim().is_empty()),
            last_updated: raw.last_updated,
            tags,
            files: raw.files.into_iter().map(DatasetFile::from).collect(),
            total_bytes: raw.total_bytes,
            download_count: raw.download_count,
            vote_count: raw.vote_count,
            usability_rating: raw.usability_rating,
            url: raw.url,
        }
    }
}

/// Maps raw entries to records and drops repeated references.
///
/// Entries with an empty reference are dropped.
#[must_use]
pub fn normalize(raw: Vec<RawDataset>) -> Vec<MarketplaceRecord> {
    let received = raw.len();
    let records: Vec<MarketplaceRecord> = raw
        .into_iter()
        .map(MarketplaceRecord::from)
        .filter(|record| !record.reference.is_empty())
        .collect();
    let records = dedup_by_reference(records);
    debug!(received, kept = records.len(), "normalized marketplace records");
    records
}

/// Keeps the first record for each reference, preserving order.
#[must_use]
pub fn dedup_by_reference(records: Vec<MarketplaceRecord>) -> Vec<MarketplaceRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.reference.clone()))
        .collect()
}
