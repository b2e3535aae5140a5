//! Wire types for the marketplace `/datasets/list` response.
//!
//! Decoding is lenient: any field the marketplace omits or sends as `null`
//! falls back to a default, and timestamps that do not parse become `None`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// One dataset entry as returned by the marketplace.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawDataset {
    /// `owner/slug` identifier, unique within the marketplace.
    #[serde(rename = "ref", deserialize_with = "null_as_default")]
    pub reference: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    pub subtitle: Option<String>,
    pub url: Option<String>,
    pub license_name: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<RawTag>,
    #[serde(deserialize_with = "null_as_default")]
    pub files: Vec<RawFile>,
    pub total_bytes: Option<u64>,
    pub download_count: Option<u64>,
    pub vote_count: Option<u64>,
    pub usability_rating: Option<f64>,
}

/// Tags arrive either as category objects or as bare strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTag {
    Named { name: String },
    Plain(String),
}

impl RawTag {
    /// Returns the tag label.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Named { name } | Self::Plain(name) => name,
        }
    }
}

/// A file listed under a dataset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFile {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(alias = "size")]
    pub total_bytes: Option<u64>,
}

/// Parses marketplace timestamps.
///
/// Accepts RFC 3339 (`2024-03-01T10:00:00Z`) and the zone-less form
/// (`2024-03-01T10:00:00.123`), which is taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}
