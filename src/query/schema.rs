//! Column header extraction from uploaded tabular files.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, instrument};

/// File extensions accepted for upload, lowercase without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "tsv", "json"];

/// The column headers of one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSchema {
    /// Name the file was uploaded under.
    pub filename: String,
    /// Header names in file order.
    pub columns: Vec<String>,
}

impl FileSchema {
    /// Creates a schema from a filename and its headers.
    #[must_use]
    pub fn new(filename: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            filename: filename.into(),
            columns,
        }
    }
}

/// Errors from validating or reading an uploaded file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// One or more files have an extension we cannot read.
    #[error("unsupported file type {extensions}: only .csv, .tsv and .json are accepted")]
    Unsupported {
        /// Offending filenames, in upload order.
        filenames: Vec<String>,
        /// Distinct offending extensions, formatted for display.
        extensions: String,
    },

    /// File content is not valid UTF-8.
    #[error("{filename} is not valid UTF-8 text")]
    Encoding {
        /// File name.
        filename: String,
    },

    /// File content could not be parsed.
    #[error("cannot read columns from {filename}: {reason}")]
    Malformed {
        /// File name.
        filename: String,
        /// Parser message.
        reason: String,
    },
}

impl SchemaError {
    /// Creates an unsupported-type error from the offending filenames.
    #[must_use]
    pub fn unsupported(filenames: Vec<String>) -> Self {
        let mut extensions: Vec<String> = Vec::new();
        for name in &filenames {
            let ext = extension_of(name).map_or_else(|| "(none)".to_string(), |e| format!(".{e}"));
            if !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        Self::Unsupported {
            filenames,
            extensions: extensions.join(", "),
        }
    }

    /// Creates a parse error for `filename`.
    pub fn malformed(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    /// Returns the rejected filenames for an unsupported-type error.
    #[must_use]
    pub fn unsupported_filenames(&self) -> Option<&[String]> {
        match self {
            Self::Unsupported { filenames, .. } => Some(filenames),
            _ => None,
        }
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Returns whether `filename` has a supported extension (case-insensitive).
#[must_use]
pub fn is_supported(filename: &str) -> bool {
    extension_of(filename).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Rejects the batch if any filename has an unsupported extension.
///
/// # Errors
///
/// Returns [`SchemaError::Unsupported`] listing every offending filename.
pub fn validate_filenames<'a, I>(filenames: I) -> Result<(), SchemaError>
where
    I: IntoIterator<Item = &'a str>,
{
    let rejected: Vec<String> = filenames
        .into_iter()
        .filter(|name| !is_supported(name))
        .map(str::to_string)
        .collect();

    if rejected.is_empty() {
        Ok(())
    } else {
        debug!(?rejected, "rejecting unsupported uploads");
        Err(SchemaError::unsupported(rejected))
    }
}

/// Reads the column headers of one uploaded file.
///
/// CSV and TSV files contribute their header row. JSON files contribute the
/// keys of the first object in a top-level array, or of a top-level object.
///
/// # Errors
///
/// - [`SchemaError::Unsupported`] for other extensions
/// - [`SchemaError::Encoding`] when the content is not UTF-8
/// - [`SchemaError::Malformed`] when the content cannot be parsed
#[instrument(skip(bytes), fields(size = bytes.len()))]
pub fn extract_schema(filename: &str, bytes: &[u8]) -> Result<FileSchema, SchemaError> {
    let ext = extension_of(filename).unwrap_or_default();
    let text = std::str::from_utf8(bytes).map_err(|_| SchemaError::Encoding {
        filename: filename.to_string(),
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let columns = match ext.as_str() {
        "csv" => delimited_headers(filename, text, b',')?,
        "tsv" => delimited_headers(filename, text, b'\t')?,
        "json" => json_keys(filename, text)?,
        _ => return Err(SchemaError::unsupported(vec![filename.to_string()])),
    };

    debug!(columns = columns.len(), "extracted file schema");
    Ok(FileSchema::new(filename, columns))
}

fn delimited_headers(
    filename: &str,
    text: &str,
    delimiter: u8,
) -> Result<Vec<String>, SchemaError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| SchemaError::malformed(filename, e.to_string()))?;
    Ok(headers.iter().map(str::to_string).collect())
}

fn json_keys(filename: &str, text: &str) -> Result<Vec<String>, SchemaError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| SchemaError::malformed(filename, e.to_string()))?;

    let object = match &value {
        serde_json::Value::Array(items) => items.iter().find_map(serde_json::Value::as_object),
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    };

    object
        .map(|map| map.keys().cloned().collect())
        .ok_or_else(|| {
            SchemaError::malformed(filename, "expected an object or an array of objects")
        })
}
