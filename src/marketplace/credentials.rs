//! Marketplace API credentials.
//!
//! Lookup order:
//! 1. `KAGGLE_USERNAME` + `KAGGLE_KEY` environment variables
//! 2. `$KAGGLE_CONFIG_DIR/kaggle.json`
//! 3. `$HOME/.kaggle/kaggle.json`
//!
//! A missing file is not an error; the client then calls the API
//! unauthenticated. A file that exists but cannot be parsed is.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::MarketplaceError;

const USERNAME_VAR: &str = "KAGGLE_USERNAME";
const KEY_VAR: &str = "KAGGLE_KEY";
const CONFIG_DIR_VAR: &str = "KAGGLE_CONFIG_DIR";
const CREDENTIALS_FILE: &str = "kaggle.json";

/// Username/key pair sent as HTTP basic auth.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Creates credentials from explicit values.
    #[must_use]
    pub fn new(username: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            key: key.into(),
        }
    }

    /// Loads credentials from the environment or the default credentials file.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Credentials`] when a credentials file exists
    /// but is unreadable or malformed.
    pub fn discover() -> Result<Option<Self>, MarketplaceError> {
        if let Some(credentials) = Self::from_env() {
            debug!("using marketplace credentials from environment");
            return Ok(Some(credentials));
        }

        let Some(path) = default_credentials_path() else {
            return Ok(None);
        };
        if !path.exists() {
            debug!(path = %path.display(), "no marketplace credentials file");
            return Ok(None);
        }
        Self::from_file(&path).map(Some)
    }

    /// Reads credentials from the environment, if both variables are set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let username = env_var_non_empty(USERNAME_VAR)?;
        let key = env_var_non_empty(KEY_VAR)?;
        Some(Self { username, key })
    }

    /// Reads a `kaggle.json` style credentials file.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Credentials`] on IO or JSON errors, or when
    /// either field is blank.
    pub fn from_file(path: &Path) -> Result<Self, MarketplaceError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| MarketplaceError::credentials(path, e.to_string()))?;
        let parsed: Self = serde_json::from_str(&raw)
            .map_err(|e| MarketplaceError::credentials(path, e.to_string()))?;
        if parsed.username.trim().is_empty() || parsed.key.trim().is_empty() {
            return Err(MarketplaceError::credentials(
                path,
                "username and key must be non-empty",
            ));
        }
        debug!(path = %path.display(), "loaded marketplace credentials file");
        Ok(parsed)
    }
}

/// Resolves the default credentials file path.
#[must_use]
pub fn default_credentials_path() -> Option<PathBuf> {
    if let Some(dir) = env_var_non_empty(CONFIG_DIR_VAR) {
        return Some(PathBuf::from(dir).join(CREDENTIALS_FILE));
    }
    let home = env::var_os("HOME").filter(|value| !value.is_empty())?;
    Some(PathBuf::from(home).join(".kaggle").join(CREDENTIALS_FILE))
}

fn env_var_non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_file_reads_username_and_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kaggle.json");
        fs::write(&path, r#"{"username": "ada", "key": "abc123"}"#).unwrap();

        let credentials = Credentials::from_file(&path).unwrap();
        assert_eq!(credentials, Credentials::new("ada", "abc123"));
    }

    #[test]
    fn test_from_file_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kaggle.json");
        fs::write(&path, "username=ada").unwrap();

        let err = Credentials::from_file(&path).unwrap_err();
        assert!(matches!(err, MarketplaceError::Credentials { .. }));
    }

    #[test]
    fn test_from_file_rejects_blank_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kaggle.json");
        fs::write(&path, r#"{"username": "ada", "key": "  "}"#).unwrap();

        let err = Credentials::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", Credentials::new("ada", "secret-key"));
        assert!(rendered.contains("ada"));
        assert!(!rendered.contains("secret-key"));
    }
}
