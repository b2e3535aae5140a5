//! Application configuration: config file parsing and the merged runtime settings.

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dataset_search_core::fetch::{
    Backoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY,
    RetryPolicy,
};
use dataset_search_core::marketplace::{
    DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, HttpTimeouts,
};
use dataset_search_core::query::DEFAULT_MAX_TERMS;
use dataset_search_core::search::{DEFAULT_MAX_RESULTS, DEFAULT_PAGES, SearchOptions};
use dataset_search_core::server::{DEFAULT_BIND, DEFAULT_MAX_UPLOAD_BYTES};

const APP_DIR: &str = "dataset-search";

/// `key = value` file configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Marketplace API base URL.
    pub marketplace_url: Option<String>,
    /// HTTP listen address for `serve`.
    pub bind: Option<String>,
    /// Minimum spacing between marketplace calls in milliseconds.
    pub min_delay_ms: Option<u64>,
    /// First backoff step in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// Backoff ceiling in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// Upper bound of random jitter added to each backoff delay, in milliseconds.
    pub jitter_ms: Option<u64>,
    /// Retries after the first attempt.
    pub max_retries: Option<u32>,
    /// Pages fetched per term.
    pub pages: Option<u32>,
    /// Cap on terms derived from file headers.
    pub max_terms: Option<usize>,
    /// Cap on returned records.
    pub max_results: Option<usize>,
    /// Marketplace client connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Marketplace client read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Request body limit for uploads in bytes.
    pub max_upload_bytes: Option<usize>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.marketplace_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            bail!("Invalid config value for `marketplace_url`: '{url}'. Expected an http(s) URL");
        }
        if let Some(bind) = &self.bind
            && bind.parse::<SocketAddr>().is_err()
        {
            bail!("Invalid config value for `bind`: '{bind}'. Expected host:port");
        }

        validate_range("min_delay_ms", self.min_delay_ms, 0, 60_000)?;
        validate_range("base_delay_ms", self.base_delay_ms, 1, 60_000)?;
        validate_range("max_delay_ms", self.max_delay_ms, 1, 600_000)?;
        if let (Some(base), Some(max)) = (self.base_delay_ms, self.max_delay_ms)
            && max < base
        {
            bail!("Invalid config: `max_delay_ms` ({max}) must be >= `base_delay_ms` ({base})");
        }
        validate_range("jitter_ms", self.jitter_ms, 0, 10_000)?;
        validate_range("max_retries", self.max_retries.map(u64::from), 0, 10)?;
        validate_range("pages", self.pages.map(u64::from), 1, 20)?;
        validate_range("max_terms", self.max_terms.map(|v| v as u64), 1, 100)?;
        validate_range("max_results", self.max_results.map(|v| v as u64), 1, 10_000)?;
        validate_range("connect_timeout_secs", self.connect_timeout_secs, 1, 3600)?;
        validate_range("read_timeout_secs", self.read_timeout_secs, 1, 3600)?;
        validate_range(
            "max_upload_bytes",
            self.max_upload_bytes.map(|v| v as u64),
            1024,
            1024 * 1024 * 1024,
        )?;

        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/dataset-search/config.toml`
/// 2. `$HOME/.config/dataset-search/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist. The default path is optional.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return read_file_config(path).map(Some);
    }

    match resolve_default_config_path() {
        Some(path) if path.exists() => read_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "marketplace_url" => {
                cfg.marketplace_url = Some(parse_string_literal(value).with_context(context)?);
            }
            "bind" => cfg.bind = Some(parse_string_literal(value).with_context(context)?),
            "min_delay_ms" => cfg.min_delay_ms = Some(parse_integer(value).with_context(context)?),
            "base_delay_ms" => {
                cfg.base_delay_ms = Some(parse_integer(value).with_context(context)?);
            }
            "max_delay_ms" => cfg.max_delay_ms = Some(parse_integer(value).with_context(context)?),
            "jitter_ms" => cfg.jitter_ms = Some(parse_integer(value).with_context(context)?),
            "max_retries" => cfg.max_retries = Some(parse_integer(value).with_context(context)?),
            "pages" => cfg.pages = Some(parse_integer(value).with_context(context)?),
            "max_terms" => cfg.max_terms = Some(parse_integer(value).with_context(context)?),
            "max_results" => cfg.max_results = Some(parse_integer(value).with_context(context)?),
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer(value).with_context(context)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer(value).with_context(context)?);
            }
            "max_upload_bytes" => {
                cfg.max_upload_bytes = Some(parse_integer(value).with_context(context)?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer<T>(raw_value: &str) -> Result<T>
where
    T: TryFrom<u64>,
{
    let token = raw_value.trim().replace('_', "");
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    let value = u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range"))?;
    T::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range"))
}

/// Values the CLI can override.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub marketplace_url: Option<String>,
    pub bind: Option<String>,
    pub min_delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub pages: Option<u32>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub marketplace_url: String,
    pub bind: SocketAddr,
    pub min_delay: Duration,
    pub retry_policy: RetryPolicy,
    pub search: SearchOptions,
    pub max_terms: usize,
    pub timeouts: HttpTimeouts,
    pub max_upload_bytes: usize,
}

impl Settings {
    /// Merges defaults, then file values, then CLI overrides.
    pub fn resolve(file: Option<&FileConfig>, cli: &CliOverrides) -> Result<Self> {
        let file = file.cloned().unwrap_or_default();

        let bind_raw = cli
            .bind
            .clone()
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address '{bind_raw}'"))?;

        let base = file
            .base_delay_ms
            .map_or(DEFAULT_BASE_DELAY, Duration::from_millis);
        let max = file
            .max_delay_ms
            .map_or(DEFAULT_MAX_DELAY, Duration::from_millis);
        let max_retries = cli
            .max_retries
            .or(file.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let min_delay = cli
            .min_delay_ms
            .or(file.min_delay_ms)
            .map_or(DEFAULT_MIN_DELAY, Duration::from_millis);

        let timeouts = HttpTimeouts {
            connect: Duration::from_secs(
                file.connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            read: Duration::from_secs(file.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS)),
        };

        Ok(Self {
            marketplace_url: cli
                .marketplace_url
                .clone()
                .or(file.marketplace_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            bind,
            min_delay,
            retry_policy: RetryPolicy::new(max_retries, Backoff::new(base, max))
                .with_jitter(Duration::from_millis(file.jitter_ms.unwrap_or(0))),
            search: SearchOptions {
                pages: cli.pages.or(file.pages).unwrap_or(DEFAULT_PAGES),
                rank: false,
                max_results: file.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            },
            max_terms: file.max_terms.unwrap_or(DEFAULT_MAX_TERMS),
            timeouts,
            max_upload_bytes: file.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        })
    }
}
