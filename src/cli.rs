//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use dataset_search_core::{FileType, SortBy};

use crate::app_config::CliOverrides;

/// Discover marketplace datasets by keyword or by the columns of your own files.
#[derive(Parser, Debug)]
#[command(name = "dataset-search")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/dataset-search/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Marketplace API base URL
    #[arg(long, global = true, value_name = "URL")]
    pub marketplace_url: Option<String>,

    /// Minimum delay between marketplace calls in milliseconds (max 60000)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub min_delay_ms: Option<u64>,

    /// Maximum retries for throttled or failed marketplace calls (0-10)
    #[arg(short = 'r', long, global = true, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server
    Serve {
        /// Listen address (default 127.0.0.1:8000)
        #[arg(short, long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Search once and print the results as JSON
    Search {
        /// Keyword, or comma-separated keywords (may be empty with --tag or --file-type)
        #[arg(default_value = "")]
        keyword: String,

        /// Only keep datasets carrying this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Only list datasets with files of this type (csv, json, sqlite, bigquery)
        #[arg(short, long)]
        file_type: Option<FileType>,

        /// Pages to fetch per term (1-20)
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=20))]
        pages: Option<u32>,

        /// Marketplace sort order (hottest, votes, updated, active, published)
        #[arg(short, long, default_value_t = SortBy::Hottest)]
        sort: SortBy,

        /// Rank results by relevance to the keywords
        #[arg(long)]
        rank: bool,
    },
}

impl Args {
    /// Values that take precedence over the config file.
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        let (bind, pages) = match &self.command {
            Command::Serve { bind } => (bind.clone(), None),
            Command::Search { pages, .. } => (None, *pages),
        };
        CliOverrides {
            marketplace_url: self.marketplace_url.clone(),
            bind,
            min_delay_ms: self.min_delay_ms,
            max_retries: self.max_retries,
            pages,
        }
    }
}
