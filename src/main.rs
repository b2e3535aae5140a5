//! CLI entry point for the dataset search tool.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dataset_search_core::{
    Credentials, KaggleClient, QueryInput, RateLimitedFetcher, SearchService,
    query::build_query_with_limit,
    server::{self, AppState, create_router},
};
use tracing::{debug, info};

mod app_config;
mod cli;

use app_config::{Settings, load_file_config};
use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = load_file_config(args.config.as_deref())?;
    let settings = Settings::resolve(file_config.as_ref(), &args.overrides())?;
    debug!(?settings, "settings resolved");

    let credentials = Credentials::discover().context("Failed to load marketplace credentials")?;
    let client =
        KaggleClient::with_base_url(&settings.marketplace_url, credentials, settings.timeouts)
            .context("Failed to create marketplace client")?;
    let fetcher = RateLimitedFetcher::new(
        Arc::new(client),
        settings.min_delay,
        settings.retry_policy.clone(),
    );
    let service = SearchService::new(Arc::new(fetcher), settings.search);

    match args.command {
        Command::Serve { .. } => {
            let state = AppState::new(service, settings.max_terms);
            let router = create_router(state, settings.max_upload_bytes);
            server::serve(settings.bind, router)
                .await
                .with_context(|| format!("Server error on {}", settings.bind))?;
        }
        Command::Search {
            keyword,
            sort,
            rank,
            tag,
            file_type,
            ..
        } => {
            let query = build_query_with_limit(QueryInput::Keyword(&keyword), settings.max_terms)
                .with_sort(sort)
                .with_tag(tag.as_deref())
                .with_file_type(file_type);
            if query.is_empty() {
                anyhow::bail!("Keyword cannot be empty");
            }

            let mut options = settings.search;
            options.rank = rank;
            let datasets = service.search_with(&query, options).await?;
            info!(count = datasets.len(), "search complete");

            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &datasets)?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}
