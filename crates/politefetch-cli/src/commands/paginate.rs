//! Implementation of the `politefetch paginate` command.
//!
//! Discovers the pagination scheme of a listing page (numeric or
//! letter-indexed) and prints each discovered page URL.

use clap::Args;
use politefetch_core::metrics::new_correlation_id;
use politefetch_core::paginate::PaginationDiscoverer;
use politefetch_core::runtime::FetcherRuntime;

/// Arguments for the `paginate` subcommand.
#[derive(Debug, Args)]
pub struct PaginateArgs {
    /// The listing page to start from
    pub url: String,

    /// Maximum number of pages to walk
    #[arg(long, default_value = "50")]
    pub max_pages: u32,
}

pub async fn execute(args: PaginateArgs, config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let runtime = FetcherRuntime::init(config_path).map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
    let discoverer = PaginationDiscoverer::new(runtime.engine.as_ref());
    let correlation_id = new_correlation_id();

    let result = discoverer.discover(&args.url, &correlation_id, args.max_pages).await;

    eprintln!("mode: {:?}, {} pages found", result.mode, result.pages.len());
    for page in &result.pages {
        println!("{}", page.url);
    }
    for (url, kind) in &result.errors {
        eprintln!("  error: {url} ({kind})");
    }

    runtime.shutdown().await;
    Ok(())
}
