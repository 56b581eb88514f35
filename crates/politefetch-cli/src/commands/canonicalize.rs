//! Implementation of the `politefetch canonicalize` command.
//!
//! Resolves a single URL's canonical form by probing the ordered
//! variant sequence, printing each attempt as it happens.

use clap::Args;
use politefetch_core::canonical::{Canonicalizer, RobotsCache};
use politefetch_core::metrics::new_correlation_id;
use politefetch_core::runtime::FetcherRuntime;

/// Arguments for the `canonicalize` subcommand.
#[derive(Debug, Args)]
pub struct CanonicalizeArgs {
    /// The URL to resolve
    pub url: String,
}

pub async fn execute(args: CanonicalizeArgs, config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let runtime = FetcherRuntime::init(config_path).map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
    let robots = RobotsCache::new();
    let canonicalizer = Canonicalizer::new(runtime.engine.as_ref(), &robots);
    let correlation_id = new_correlation_id();

    let result = canonicalizer.resolve(&args.url, &correlation_id).await;

    for attempt in &result.attempts {
        eprintln!(
            "  [{}] {} -> {}",
            attempt.variant.rank,
            attempt.variant.url,
            attempt.status.map(|s| s.to_string()).unwrap_or_else(|| attempt.error_kind.map(|k| k.to_string()).unwrap_or_else(|| "?".to_string())),
        );
    }

    match result.resolved_url {
        Some(url) => println!("{url}"),
        None => {
            eprintln!("no working variant found ({:?})", result.error_kind);
            std::process::exit(1);
        }
    }

    runtime.shutdown().await;
    Ok(())
}
