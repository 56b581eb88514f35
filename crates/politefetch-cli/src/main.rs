/// Polite fetch CLI - batch URL fetching front-end.
///
/// Entry point for the `politefetch` binary. Parses CLI arguments,
/// initializes logging, and dispatches to subcommand handlers.
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Polite HTTP fetching core CLI
#[derive(Parser)]
#[command(name = "politefetch")]
#[command(version)]
#[command(about = "Batch-fetch URLs while respecting per-host politeness")]
#[command(after_help = "\
Quick start:
  1. politefetch validate urls.txt   — check and dedupe a URL list
  2. politefetch fetch urls.txt      — run the batch job
  3. politefetch canonicalize <url>  — resolve a single URL's canonical form
  4. politefetch paginate <url>      — discover a listing page's pagination")]
struct Cli {
    /// Path to config.toml
    #[arg(short = 'c', long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Validate and dedupe a URL list without fetching anything
    Validate(commands::validate::ValidateArgs),
    /// Run the batch fetch job
    Fetch(commands::fetch::FetchArgs),
    /// Resolve a single URL's canonical form
    Canonicalize(commands::canonicalize::CanonicalizeArgs),
    /// Discover a listing page's pagination
    Paginate(commands::paginate::PaginateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose/--quiet flags > default (warn).
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("politefetch=debug,politefetch_core=debug,info")
    } else if cli.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new("politefetch=info,politefetch_core=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .compact()
        .init();

    let config_path = cli.config.as_deref().map(std::path::Path::new);

    match cli.command {
        Commands::Validate(args) => commands::validate::execute(args).await,
        Commands::Fetch(args) => commands::fetch::execute(args, config_path).await,
        Commands::Canonicalize(args) => commands::canonicalize::execute(args, config_path).await,
        Commands::Paginate(args) => commands::paginate::execute(args, config_path).await,
    }
}
