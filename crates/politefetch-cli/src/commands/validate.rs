//! Implementation of the `politefetch validate` command.
//!
//! Runs Phase 1 (validate/dedupe) against a URL list without touching
//! the network, and prints a summary to help catch malformed input or
//! tracking-parameter duplicates before a real run.

use std::path::PathBuf;

use clap::Args;
use politefetch_core::batch::validate::validate_and_dedupe;

/// Arguments for the `validate` subcommand.
#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// File containing one URL per line
    pub input: PathBuf,

    /// Emit the full report as JSON instead of plain text
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: ValidateArgs) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(&args.input)?;
    let urls: Vec<String> = contents.lines().map(str::to_string).filter(|l| !l.trim().is_empty()).collect();
    let outcome = validate_and_dedupe(&urls);

    if args.json {
        let report = serde_json::json!({
            "valid": outcome.items.len(),
            "duplicates": outcome.duplicates.len(),
            "invalid": outcome.invalid_urls.len(),
            "invalid_urls": outcome.invalid_urls.iter().map(|i| serde_json::json!({
                "index": i.original_index,
                "url": i.original_url,
                "reason": i.reason,
            })).collect::<Vec<_>>(),
            "duplicate_urls": outcome.duplicates.iter().map(|d| serde_json::json!({
                "index": d.original_index,
                "first_occurrence_index": d.first_occurrence_index,
                "url": d.normalized_url,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    eprintln!("{} valid, {} duplicate, {} invalid (of {} total)", outcome.items.len(), outcome.duplicates.len(), outcome.invalid_urls.len(), urls.len());
    for dup in &outcome.duplicates {
        eprintln!("  duplicate[{}]: {} (first seen at [{}])", dup.original_index, dup.normalized_url, dup.first_occurrence_index);
    }
    for invalid in &outcome.invalid_urls {
        eprintln!("  invalid[{}]: {} ({})", invalid.original_index, invalid.original_url, invalid.reason);
    }
    Ok(())
}
