//! Implementation of the `politefetch fetch` command.
//!
//! Runs the full batch pipeline against a file of newline-delimited
//! URLs: validate/dedupe, then a worker pool that fetches each URL
//! (falling back to canonicalization on a 404), retrying per the
//! configured backoff policy, and writes an NDJSON job log plus a
//! JSON summary.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;
use console::Style;
use politefetch_core::batch::{BatchItem, BatchOrchestrator, Processor};
use politefetch_core::canonical::{Canonicalizer, RobotsCache};
use politefetch_core::error::{ClassifiedError, ErrorKind};
use politefetch_core::fetch::{FetchEngine, FetchOutcome, FetchRequest};
use politefetch_core::log::{EventType, JobLog, LogEvent, Summary};
use politefetch_core::metrics::new_correlation_id;
use politefetch_core::retry::{RetryBudget, RetryScheduler};
use politefetch_core::runtime::FetcherRuntime;

/// Arguments for the `fetch` subcommand.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// File containing one URL per line
    pub input: PathBuf,

    /// Directory to write the NDJSON job log and summary to
    #[arg(long, default_value = "./politefetch-logs")]
    pub log_dir: PathBuf,

    /// Identifier for this job; defaults to a generated correlation id
    #[arg(long)]
    pub job_id: Option<String>,

    /// Validate and dedupe only, skipping the network entirely
    #[arg(long)]
    pub dry_run: bool,

    /// Print a one-line progress snapshot after the run instead of silence
    #[arg(long)]
    pub snapshot: bool,
}

pub async fn execute(args: FetchArgs, config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let urls = read_urls(&args.input)?;
    tracing::info!(count = urls.len(), path = %args.input.display(), "loaded URL list");

    if args.dry_run {
        let outcome = politefetch_core::batch::validate::validate_and_dedupe(&urls);
        eprintln!(
            "validate-only: {} valid, {} duplicate, {} invalid",
            outcome.items.len(),
            outcome.duplicates.len(),
            outcome.invalid_urls.len()
        );
        for invalid in &outcome.invalid_urls {
            eprintln!("  invalid[{}]: {} ({})", invalid.original_index, invalid.original_url, invalid.reason);
        }
        return Ok(());
    }

    let runtime = FetcherRuntime::init(config_path).map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
    let job_id = args.job_id.clone().unwrap_or_else(new_correlation_id);
    let job_log = Arc::new(JobLog::open(&args.log_dir, job_id.clone(), 50 * 1024 * 1024)?);

    let processor: Arc<dyn Processor> = Arc::new(FetchProcessor {
        engine: runtime.engine.clone(),
        robots: RobotsCache::new(),
        retry_config: runtime.config.retry.clone(),
        job_log: job_log.clone(),
        job_id: job_id.clone(),
    });

    let orchestrator = Arc::new(
        BatchOrchestrator::new(runtime.config.batch.clone(), processor).with_host_registry(runtime.registry.clone()),
    );

    let shutdown_orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("shutdown signal received, stopping batch");
            shutdown_orchestrator.stop();
        }
    });

    let start = std::time::Instant::now();
    let batch_outcome = orchestrator.run(urls).await?;
    let duration_ms = start.elapsed().as_millis() as u64;

    let mut by_kind = std::collections::HashMap::new();
    for (kind, count) in &batch_outcome.error_report.by_kind {
        by_kind.insert(kind.to_string(), *count as u64);
    }
    let summary = Summary {
        job_id: job_id.clone(),
        total_requests: batch_outcome.stats.total as u64,
        successful_requests: batch_outcome.stats.succeeded as u64,
        failed_requests: batch_outcome.stats.failed as u64,
        by_kind,
        p50_ms: batch_outcome.stats.p50_processing_ms,
        p95_ms: batch_outcome.stats.p95_processing_ms,
        duration_ms,
    };
    job_log.write_summary(&summary)?;

    let bold = Style::new().bold();
    let dim = Style::new().dim();
    eprintln!(
        "{}",
        bold.apply_to(format!("job {job_id}: {} succeeded, {} failed ({} ms)", batch_outcome.stats.succeeded, batch_outcome.stats.failed, duration_ms))
    );
    eprintln!(
        "{}",
        dim.apply_to(format!("{} duplicate, {} invalid", batch_outcome.duplicates.len(), batch_outcome.invalid_urls.len()))
    );
    if args.snapshot {
        for rec in batch_outcome.error_report.recommendations.iter() {
            eprintln!("{}", dim.apply_to(format!("  recommendation: {rec}")));
        }
    }

    runtime.shutdown().await;
    Ok(())
}

fn read_urls(path: &std::path::Path) -> anyhow::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents.lines().map(str::to_string).filter(|line| !line.trim().is_empty()).collect())
}

struct FetchProcessor {
    engine: Arc<FetchEngine>,
    robots: RobotsCache,
    retry_config: politefetch_core::config::RetryConfig,
    job_log: Arc<JobLog>,
    job_id: String,
}

#[async_trait]
impl Processor for FetchProcessor {
    async fn process(&self, normalized_url: &str, item: &BatchItem) -> Result<serde_json::Value, ClassifiedError> {
        let correlation_id = new_correlation_id();
        let scheduler = RetryScheduler::new(self.engine.as_ref(), self.retry_config.clone());
        let budget = RetryBudget::new(self.retry_config.max_retries as u64);

        let request = FetchRequest::get(normalized_url, correlation_id.clone());
        let mut outcome = scheduler.execute(request, Some(&budget)).await;

        if let FetchOutcome::Network(e) = &outcome {
            if e.kind == ErrorKind::Client4xx && e.status == Some(404) {
                let canonicalizer = Canonicalizer::new(self.engine.as_ref(), &self.robots);
                let resolution = canonicalizer.resolve(normalized_url, &correlation_id).await;
                self.log_event(&correlation_id, EventType::Canonicalization, item, None, None, Some(resolution.success));
                if let Some(resolved_url) = resolution.resolved_url {
                    let request = FetchRequest::get(resolved_url, correlation_id.clone());
                    outcome = scheduler.execute(request, Some(&budget)).await;
                }
            }
        }

        match outcome {
            FetchOutcome::Success(success) => {
                self.log_event(&correlation_id, EventType::Response, item, Some(success.status), None, None);
                Ok(serde_json::json!({
                    "status": success.status,
                    "final_url": success.final_url,
                    "bytes": success.body.len(),
                }))
            }
            FetchOutcome::Network(e) => {
                self.log_event(&correlation_id, EventType::Error, item, e.status, Some(e.kind), None);
                Err(e)
            }
            FetchOutcome::Timeout => {
                let e = ClassifiedError::new(ErrorKind::Timeout, "request timed out");
                self.log_event(&correlation_id, EventType::Error, item, None, Some(e.kind), None);
                Err(e)
            }
            FetchOutcome::RateLimited { .. } => {
                let e = ClassifiedError::new(ErrorKind::RateLimited, "rate limited after retries exhausted");
                self.log_event(&correlation_id, EventType::Error, item, None, Some(e.kind), None);
                Err(e)
            }
            FetchOutcome::CircuitOpen { remaining_ms } => {
                let e = ClassifiedError::new(ErrorKind::CircuitOpen, format!("circuit open, retry in {remaining_ms}ms"));
                self.log_event(&correlation_id, EventType::Error, item, None, Some(e.kind), None);
                Err(e)
            }
            FetchOutcome::Validation(msg) => Err(ClassifiedError::new(ErrorKind::Validation, msg)),
            FetchOutcome::Parse(msg) => Err(ClassifiedError::new(ErrorKind::Parse, msg)),
        }
    }
}

impl FetchProcessor {
    fn log_event(
        &self,
        correlation_id: &str,
        event_type: EventType,
        item: &BatchItem,
        status: Option<u16>,
        error_kind: Option<ErrorKind>,
        success: Option<bool>,
    ) {
        let mut event = LogEvent::new(self.job_id.clone(), correlation_id, event_type);
        event.url = Some(item.normalized_url.clone());
        event.error_kind = error_kind;
        event.message = status.map(|s| format!("status {s}")).or(success.map(|s| format!("canonicalization success={s}")));
        let _ = self.job_log.write_event(&event);
    }
}
