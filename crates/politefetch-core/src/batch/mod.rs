//! Batch orchestrator (§4.9): validate/dedupe, chunked worker-pool
//! processing with pause/resume/abort, and a compiled error report.

pub mod error_report;
pub mod types;
pub mod validate;

pub use error_report::ErrorReport;
pub use types::{BatchItem, BatchOutcome, BatchState, Duplicate, InvalidUrl, ItemOutcome, Stats};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::sleep;

use crate::circuit::CircuitState;
use crate::config::BatchConfig;
use crate::error::{BatchError, ClassifiedError, ErrorKind};
use crate::host::Registry;

/// Injected by the caller; must be safe to call concurrently up to
/// `concurrency` times (§6 "Processor function").
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, normalized_url: &str, item: &BatchItem) -> Result<serde_json::Value, ClassifiedError>;
}

/// Typed progress events, replacing the callback-based progress
/// reporting the source used (§9 "Coroutine control flow").
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Phase { name: &'static str, current_chunk: Option<usize>, total_chunks: Option<usize> },
    ItemCompleted { original_index: usize, succeeded: bool },
    CleanupBetweenChunks { chunk: usize },
    Paused,
    Resumed,
}

#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, event: ProgressEvent);
}

pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn emit(&self, _event: ProgressEvent) {}
}

struct Controls {
    paused: AtomicBool,
    aborted: AtomicBool,
    resume_notify: Notify,
}

impl Controls {
    fn new() -> Self {
        Self { paused: AtomicBool::new(false), aborted: AtomicBool::new(false), resume_notify: Notify::new() }
    }
}

pub struct BatchOrchestrator {
    config: BatchConfig,
    processor: Arc<dyn Processor>,
    progress: Arc<dyn ProgressSink>,
    controls: Arc<Controls>,
    host_registry: Option<Arc<Registry>>,
}

impl BatchOrchestrator {
    pub fn new(config: BatchConfig, processor: Arc<dyn Processor>) -> Self {
        Self {
            config,
            processor,
            progress: Arc::new(NullProgressSink),
            controls: Arc::new(Controls::new()),
            host_registry: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Enables `autoPauseOnCircuitOpen` monitoring (§4.9): while set, `run`
    /// polls host circuit state and pauses the batch whenever any known
    /// host's breaker is open, resuming once the longest reset window plus
    /// a 1s margin elapses.
    pub fn with_host_registry(mut self, registry: Arc<Registry>) -> Self {
        self.host_registry = Some(registry);
        self
    }

    pub fn pause(&self) {
        self.controls.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.controls.paused.store(false, Ordering::SeqCst);
        self.controls.resume_notify.notify_waiters();
    }

    pub fn stop(&self) {
        self.controls.aborted.store(true, Ordering::SeqCst);
        self.controls.resume_notify.notify_waiters();
    }

    pub fn reset(&self) {
        self.controls.paused.store(false, Ordering::SeqCst);
        self.controls.aborted.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.controls.paused.load(Ordering::SeqCst)
    }

    /// Spawns the `autoPauseOnCircuitOpen` poller if a host registry is
    /// attached and the feature is enabled; returns its handle so the
    /// caller can abort it once the batch finishes.
    fn spawn_circuit_monitor(&self) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.auto_pause_on_circuit_open {
            return None;
        }
        let registry = self.host_registry.clone()?;
        let controls = self.controls.clone();
        let progress = self.progress.clone();
        let interval = Duration::from_millis(self.config.circuit_monitoring_interval_ms);
        Some(tokio::spawn(async move {
            loop {
                sleep(interval).await;
                if controls.aborted.load(Ordering::SeqCst) {
                    return;
                }
                let hosts = registry.known_hosts().await;
                let mut longest_remaining_ms: Option<u64> = None;
                for host in &hosts {
                    let breaker = registry.get_circuit(host).await;
                    let (state, remaining_ms) = breaker.snapshot().await;
                    if state == CircuitState::Open {
                        longest_remaining_ms = Some(longest_remaining_ms.unwrap_or(0).max(remaining_ms.unwrap_or(0)));
                    }
                }
                if let Some(remaining_ms) = longest_remaining_ms {
                    if !controls.paused.load(Ordering::SeqCst) {
                        controls.paused.store(true, Ordering::SeqCst);
                        progress.emit(ProgressEvent::Paused).await;
                        let controls = controls.clone();
                        let progress = progress.clone();
                        tokio::spawn(async move {
                            sleep(Duration::from_millis(remaining_ms) + Duration::from_secs(1)).await;
                            if !controls.aborted.load(Ordering::SeqCst) {
                                controls.paused.store(false, Ordering::SeqCst);
                                controls.resume_notify.notify_waiters();
                                progress.emit(ProgressEvent::Resumed).await;
                            }
                        });
                    }
                }
            }
        }))
    }

    pub fn is_aborted(&self) -> bool {
        self.controls.aborted.load(Ordering::SeqCst)
    }

    /// Runs the full three-phase pipeline (§4.9). Rejects batches over
    /// `max_urls_per_batch` before Phase 1.
    pub async fn run(&self, urls: Vec<String>) -> Result<BatchOutcome, BatchError> {
        if urls.len() > self.config.max_urls_per_batch {
            return Err(BatchError::TooLarge { count: urls.len(), limit: self.config.max_urls_per_batch });
        }
        let start = Instant::now();

        self.progress.emit(ProgressEvent::Phase { name: "validating", current_chunk: None, total_chunks: None }).await;
        let validation = validate::validate_and_dedupe(&urls);

        if validation.items.is_empty() {
            let mut per_item_result = vec![None; urls.len()];
            populate_non_processed(&mut per_item_result, &validation.invalid_urls, &validation.duplicates);
            let duplicates = validation.duplicates.len();
            let invalid = validation.invalid_urls.len();
            return Ok(BatchOutcome {
                per_item_result,
                invalid_urls: validation.invalid_urls,
                duplicates: validation.duplicates,
                error_report: ErrorReport::default(),
                stats: Stats { total: urls.len(), duplicates, invalid, ..Default::default() },
                state: BatchState::Completed,
                retry_queue: Vec::new(),
            });
        }

        let mut initial_results = vec![None::<ItemOutcome>; urls.len()];
        populate_non_processed(&mut initial_results, &validation.invalid_urls, &validation.duplicates);
        let results = Arc::new(Mutex::new(initial_results));
        let retry_queue = Arc::new(Mutex::new(Vec::new()));
        let processing_times = Arc::new(Mutex::new(Vec::new()));

        let chunks: Vec<Vec<BatchItem>> = if validation.items.len() <= self.config.chunk_size
            || !self.config.enable_memory_optimization
        {
            vec![validation.items]
        } else {
            validation.items.chunks(self.config.chunk_size).map(<[BatchItem]>::to_vec).collect()
        };
        let total_chunks = chunks.len();

        let monitor_handle = self.spawn_circuit_monitor();

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            if self.controls.aborted.load(Ordering::SeqCst) {
                break;
            }
            self.progress
                .emit(ProgressEvent::Phase {
                    name: "processing",
                    current_chunk: Some(chunk_index + 1),
                    total_chunks: Some(total_chunks),
                })
                .await;
            self.run_chunk(chunk, &results, &retry_queue, &processing_times).await;
            if total_chunks > 1 && chunk_index + 1 < total_chunks {
                self.progress.emit(ProgressEvent::CleanupBetweenChunks { chunk: chunk_index + 1 }).await;
            }
        }

        if let Some(handle) = monitor_handle {
            handle.abort();
        }

        // All spawned workers have been awaited by this point, so these are
        // the last live references.
        let results = Arc::try_unwrap(results).expect("no outstanding worker handles").into_inner();
        let retry_queue = Arc::try_unwrap(retry_queue).expect("no outstanding worker handles").into_inner();
        let processing_times = Arc::try_unwrap(processing_times).expect("no outstanding worker handles").into_inner();

        let failures: Vec<(String, ClassifiedError)> = results
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| match outcome {
                Some(ItemOutcome::Failure(error)) => Some((urls[index].clone(), error.clone())),
                _ => None,
            })
            .collect();
        let error_report = error_report::compile(&failures, self.config.error_report_size);

        let succeeded = results.iter().filter(|r| matches!(r, Some(ItemOutcome::Success(_)))).count();
        let failed = failures.len();
        let (avg_processing_ms, p50_processing_ms, p95_processing_ms) = processing_percentiles(&processing_times);
        let duplicates_count = validation.duplicates.len();
        let invalid_count = validation.invalid_urls.len();

        let state = if self.controls.aborted.load(Ordering::SeqCst) { BatchState::Stopped } else { BatchState::Completed };

        Ok(BatchOutcome {
            per_item_result: results,
            invalid_urls: validation.invalid_urls,
            duplicates: validation.duplicates,
            error_report,
            stats: Stats {
                total: urls.len(),
                succeeded,
                failed,
                duplicates: duplicates_count,
                invalid: invalid_count,
                wall_time_ms: start.elapsed().as_millis() as u64,
                avg_processing_ms,
                p50_processing_ms,
                p95_processing_ms,
            },
            state,
            retry_queue,
        })
    }

    async fn run_chunk(
        &self,
        chunk: Vec<BatchItem>,
        results: &Arc<Mutex<Vec<Option<ItemOutcome>>>>,
        retry_queue: &Arc<Mutex<Vec<BatchItem>>>,
        processing_times: &Arc<Mutex<Vec<u64>>>,
    ) {
        let queue = Arc::new(Mutex::new(VecDeque::from(chunk)));
        let concurrency = self.config.concurrency.max(1);
        let mut handles = Vec::with_capacity(concurrency);

        for _ in 0..concurrency {
            let queue = queue.clone();
            let results = results.clone();
            let retry_queue = retry_queue.clone();
            let processing_times = processing_times.clone();
            let processor = self.processor.clone();
            let progress = self.progress.clone();
            let controls = self.controls.clone();
            let delay_ms = self.config.delay_ms;

            handles.push(tokio::spawn(async move {
                loop {
                    while controls.paused.load(Ordering::SeqCst) && !controls.aborted.load(Ordering::SeqCst) {
                        progress.emit(ProgressEvent::Paused).await;
                        sleep(Duration::from_millis(200)).await;
                    }
                    if controls.aborted.load(Ordering::SeqCst) {
                        return;
                    }
                    let item = { queue.lock().await.pop_front() };
                    let Some(item) = item else { return };

                    let attempt_start = Instant::now();
                    let outcome = processor.process(&item.normalized_url, &item).await;
                    let elapsed = attempt_start.elapsed().as_millis() as u64;
                    processing_times.lock().await.push(elapsed);

                    let succeeded = outcome.is_ok();
                    let item_outcome = match outcome {
                        Ok(value) => ItemOutcome::Success(value),
                        Err(error) => {
                            if error.kind == ErrorKind::CircuitOpen {
                                retry_queue.lock().await.push(item.clone());
                            }
                            ItemOutcome::Failure(error)
                        }
                    };
                    results.lock().await[item.original_index] = Some(item_outcome);
                    progress.emit(ProgressEvent::ItemCompleted { original_index: item.original_index, succeeded }).await;

                    let is_last = queue.lock().await.is_empty();
                    if !is_last && delay_ms > 0 {
                        sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Fills in the slots Phase 1 resolved without ever handing them to a
/// worker, so `per_item_result[i]` exists for every index (§8).
fn populate_non_processed(results: &mut [Option<ItemOutcome>], invalid: &[InvalidUrl], duplicates: &[Duplicate]) {
    for entry in invalid {
        results[entry.original_index] = Some(ItemOutcome::Invalid(entry.reason.clone()));
    }
    for entry in duplicates {
        results[entry.original_index] = Some(ItemOutcome::DuplicateOf(entry.first_occurrence_index));
    }
}

/// Returns `(avg, p50, p95)` processing time in milliseconds. `times` need
/// not be sorted; this sorts a local copy.
fn processing_percentiles(times: &[u64]) -> (f64, u64, u64) {
    if times.is_empty() {
        return (0.0, 0, 0);
    }
    let mut sorted = times.to_vec();
    sorted.sort_unstable();
    let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
    let percentile = |p: f64| -> u64 {
        let rank = ((sorted.len() - 1) as f64 * p).round() as usize;
        sorted[rank.min(sorted.len() - 1)]
    };
    (avg, percentile(0.50), percentile(0.95))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct AlwaysSucceeds;

    #[async_trait]
    impl Processor for AlwaysSucceeds {
        async fn process(&self, normalized_url: &str, _item: &BatchItem) -> Result<serde_json::Value, ClassifiedError> {
            Ok(serde_json::json!({ "url": normalized_url }))
        }
    }

    struct FailsOn404s;

    #[async_trait]
    impl Processor for FailsOn404s {
        async fn process(&self, normalized_url: &str, _item: &BatchItem) -> Result<serde_json::Value, ClassifiedError> {
            if normalized_url.contains("bad") {
                Err(ClassifiedError::new(ErrorKind::Client4xx, "not found"))
            } else {
                Ok(serde_json::json!({}))
            }
        }
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_success_with_no_processing() {
        let orchestrator = BatchOrchestrator::new(
            BatchConfig { concurrency: 2, delay_ms: 0, ..BatchConfig::default() },
            Arc::new(AlwaysSucceeds),
        );
        let outcome = orchestrator.run(vec![]).await.unwrap();
        assert_eq!(outcome.state, BatchState::Completed);
        assert!(outcome.per_item_result.is_empty());
    }

    #[tokio::test]
    async fn oversized_batch_fails_before_phase_1() {
        let orchestrator = BatchOrchestrator::new(
            BatchConfig { max_urls_per_batch: 2, ..BatchConfig::default() },
            Arc::new(AlwaysSucceeds),
        );
        let urls = vec!["https://a.example".to_string(); 3];
        let result = orchestrator.run(urls).await;
        assert!(matches!(result, Err(BatchError::TooLarge { .. })));
    }

    #[tokio::test]
    async fn preserves_original_order_and_result_length() {
        let orchestrator = BatchOrchestrator::new(
            BatchConfig { concurrency: 3, delay_ms: 0, ..BatchConfig::default() },
            Arc::new(AlwaysSucceeds),
        );
        let urls: Vec<String> = (0..20).map(|i| format!("https://example.com/{i}")).collect();
        let outcome = orchestrator.run(urls.clone()).await.unwrap();
        assert_eq!(outcome.per_item_result.len(), urls.len());
        for result in &outcome.per_item_result {
            assert!(matches!(result, Some(ItemOutcome::Success(_))));
        }
    }

    #[tokio::test]
    async fn failures_are_classified_and_counted() {
        let orchestrator = BatchOrchestrator::new(
            BatchConfig { concurrency: 2, delay_ms: 0, ..BatchConfig::default() },
            Arc::new(FailsOn404s),
        );
        let urls = vec![
            "https://example.com/good".to_string(),
            "https://example.com/bad".to_string(),
        ];
        let outcome = orchestrator.run(urls).await.unwrap();
        assert_eq!(outcome.stats.succeeded, 1);
        assert_eq!(outcome.stats.failed, 1);
        assert_eq!(outcome.error_report.total_errors, 1);
    }

    #[tokio::test]
    async fn stop_halts_further_chunks() {
        let orchestrator = Arc::new(BatchOrchestrator::new(
            BatchConfig { concurrency: 1, delay_ms: 0, chunk_size: 2, enable_memory_optimization: true, ..BatchConfig::default() },
            Arc::new(AlwaysSucceeds),
        ));
        orchestrator.stop();
        let urls: Vec<String> = (0..6).map(|i| format!("https://example.com/{i}")).collect();
        let outcome = orchestrator.run(urls).await.unwrap();
        assert_eq!(outcome.state, BatchState::Stopped);
    }

    #[tokio::test]
    async fn invalid_and_duplicate_indices_are_populated_in_per_item_result() {
        let orchestrator = BatchOrchestrator::new(
            BatchConfig { concurrency: 2, delay_ms: 0, ..BatchConfig::default() },
            Arc::new(AlwaysSucceeds),
        );
        let urls = vec![
            "https://example.com/a".to_string(),
            "not a url".to_string(),
            "https://example.com/a".to_string(),
        ];
        let outcome = orchestrator.run(urls).await.unwrap();
        assert!(matches!(outcome.per_item_result[0], Some(ItemOutcome::Success(_))));
        assert!(matches!(outcome.per_item_result[1], Some(ItemOutcome::Invalid(_))));
        assert!(matches!(outcome.per_item_result[2], Some(ItemOutcome::DuplicateOf(0))));
        assert_eq!(outcome.stats.duplicates, 1);
        assert_eq!(outcome.stats.invalid, 1);
    }

    #[test]
    fn processing_percentiles_reports_median_and_p95() {
        let times: Vec<u64> = (1..=100).collect();
        let (avg, p50, p95) = processing_percentiles(&times);
        assert_eq!(avg, 50.5);
        assert_eq!(p50, 51);
        assert_eq!(p95, 95);
    }

    #[test]
    fn processing_percentiles_of_empty_is_zero() {
        assert_eq!(processing_percentiles(&[]), (0.0, 0, 0));
    }
}
