//! Shared batch data types (§3 "Batch item", "Batch outcome").

use crate::error::ClassifiedError;

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub original_url: String,
    pub normalized_url: String,
    pub original_index: usize,
}

#[derive(Debug, Clone)]
pub struct InvalidUrl {
    pub original_index: usize,
    pub original_url: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Duplicate {
    pub original_index: usize,
    pub first_occurrence_index: usize,
    pub normalized_url: String,
}

#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Success(serde_json::Value),
    Failure(ClassifiedError),
    /// Rejected in Phase 1 and never handed to a worker; carries the reason.
    Invalid(String),
    /// Deduped against an earlier index in Phase 1; never handed to a worker.
    DuplicateOf(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Validating,
    Processing,
    Paused,
    Stopped,
    Completed,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub wall_time_ms: u64,
    pub avg_processing_ms: f64,
    pub p50_processing_ms: u64,
    pub p95_processing_ms: u64,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub per_item_result: Vec<Option<ItemOutcome>>,
    pub invalid_urls: Vec<InvalidUrl>,
    pub duplicates: Vec<Duplicate>,
    pub error_report: crate::batch::error_report::ErrorReport,
    pub stats: Stats,
    pub state: BatchState,
    pub retry_queue: Vec<BatchItem>,
}
