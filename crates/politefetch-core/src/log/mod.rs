//! Structured NDJSON job logger (§4.10). Separate from `tracing`'s
//! operational logs (see SPEC_FULL.md §1.1) — this is the audit trail a
//! downstream consumer replays to reconstruct timing offline.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use crate::error::{ErrorKind, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Request,
    Response,
    Error,
    Canonicalization,
    Pagination,
    Phase,
    Summary,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub timestamp: chrono::DateTime<Utc>,
    pub job_id: String,
    pub correlation_id: String,
    pub request_id: Option<String>,
    pub event_type: EventType,
    pub host: Option<String>,
    pub url: Option<String>,
    pub elapsed_ms: u64,
    pub error_kind: Option<ErrorKind>,
    pub category: Option<String>,
    pub severity: Option<Severity>,
    pub message: Option<String>,
}

impl LogEvent {
    pub fn new(job_id: impl Into<String>, correlation_id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            timestamp: Utc::now(),
            job_id: job_id.into(),
            correlation_id: correlation_id.into(),
            request_id: None,
            event_type,
            host: None,
            url: None,
            elapsed_ms: 0,
            error_kind: None,
            category: None,
            severity: None,
            message: None,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Summary {
    pub job_id: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub by_kind: std::collections::HashMap<String, u64>,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub duration_ms: u64,
}

/// Append-only NDJSON writer for one job's events, rotated when the
/// current file exceeds `rotate_at_bytes`.
pub struct JobLog {
    job_id: String,
    dir: PathBuf,
    rotate_at_bytes: u64,
    file: Mutex<std::fs::File>,
    written_bytes: Mutex<u64>,
    rotation: Mutex<u32>,
}

impl JobLog {
    pub fn open(dir: impl AsRef<Path>, job_id: impl Into<String>, rotate_at_bytes: u64) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let job_id = job_id.into();
        let path = dir.join(format!("{job_id}.log"));
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            job_id,
            dir,
            rotate_at_bytes,
            file: Mutex::new(file),
            written_bytes: Mutex::new(written),
            rotation: Mutex::new(0),
        })
    }

    pub fn write_event(&self, event: &LogEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_string(event).expect("LogEvent serializes");
        line.push('\n');
        self.rotate_if_needed(line.len() as u64)?;
        let mut file = self.file.lock().unwrap();
        file.write_all(line.as_bytes())?;
        *self.written_bytes.lock().unwrap() += line.len() as u64;
        Ok(())
    }

    fn rotate_if_needed(&self, incoming_len: u64) -> std::io::Result<()> {
        let mut written = self.written_bytes.lock().unwrap();
        if *written + incoming_len <= self.rotate_at_bytes {
            return Ok(());
        }
        let mut rotation = self.rotation.lock().unwrap();
        *rotation += 1;
        let rotated_path = self.dir.join(format!("{}.log.{}", self.job_id, *rotation));
        let current_path = self.dir.join(format!("{}.log", self.job_id));
        std::fs::rename(&current_path, rotated_path)?;
        let new_file = std::fs::OpenOptions::new().create(true).append(true).open(&current_path)?;
        *self.file.lock().unwrap() = new_file;
        *written = 0;
        Ok(())
    }

    pub fn write_summary(&self, summary: &Summary) -> std::io::Result<()> {
        let path = self.dir.join(format!("{}.summary.json", self.job_id));
        let json = serde_json::to_string_pretty(summary).expect("Summary serializes");
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_ndjson_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = JobLog::open(dir.path(), "job-1", 1_000_000).unwrap();
        let event = LogEvent::new("job-1", "corr-1", EventType::Request);
        log.write_event(&event).unwrap();
        let contents = std::fs::read_to_string(dir.path().join("job-1.log")).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(serde_json::from_str::<serde_json::Value>(contents.lines().next().unwrap()).is_ok());
    }

    #[test]
    fn rotates_past_byte_cap() {
        let dir = tempfile::tempdir().unwrap();
        let log = JobLog::open(dir.path(), "job-2", 50).unwrap();
        for _ in 0..10 {
            let event = LogEvent::new("job-2", "corr-1", EventType::Request);
            log.write_event(&event).unwrap();
        }
        assert!(dir.path().join("job-2.log.1").exists());
    }

    #[test]
    fn writes_summary_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = JobLog::open(dir.path(), "job-3", 1_000_000).unwrap();
        let summary = Summary { job_id: "job-3".to_string(), total_requests: 5, ..Default::default() };
        log.write_summary(&summary).unwrap();
        let contents = std::fs::read_to_string(dir.path().join("job-3.summary.json")).unwrap();
        assert!(contents.contains("\"total_requests\": 5"));
    }
}
