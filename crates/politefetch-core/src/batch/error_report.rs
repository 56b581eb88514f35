//! Phase 3 — error report compilation (§4.9, §7 "User-visible behavior").

use std::collections::HashMap;

use crate::error::{ClassifiedError, ErrorKind};

#[derive(Debug, Clone)]
pub struct PatternEntry {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub count: usize,
    pub example_urls: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorReport {
    pub total_errors: usize,
    pub by_kind: HashMap<ErrorKind, usize>,
    pub patterns: Vec<PatternEntry>,
    pub recommendations: Vec<String>,
}

/// `failures`: (url, error) pairs in original-index order.
/// `error_report_size` bounds detailed errors to ≤20 and patterns to ≤10
/// per §7's "cursor-friendly truncated export".
pub fn compile(failures: &[(String, ClassifiedError)], error_report_size: usize) -> ErrorReport {
    let mut by_kind: HashMap<ErrorKind, usize> = HashMap::new();
    let mut pattern_map: HashMap<(ErrorKind, Option<u16>), (usize, Vec<String>)> = HashMap::new();

    for (url, error) in failures {
        *by_kind.entry(error.kind).or_insert(0) += 1;
        let entry = pattern_map.entry((error.kind, error.status)).or_insert((0, Vec::new()));
        entry.0 += 1;
        if entry.1.len() < 5 {
            entry.1.push(url.clone());
        }
    }

    let mut patterns: Vec<PatternEntry> = pattern_map
        .into_iter()
        .map(|((kind, status), (count, example_urls))| PatternEntry { kind, status, count, example_urls })
        .collect();
    patterns.sort_by(|a, b| b.count.cmp(&a.count));
    patterns.truncate(error_report_size.min(10));

    let recommendations = recommend(&by_kind, failures.len());

    ErrorReport { total_errors: failures.len(), by_kind, patterns, recommendations }
}

fn recommend(by_kind: &HashMap<ErrorKind, usize>, total: usize) -> Vec<String> {
    let mut recs = Vec::new();
    if total == 0 {
        return recs;
    }
    let timeouts = by_kind.get(&ErrorKind::Timeout).copied().unwrap_or(0);
    if timeouts * 4 >= total {
        recs.push("many timeouts observed — consider raising timeout or lowering concurrency".to_string());
    }
    if by_kind.contains_key(&ErrorKind::RateLimited) {
        recs.push("429 responses observed — consider increasing delayMs or lowering rate limits".to_string());
    }
    let server_errors = by_kind.get(&ErrorKind::Server5xx).copied().unwrap_or(0);
    if server_errors * 3 >= total {
        recs.push("frequent 5xx responses — target hosts may be struggling under current concurrency".to_string());
    }
    if by_kind.contains_key(&ErrorKind::CircuitOpen) {
        recs.push("circuit breaker opened for one or more hosts — check retry_queue".to_string());
    }
    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifiedError;

    #[test]
    fn groups_by_kind_and_sorts_patterns() {
        let failures = vec![
            ("https://a.example/1".to_string(), ClassifiedError::new(ErrorKind::Timeout, "t")),
            ("https://a.example/2".to_string(), ClassifiedError::new(ErrorKind::Timeout, "t")),
            ("https://a.example/3".to_string(), ClassifiedError::new(ErrorKind::Server5xx, "s").with_status(500)),
        ];
        let report = compile(&failures, 20);
        assert_eq!(report.total_errors, 3);
        assert_eq!(*report.by_kind.get(&ErrorKind::Timeout).unwrap(), 2);
        assert_eq!(report.patterns[0].count, 2);
    }

    #[test]
    fn recommends_on_rate_limiting() {
        let failures = vec![("u".to_string(), ClassifiedError::new(ErrorKind::RateLimited, "r"))];
        let report = compile(&failures, 20);
        assert!(report.recommendations.iter().any(|r| r.contains("429")));
    }

    #[test]
    fn empty_failures_yield_no_recommendations() {
        let report = compile(&[], 20);
        assert!(report.recommendations.is_empty());
    }
}
