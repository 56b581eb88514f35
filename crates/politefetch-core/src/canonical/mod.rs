//! URL canonicalizer (§4.7): on 404, probe ordered variants and memoize
//! successful resolutions.

pub mod robots;

pub use robots::RobotsCache;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::Method;
use tokio::sync::Mutex;
use tokio::time::sleep;
use url::Url;

use crate::config::defaults::CANONICALIZATION_CACHE_TTL_MS;
use crate::error::ErrorKind;
use crate::fetch::{transport::RedirectHop, FetchEngine, FetchOutcome, FetchRequest};

/// A candidate URL plus its rank in the ordered attempt sequence (§3
/// "URL variant"). Within one run, variants are unique after
/// normalization; the original URL is always last.
#[derive(Debug, Clone)]
pub struct UrlVariant {
    pub url: String,
    pub rank: usize,
}

#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub variant: UrlVariant,
    pub status: Option<u16>,
    pub error_kind: Option<ErrorKind>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct CanonicalizationResult {
    pub original_url: String,
    pub resolved_url: Option<String>,
    pub success: bool,
    pub attempts: Vec<AttemptRecord>,
    pub redirect_chain: Vec<RedirectHop>,
    pub total_elapsed: Duration,
    pub error_kind: Option<ErrorKind>,
}

const BACKOFF_SEQUENCE_MS: [u64; 3] = [500, 1000, 2000];

/// Generates the ordered variant list per §4.7's seven-step policy,
/// deduplicated while preserving first occurrence, original URL last.
pub fn generate_variants(original: &Url) -> Vec<UrlVariant> {
    let host = original.host_str().unwrap_or_default().to_string();
    let (bare_host, has_www) = match host.strip_prefix("www.") {
        Some(bare) => (bare.to_string(), true),
        None => (host.clone(), false),
    };
    let www_host = if has_www { host.clone() } else { format!("www.{host}") };
    let path = original.path().to_string();
    let slashed_path = if path.ends_with('/') { path.clone() } else { format!("{path}/") };
    let suffix = original.query().map(|q| format!("?{q}")).unwrap_or_default();

    let build = |scheme: &str, h: &str, p: &str| format!("{scheme}://{h}{p}{suffix}");

    let candidates = [
        build("https", &host, &path),
        build("https", &www_host, &path),
        build("https", &host, &slashed_path),
        build("https", &www_host, &slashed_path),
        build(original.scheme(), &bare_host, &path),
        build("https", &bare_host, &path),
        original.as_str().to_string(),
    ];

    let mut seen = std::collections::HashSet::new();
    let mut variants = Vec::new();
    for candidate in candidates.into_iter() {
        if seen.insert(candidate.clone()) {
            variants.push(candidate);
        }
    }
    // original URL must appear last even if an earlier variant happened
    // to normalize to the same string as the original.
    let original_str = original.as_str().to_string();
    variants.retain(|v| v != &original_str);
    variants.push(original_str);

    variants.into_iter().enumerate().map(|(rank, url)| UrlVariant { url, rank }).collect()
}

struct CacheEntry {
    resolved_url: String,
    cached_at: Instant,
}

pub struct Canonicalizer<'a> {
    engine: &'a FetchEngine,
    robots: &'a RobotsCache,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(engine: &'a FetchEngine, robots: &'a RobotsCache) -> Self {
        Self { engine, robots, cache: Mutex::new(HashMap::new()) }
    }

    /// Resolves a 404'd URL to a working variant, memoizing success for
    /// 30 minutes (§3 "Canonicalization result").
    pub async fn resolve(&self, original_url: &str, correlation_id: &str) -> CanonicalizationResult {
        let start = Instant::now();
        let ttl = Duration::from_millis(CANONICALIZATION_CACHE_TTL_MS);

        if let Some(cached) = self.cached(original_url, ttl).await {
            return CanonicalizationResult {
                original_url: original_url.to_string(),
                resolved_url: Some(cached),
                success: true,
                attempts: Vec::new(),
                redirect_chain: Vec::new(),
                total_elapsed: start.elapsed(),
                error_kind: None,
            };
        }

        let Ok(parsed) = Url::parse(original_url) else {
            return CanonicalizationResult {
                original_url: original_url.to_string(),
                resolved_url: None,
                success: false,
                attempts: Vec::new(),
                redirect_chain: Vec::new(),
                total_elapsed: start.elapsed(),
                error_kind: Some(ErrorKind::Validation),
            };
        };

        let variants = generate_variants(&parsed);
        let mut attempts = Vec::new();
        let mut resolved = None;
        let mut redirect_chain = Vec::new();
        let mut last_error_kind = None;

        for (index, variant) in variants.iter().enumerate() {
            if let Ok(variant_url) = Url::parse(&variant.url) {
                let origin = format!("{}://{}", variant_url.scheme(), variant_url.authority());
                let allowed = self.robots.is_allowed(self.engine, &origin, variant_url.path(), correlation_id).await;
                if !allowed {
                    attempts.push(AttemptRecord {
                        variant: variant.clone(),
                        status: None,
                        error_kind: Some(ErrorKind::RobotsBlocked),
                        elapsed: Duration::ZERO,
                    });
                    last_error_kind = Some(ErrorKind::RobotsBlocked);
                    return CanonicalizationResult {
                        original_url: original_url.to_string(),
                        resolved_url: None,
                        success: false,
                        attempts,
                        redirect_chain,
                        total_elapsed: start.elapsed(),
                        error_kind: last_error_kind,
                    };
                }
            }

            let attempt_start = Instant::now();
            let outcome = self.preflight(&variant.url, correlation_id).await;
            let elapsed = attempt_start.elapsed();

            match &outcome {
                FetchOutcome::Success(success) => {
                    attempts.push(AttemptRecord {
                        variant: variant.clone(),
                        status: Some(success.status),
                        error_kind: None,
                        elapsed,
                    });
                    redirect_chain = success.redirect_chain.clone();
                    resolved = Some(variant.url.clone());
                    break;
                }
                other => {
                    let kind = other.error_kind();
                    last_error_kind = kind;
                    attempts.push(AttemptRecord { variant: variant.clone(), status: None, error_kind: kind, elapsed });
                }
            }

            if index + 1 < variants.len() {
                let backoff = BACKOFF_SEQUENCE_MS[index.min(BACKOFF_SEQUENCE_MS.len() - 1)];
                sleep(Duration::from_millis(backoff)).await;
            }
        }

        if let Some(resolved_url) = &resolved {
            self.cache.lock().await.insert(
                original_url.to_string(),
                CacheEntry { resolved_url: resolved_url.clone(), cached_at: Instant::now() },
            );
        }

        CanonicalizationResult {
            original_url: original_url.to_string(),
            resolved_url: resolved.clone(),
            success: resolved.is_some(),
            attempts,
            redirect_chain,
            total_elapsed: start.elapsed(),
            error_kind: if resolved.is_some() { None } else { last_error_kind },
        }
    }

    async fn cached(&self, original_url: &str, ttl: Duration) -> Option<String> {
        let cache = self.cache.lock().await;
        let entry = cache.get(original_url)?;
        if entry.cached_at.elapsed() < ttl {
            Some(entry.resolved_url.clone())
        } else {
            None
        }
    }

    /// Low-cost preflight: HEAD, falling back to GET if HEAD is
    /// unsupported (405/501), per §4.7/§6.
    async fn preflight(&self, url: &str, correlation_id: &str) -> FetchOutcome {
        let mut head_request = FetchRequest::get(url, correlation_id.to_string());
        head_request.method = Method::HEAD;
        head_request.timeout = Duration::from_secs(8);
        let outcome = self.engine.fetch_once(head_request).await;
        let head_unsupported = matches!(
            &outcome,
            FetchOutcome::Network(e) if e.status == Some(405) || e.status == Some(501)
        );
        if head_unsupported {
            let get_request = FetchRequest::get(url, correlation_id.to_string());
            self.engine.fetch_once(get_request).await
        } else {
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_order_matches_spec_for_bare_host_url() {
        let url = Url::parse("http://example.com/foo").unwrap();
        let variants = generate_variants(&url);
        let urls: Vec<_> = variants.iter().map(|v| v.url.clone()).collect();
        // steps 1-4 in order, then (5,6 collapse to one since bare host ==
        // host for a non-www input), original last.
        assert_eq!(
            urls,
            vec![
                "https://example.com/foo",
                "https://www.example.com/foo",
                "https://example.com/foo/",
                "https://www.example.com/foo/",
                "http://example.com/foo",
            ]
        );
        assert_eq!(urls.last().unwrap(), "http://example.com/foo");
    }

    #[test]
    fn dedups_preserving_first_occurrence_and_original_last() {
        let url = Url::parse("https://www.example.com/foo").unwrap();
        let variants = generate_variants(&url);
        let urls: Vec<_> = variants.iter().map(|v| v.url.clone()).collect();
        let mut seen = std::collections::HashSet::new();
        for url in &urls {
            assert!(seen.insert(url.clone()), "duplicate variant: {url}");
        }
        assert_eq!(urls.last().unwrap(), "https://www.example.com/foo");
    }
}
