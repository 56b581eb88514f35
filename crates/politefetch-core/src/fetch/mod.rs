//! Single-attempt fetch engine (§4.5).

pub mod headers;
pub mod transport;

pub use transport::{RawRequest, RawResponse, ReqwestTransport, Transport, TransportError};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use url::Url;

use crate::circuit::{GateDecision, Prober};
use crate::config::Config;
use crate::error::{classify, ClassifiedError, ErrorKind, RawFailure};
use crate::host::{host_key, Registry};
use crate::metrics::MetricsRegistry;
use crate::ratelimit::Observation;

const MAX_URL_LEN: usize = 2048;

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<bytes::Bytes>,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub max_wait: Option<Duration>,
    pub correlation_id: String,
    pub request_id: String,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: Duration::from_secs(30),
            max_redirects: 10,
            max_wait: None,
            correlation_id: correlation_id.into(),
            request_id: crate::metrics::new_request_id(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchSuccess {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: bytes::Bytes,
    pub final_url: String,
    pub redirect_chain: Vec<transport::RedirectHop>,
    pub elapsed: Duration,
}

/// Tagged union of fetch results (§3 "Fetch outcome").
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(FetchSuccess),
    RateLimited { retry_after: Option<Duration> },
    Network(ClassifiedError),
    Timeout,
    CircuitOpen { remaining_ms: u64 },
    Validation(String),
    Parse(String),
}

impl FetchOutcome {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            FetchOutcome::Success(_) => None,
            FetchOutcome::RateLimited { .. } => Some(ErrorKind::RateLimited),
            FetchOutcome::Network(e) => Some(e.kind),
            FetchOutcome::Timeout => Some(ErrorKind::Timeout),
            FetchOutcome::CircuitOpen { .. } => Some(ErrorKind::CircuitOpen),
            FetchOutcome::Validation(_) => Some(ErrorKind::Validation),
            FetchOutcome::Parse(_) => Some(ErrorKind::Parse),
        }
    }
}

struct TransportProber {
    transport: Arc<dyn Transport>,
    origin: String,
}

#[async_trait]
impl Prober for TransportProber {
    async fn probe(&self, path: &str) -> bool {
        let url = format!("{}{}", self.origin, path);
        let request = RawRequest {
            url: &url,
            method: Method::HEAD,
            headers: HeaderMap::new(),
            body: None,
            timeout: Duration::from_secs(5),
            max_redirects: 3,
        };
        matches!(self.transport.send(request).await, Ok(resp) if resp.status < 400)
    }
}

pub struct FetchEngine {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
    metrics: Arc<MetricsRegistry>,
}

impl FetchEngine {
    pub fn new(config: Config, transport: Arc<dyn Transport>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { registry: Registry::new(config), transport, metrics }
    }

    pub fn with_registry(registry: Arc<Registry>, transport: Arc<dyn Transport>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { registry, transport, metrics }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Performs one fetch attempt per §4.5's numbered steps.
    pub async fn fetch_once(&self, mut request: FetchRequest) -> FetchOutcome {
        let Some(parsed) = validate_url(&request.url) else {
            return FetchOutcome::Validation(format!("invalid url: {}", request.url));
        };
        let Some(host) = host_key(&parsed) else {
            return FetchOutcome::Validation("missing host".to_string());
        };
        let origin = format!("{}://{}", parsed.scheme(), parsed.authority());

        let circuit = self.registry.get_circuit(&host).await;
        let prober = TransportProber { transport: self.transport.clone(), origin: origin.clone() };
        match circuit.call_gate(&prober).await {
            GateDecision::Reject { remaining_ms } => {
                self.metrics.incr("circuit_rejected");
                return FetchOutcome::CircuitOpen { remaining_ms };
            }
            GateDecision::ProceedAsProbe => {
                request.url = format!("{origin}/robots.txt");
            }
            GateDecision::Proceed => {}
        }

        let limiter = self.registry.get_bucket(&host).await;
        if let Err(e) = limiter.acquire(request.max_wait).await {
            return FetchOutcome::Network(e);
        }

        let built_headers = headers::build(&request.correlation_id, &request.request_id, &request.headers);
        let raw_request = RawRequest {
            url: &request.url,
            method: request.method.clone(),
            headers: built_headers,
            body: request.body.clone(),
            timeout: request.timeout,
            max_redirects: request.max_redirects,
        };

        self.metrics.incr("requests_total");
        let response = self.transport.send(raw_request).await;
        let outcome = self.classify_response(response).await;

        self.feed_back(&circuit, &limiter, &outcome).await;
        outcome
    }

    async fn classify_response(&self, response: Result<RawResponse, TransportError>) -> FetchOutcome {
        let response = match response {
            Ok(r) => r,
            Err(TransportError::Timeout) => return FetchOutcome::Timeout,
            Err(TransportError::Reqwest(e)) => {
                let raw = RawFailure {
                    is_connect: e.is_connect(),
                    is_timeout: e.is_timeout(),
                    message: Some(&e.to_string()),
                    ..Default::default()
                };
                return FetchOutcome::Network(classify(&raw));
            }
        };

        match response.status {
            200..=399 => FetchOutcome::Success(FetchSuccess {
                status: response.status,
                headers: response.headers,
                body: response.body,
                final_url: response.final_url,
                redirect_chain: response.redirect_chain,
                elapsed: response.elapsed,
            }),
            429 => {
                let retry_after = parse_retry_after(&response.headers);
                FetchOutcome::RateLimited { retry_after }
            }
            500..=599 => {
                let raw = RawFailure { status: Some(response.status), ..Default::default() };
                FetchOutcome::Network(classify(&raw).with_status(response.status))
            }
            _ => {
                let raw = RawFailure { status: Some(response.status), ..Default::default() };
                FetchOutcome::Network(classify(&raw).with_status(response.status))
            }
        }
    }

    async fn feed_back(
        &self,
        circuit: &crate::circuit::CircuitBreaker,
        limiter: &crate::ratelimit::RateLimiter,
        outcome: &FetchOutcome,
    ) {
        match outcome {
            FetchOutcome::Success(_) => {
                limiter.observe(Observation::Success).await;
                circuit.report_outcome(Some(Ok(()))).await;
            }
            FetchOutcome::RateLimited { retry_after } => {
                limiter.observe(Observation::RateLimited { retry_after: *retry_after }).await;
                circuit.report_outcome(Some(Err(ErrorKind::RateLimited))).await;
            }
            FetchOutcome::Network(e) if e.kind == ErrorKind::Server5xx => {
                limiter.observe(Observation::ServerError).await;
                circuit.report_outcome(Some(Err(e.kind))).await;
            }
            FetchOutcome::Network(e) => {
                circuit.report_outcome(Some(Err(e.kind))).await;
            }
            FetchOutcome::Timeout => {
                circuit.report_outcome(Some(Err(ErrorKind::Timeout))).await;
            }
            FetchOutcome::CircuitOpen { .. } | FetchOutcome::Validation(_) | FetchOutcome::Parse(_) => {}
        }
    }
}

fn validate_url(raw: &str) -> Option<Url> {
    if raw.len() > MAX_URL_LEN {
        return None;
    }
    let parsed = Url::parse(raw).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?;
    if host.is_empty() || host.contains("..") || host.contains("//") {
        return None;
    }
    Some(parsed)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let parsed = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let now = chrono::Utc::now();
    let delta = parsed.with_timezone(&chrono::Utc) - now;
    delta.to_std().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        assert!(validate_url("ftp://example.com/x").is_none());
    }

    #[test]
    fn rejects_oversized_url() {
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LEN));
        assert!(validate_url(&long).is_none());
    }

    #[test]
    fn accepts_well_formed_https_url() {
        assert!(validate_url("https://example.com/path?q=1").is_some());
    }
}
