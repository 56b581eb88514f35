//! The actual network call, injected as a capability (§9 "Dynamic
//! dispatch / duck typing") so tests can substitute an in-memory server.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;

#[derive(Debug, Clone)]
pub struct RedirectHop {
    pub url: String,
    pub status: u16,
}

#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: bytes::Bytes,
    pub final_url: String,
    pub redirect_chain: Vec<RedirectHop>,
    pub elapsed: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

/// One attempt's worth of request parameters, transport-level only (no
/// rate limiting / circuit concerns here — those live in `FetchEngine`).
pub struct RawRequest<'a> {
    pub url: &'a str,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<bytes::Bytes>,
    pub timeout: Duration,
    pub max_redirects: usize,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RawRequest<'_>) -> Result<RawResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reqwest client build");
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: RawRequest<'_>) -> Result<RawResponse, TransportError> {
        let start = Instant::now();
        let deadline = start + request.timeout;
        let mut url = request.url.to_string();
        let mut chain = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }
            let mut builder = self
                .client
                .request(request.method.clone(), &url)
                .headers(request.headers.clone())
                .timeout(remaining);
            if let Some(body) = request.body.clone() {
                builder = builder.body(body);
            }
            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Reqwest(e)
                }
            })?;
            let status = response.status();
            if status.is_redirection() && chain.len() < request.max_redirects {
                chain.push(RedirectHop { url: url.clone(), status: status.as_u16() });
                let Some(location) = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                else {
                    return finalize(response, url, chain, start).await;
                };
                url = resolve(&url, location);
                continue;
            }
            return finalize(response, url, chain, start).await;
        }
    }
}

async fn finalize(
    response: reqwest::Response,
    final_url: String,
    redirect_chain: Vec<RedirectHop>,
    start: Instant,
) -> Result<RawResponse, TransportError> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?;
    Ok(RawResponse { status: status.as_u16(), headers, body, final_url, redirect_chain, elapsed: start.elapsed() })
}

fn resolve(base: &str, location: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(location)) {
        Ok(joined) => joined.to_string(),
        Err(_) => location.to_string(),
    }
}
